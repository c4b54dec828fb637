//! Persistent contact manifolds and the fixed pair enumeration
//!
//! Each body pair that can touch owns one manifold slot for the whole
//! episode. Slots are indexed by the position of the pair in the
//! enumeration below, which depends only on the static capacities.

use crate::config::StaticParams;
use kinetix_math::Vec2;

/// A single contact point between two bodies
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollisionManifold {
    /// Unit normal pointing from body A to body B
    pub normal: Vec2,
    pub penetration: f32,
    pub collision_point: Vec2,
    pub active: bool,
    /// Running totals of the clamped solver impulses
    pub acc_impulse_normal: f32,
    pub acc_impulse_tangent: f32,
    /// Approach speed along the normal scaled by restitution
    pub restitution_velocity_target: f32,
}

impl CollisionManifold {
    /// Deactivate and drop the warm-start impulses
    pub fn reset(&mut self) {
        self.active = false;
        self.acc_impulse_normal = 0.0;
        self.acc_impulse_tangent = 0.0;
    }
}

/// Up to two simultaneous contact points of a polygon pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonManifold {
    pub cm1: CollisionManifold,
    pub cm2: CollisionManifold,
}

impl PolygonManifold {
    pub fn reset(&mut self) {
        self.cm1.reset();
        self.cm2.reset();
    }

    /// Whether either contact is active
    pub fn is_active(&self) -> bool {
        self.cm1.active || self.cm2.active
    }

    pub fn contacts(&self) -> [&CollisionManifold; 2] {
        [&self.cm1, &self.cm2]
    }
}

/// Shape kinds of a body pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairKind {
    PolygonPolygon,
    CirclePolygon,
    CircleCircle,
}

/// Number of polygon pairs, leaving out pairs of fixated polygons
pub fn num_polygon_pairs(num_polygons: usize, num_fixated: usize) -> usize {
    let fixated = num_fixated.min(num_polygons);
    pairs(num_polygons) - pairs(fixated)
}

/// Number of circle-polygon pairs
pub fn num_circle_polygon_pairs(num_circles: usize, num_polygons: usize) -> usize {
    num_circles * num_polygons
}

/// Number of circle pairs
pub fn num_circle_pairs(num_circles: usize) -> usize {
    pairs(num_circles)
}

fn pairs(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Slot-ordered body pairs for each manifold array
///
/// Circle-polygon pairs store the circle slot first, matching the
/// manifold convention that the circle is body A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairIndices {
    pub polygon_polygon: Vec<(usize, usize)>,
    pub circle_polygon: Vec<(usize, usize)>,
    pub circle_circle: Vec<(usize, usize)>,
}

impl PairIndices {
    pub fn new(params: &StaticParams) -> Self {
        let np = params.num_polygons;
        let nc = params.num_circles;
        let fixated = params.num_static_fixated_polys;

        let mut polygon_polygon = Vec::with_capacity(num_polygon_pairs(np, fixated));
        for i in 0..np {
            for j in (i + 1)..np {
                if i < fixated && j < fixated {
                    continue;
                }
                polygon_polygon.push((i, j));
            }
        }

        let mut circle_polygon = Vec::with_capacity(num_circle_polygon_pairs(nc, np));
        for i in 0..nc {
            for j in 0..np {
                circle_polygon.push((i, j));
            }
        }

        let mut circle_circle = Vec::with_capacity(num_circle_pairs(nc));
        for i in 0..nc {
            for j in (i + 1)..nc {
                circle_circle.push((i, j));
            }
        }

        Self {
            polygon_polygon,
            circle_polygon,
            circle_circle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_counts_match_enumeration() {
        for params in [StaticParams::small(), StaticParams::medium(), StaticParams::large()] {
            let pairs = PairIndices::new(&params);
            let np = params.num_polygons;
            let sf = params.num_static_fixated_polys;
            assert_eq!(pairs.polygon_polygon.len(), np * (np - 1) / 2 - sf * (sf - 1) / 2);
            assert_eq!(pairs.circle_polygon.len(), params.num_circles * np);
            assert_eq!(pairs.circle_circle.len(), num_circle_pairs(params.num_circles));
        }
    }

    #[test]
    fn test_fixated_pairs_skipped() {
        let params = StaticParams::default().with_capacities(5, 2, 1, 1).with_static_fixated_polys(4);
        let pairs = PairIndices::new(&params);
        assert_eq!(pairs.polygon_polygon, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
        assert_eq!(pairs.circle_polygon[5], (1, 0));
        assert_eq!(pairs.circle_circle, vec![(0, 1)]);
    }

    #[test]
    fn test_reset_clears_impulses() {
        let mut manifold = PolygonManifold {
            cm1: CollisionManifold {
                active: true,
                acc_impulse_normal: 2.0,
                acc_impulse_tangent: -1.0,
                ..Default::default()
            },
            cm2: CollisionManifold::default(),
        };
        assert!(manifold.is_active());
        manifold.reset();
        assert!(!manifold.is_active());
        assert_eq!(manifold.cm1.acc_impulse_normal, 0.0);
        assert_eq!(manifold.cm1.acc_impulse_tangent, 0.0);
    }

    #[test]
    fn test_degenerate_counts() {
        assert_eq!(num_polygon_pairs(0, 0), 0);
        assert_eq!(num_polygon_pairs(3, 5), 0);
        assert_eq!(num_circle_pairs(1), 0);
    }
}
