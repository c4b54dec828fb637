//! Narrow-phase contact generation and the contact impulse solver
//!
//! Generators take last step's manifold for the same pair and return this
//! step's manifold. Accumulated impulses are carried over only while the
//! pair stays in contact, so a pair that separates and touches again never
//! starts from a stale warm-start value.
//!
//! Every manifold normal points from body A to body B. For circle-polygon
//! pairs the circle is A.

use crate::body::{Polygon, RigidBody, VelocityDelta, MAX_POLYGON_VERTICES};
use crate::config::EnvParams;
use crate::layers::should_collide;
use crate::manifold::{CollisionManifold, PolygonManifold};
use crate::material::{combined_restitution, friction_coefficient};
use kinetix_math::{argmax, argmin, clamp, zero_to_one, Vec2};

/// Separation margin that keeps the reference face from flip-flopping
/// between two polygons whose separations are nearly equal
const FACE_SELECTION_BIAS: f32 = 0.01;

/// Normal component of B's surface velocity relative to A's at `point`
pub fn relative_normal_velocity(a: &RigidBody, b: &RigidBody, point: Vec2, normal: Vec2) -> f32 {
    (b.point_velocity(point) - a.point_velocity(point)).dot(normal)
}

fn restitution_target(a: &RigidBody, b: &RigidBody, point: Vec2, normal: Vec2) -> f32 {
    relative_normal_velocity(a, b, point, normal) * combined_restitution(a.restitution, b.restitution)
}

/// Build an active manifold, keeping last step's impulses if it was active
fn carried(previous: &CollisionManifold, normal: Vec2, penetration: f32, point: Vec2, active: bool, target: f32) -> CollisionManifold {
    let carry = previous.active && active;
    CollisionManifold {
        normal,
        penetration,
        collision_point: point,
        active,
        acc_impulse_normal: if carry { previous.acc_impulse_normal } else { 0.0 },
        acc_impulse_tangent: if carry { previous.acc_impulse_tangent } else { 0.0 },
        restitution_velocity_target: target,
    }
}

fn reset(previous: &CollisionManifold) -> CollisionManifold {
    let mut manifold = *previous;
    manifold.reset();
    manifold
}

/// Contact between two circles
pub fn circle_circle(a: &RigidBody, b: &RigidBody, previous: &CollisionManifold) -> CollisionManifold {
    let offset = b.position - a.position;
    let distance = offset.length();
    let radii = a.radius() + b.radius();

    if !(distance < radii && a.active && b.active) {
        return reset(previous);
    }

    let normal = offset / zero_to_one(distance);
    let point = a.position + normal * a.radius();
    let target = restitution_target(a, b, point, normal);
    carried(previous, normal, radii - distance, point, true, target)
}

/// Project `point` onto the segment `start..end`
///
/// Returns whether `point` is on the interior side of the edge (for
/// clockwise winding), the clipped point, and the squared distance to it.
fn clip_to_edge(point: Vec2, start: Vec2, end: Vec2) -> (bool, Vec2, f32) {
    let interior = (start - point).cross(end - point) < 0.0;
    let edge = end - start;
    let length = edge.length();
    let along = edge / zero_to_one(length);
    let t = clamp(along.dot(point - start), 0.0, length);
    let clipped = start + along * t;
    (interior, clipped, (clipped - point).length_squared())
}

/// Contact between a circle (A) and a polygon (B)
pub fn circle_polygon(circle: &RigidBody, polygon: &RigidBody, previous: &CollisionManifold) -> CollisionManifold {
    let Some(shape) = polygon.as_polygon() else {
        return reset(previous);
    };
    let rotation = polygon.rotation_matrix();
    let centre = rotation.transpose_mul_vec2(circle.position - polygon.position);

    let n = shape.n_vertices;
    let mut inside = n > 0;
    let mut clips = [Vec2::ZERO; MAX_POLYGON_VERTICES];
    let mut distances = [f32::INFINITY; MAX_POLYGON_VERTICES];
    for i in 0..n {
        let (interior, clipped, distance_sq) = clip_to_edge(centre, shape.vertices[i], shape.next_vertex(i));
        inside &= interior;
        clips[i] = clipped;
        distances[i] = distance_sq;
    }
    let closest = clips[argmin(&distances[..n])];

    let local_normal = centre - closest;
    let distance = local_normal.length();
    let radius = circle.radius();
    let active = (distance <= radius || inside)
        && circle.active
        && polygon.active
        && should_collide(polygon, circle);

    let outward = rotation * local_normal * if inside { -1.0 } else { 1.0 };
    let normal = -(outward / zero_to_one(outward.length()));
    let point = rotation * closest + polygon.position;
    let penetration = if inside { radius } else { radius - distance };
    let target = restitution_target(circle, polygon, point, normal);

    carried(previous, normal, penetration, point, active, target)
}

/// Best separating face of `reference` against `incident`'s vertices
struct FaceQuery {
    separation: f32,
    face: usize,
    /// The two incident vertices deepest along the face normal, world space
    incident: [Vec2; 2],
}

fn least_penetration_axis(reference: &RigidBody, ref_shape: &Polygon, incident: &RigidBody, inc_shape: &Polygon) -> FaceQuery {
    let rotation = reference.rotation_matrix();
    let world = inc_shape.vertices.map(|v| incident.world_point(v));
    let local = world.map(|p| rotation.transpose_mul_vec2(p - reference.position));
    let n_inc = inc_shape.n_vertices;

    let mut best = FaceQuery {
        separation: -99999.0,
        face: 0,
        incident: [world[0], world[0]],
    };
    for i in 0..ref_shape.n_vertices {
        let normal = ref_shape.edge_normal(i);
        let ref_max = ref_shape
            .points()
            .iter()
            .map(|v| normal.dot(*v))
            .fold(f32::NEG_INFINITY, f32::max);
        let mut projections = [0.0; MAX_POLYGON_VERTICES];
        for (projection, p) in projections.iter_mut().zip(&local[..n_inc]) {
            *projection = normal.dot(*p);
        }
        let inc_min = projections[..n_inc].iter().copied().fold(f32::INFINITY, f32::min);
        let separation = inc_min - ref_max;

        if separation > best.separation {
            let mut order = [0, 1, 2, 3];
            order[..n_inc].sort_by(|&x, &y| projections[x].total_cmp(&projections[y]));
            best = FaceQuery {
                separation,
                face: i,
                incident: [world[order[0]], world[order[n_inc.saturating_sub(1).min(1)]]],
            };
        }
    }
    best
}

/// Contact between two polygons by separating axes and face clipping
pub fn polygon_polygon(a: &RigidBody, b: &RigidBody, previous: &PolygonManifold) -> PolygonManifold {
    let (Some(shape_a), Some(shape_b)) = (a.as_polygon(), b.as_polygon()) else {
        let mut manifold = *previous;
        manifold.reset();
        return manifold;
    };

    let query_a = least_penetration_axis(a, shape_a, b, shape_b);
    let query_b = least_penetration_axis(b, shape_b, a, shape_a);

    let b_is_reference = query_a.separation + FACE_SELECTION_BIAS < query_b.separation;
    let most_separation = query_a.separation.max(query_b.separation);
    let colliding = most_separation < 0.0 && a.active && b.active && should_collide(a, b);
    if !colliding {
        let mut manifold = *previous;
        manifold.reset();
        return manifold;
    }

    let (reference, incident, normal) = if b_is_reference {
        let face = query_b.face;
        (
            [b.world_point(shape_b.vertices[face]), b.world_point(shape_b.next_vertex(face))],
            query_b.incident,
            -(b.rotation_matrix() * shape_b.edge_normal(face)),
        )
    } else {
        let face = query_a.face;
        (
            [a.world_point(shape_a.vertices[face]), a.world_point(shape_a.next_vertex(face))],
            query_a.incident,
            a.rotation_matrix() * shape_a.edge_normal(face),
        )
    };

    // Reference frame: x is depth into the reference polygon, y runs along the face.
    let edge = reference[1] - reference[0];
    let face_length = edge.length();
    let tangent = edge / zero_to_one(face_length);
    let inward = -tangent.perpendicular();
    let clipped = incident.map(|p| {
        let offset = p - reference[0];
        Vec2::new(offset.dot(inward), clamp(offset.dot(tangent), 0.0, face_length))
    });
    let depths = [clipped[0].x, clipped[1].x];
    let deepest = argmax(&depths);
    let both_inside = depths[0].min(depths[1]) > 0.0;

    let to_world = |p: Vec2| reference[0] + inward * p.x + tangent * p.y;
    let point1 = to_world(clipped[deepest]);
    let point2 = to_world(clipped[1 - deepest]);
    let penetration = -most_separation;

    PolygonManifold {
        cm1: carried(&previous.cm1, normal, penetration, point1, true, restitution_target(a, b, point1, normal)),
        cm2: carried(
            &previous.cm2,
            normal,
            penetration,
            point2,
            both_inside,
            restitution_target(a, b, point2, normal),
        ),
    }
}

/// Whether a contact takes part in solving this step
#[inline]
fn should_resolve(a: &RigidBody, b: &RigidBody, manifold: &CollisionManifold, does_collide: bool) -> bool {
    manifold.active && does_collide && a.active && b.active && !(a.is_static() && b.is_static())
}

/// Re-apply a manifold's accumulated impulses before the iteration loop
pub fn warm_start_impulse(a: &RigidBody, b: &RigidBody, manifold: &CollisionManifold, does_collide: bool) -> Option<VelocityDelta> {
    if !should_resolve(a, b, manifold, does_collide) {
        return None;
    }
    let r1 = manifold.collision_point - a.position;
    let r2 = manifold.collision_point - b.position;
    let tangent = manifold.normal.cross_scalar(1.0);
    let impulse = manifold.normal * manifold.acc_impulse_normal + tangent * manifold.acc_impulse_tangent;

    Some(VelocityDelta {
        a_dv: impulse * -a.inverse_mass,
        a_drv: -a.inverse_inertia * r1.cross(impulse),
        b_dv: impulse * b.inverse_mass,
        b_drv: b.inverse_inertia * r2.cross(impulse),
    })
}

/// Output of one contact solve
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollisionResponse {
    pub delta: VelocityDelta,
    pub acc_impulse_normal: f32,
    pub acc_impulse_tangent: f32,
    pub is_colliding: bool,
}

/// One sequential-impulse pass over a single contact
///
/// The running normal total is clamped to be non-negative and the friction
/// total to the Coulomb cone of the new normal total; only the change in
/// each total is applied.
pub fn resolve_collision(
    a: &RigidBody,
    b: &RigidBody,
    manifold: &CollisionManifold,
    does_collide: bool,
    params: &EnvParams,
) -> CollisionResponse {
    if !should_resolve(a, b, manifold, does_collide) {
        return CollisionResponse::default();
    }

    let r1 = manifold.collision_point - a.position;
    let r2 = manifold.collision_point - b.position;
    let normal = manifold.normal;
    let vn = relative_normal_velocity(a, b, manifold.collision_point, normal);

    let rn1 = r1.dot(normal);
    let rn2 = r2.dot(normal);
    let r1_sq = r1.length_squared();
    let r2_sq = r2.length_squared();
    let inv_mass = a.inverse_mass + b.inverse_mass;
    let inv_mass_normal = inv_mass + a.inverse_inertia * (r1_sq - rn1 * rn1) + b.inverse_inertia * (r2_sq - rn2 * rn2);

    let bias = -params.baumgarte_coefficient_collision / params.dt * (params.slop - manifold.penetration).min(0.0);
    let normal_mag = -(manifold.restitution_velocity_target + vn - bias) / inv_mass_normal;
    let acc_normal = clamp(manifold.acc_impulse_normal + normal_mag, 0.0, f32::MAX);
    let impulse_normal = normal * (acc_normal - manifold.acc_impulse_normal);

    let mut a_dv = impulse_normal * -a.inverse_mass;
    let mut b_dv = impulse_normal * b.inverse_mass;
    let mut a_drv = -a.inverse_inertia * r1.cross(impulse_normal);
    let mut b_drv = b.inverse_inertia * r2.cross(impulse_normal);

    let dv = (b.velocity + b_dv + Vec2::scalar_cross(b.angular_velocity + b_drv, r2))
        - (a.velocity + a_dv + Vec2::scalar_cross(a.angular_velocity + a_drv, r1));
    let tangent = normal.cross_scalar(1.0);
    let vt = dv.dot(tangent);
    let rt1 = r1.dot(tangent);
    let rt2 = r2.dot(tangent);
    let inv_mass_tangent = inv_mass + a.inverse_inertia * (r1_sq - rt1 * rt1) + b.inverse_inertia * (r2_sq - rt2 * rt2);

    let mu = friction_coefficient(a.friction, b.friction, params.base_friction);
    let max_friction = acc_normal * mu;
    let acc_tangent = clamp(manifold.acc_impulse_tangent - vt / inv_mass_tangent, -max_friction, max_friction);
    let impulse_tangent = tangent * (acc_tangent - manifold.acc_impulse_tangent);

    a_dv -= impulse_tangent * a.inverse_mass;
    a_drv -= a.inverse_inertia * r1.cross(impulse_tangent);
    b_dv += impulse_tangent * b.inverse_mass;
    b_drv += b.inverse_inertia * r2.cross(impulse_tangent);

    CollisionResponse {
        delta: VelocityDelta { a_dv, a_drv, b_dv, b_drv },
        acc_impulse_normal: acc_normal,
        acc_impulse_tangent: acc_tangent,
        is_colliding: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn floor() -> RigidBody {
        RigidBody::rectangle(Vec2::ZERO, 4.0, 1.0).fixed()
    }

    #[test]
    fn test_overlapping_circles() {
        let a = RigidBody::circle(Vec2::ZERO, 1.0).fixed();
        let b = RigidBody::circle(Vec2::new(1.5, 0.0), 1.0);
        let manifold = circle_circle(&a, &b, &CollisionManifold::default());
        assert!(manifold.active);
        assert_relative_eq!(manifold.penetration, 0.5, epsilon = 1e-6);
        assert_relative_eq!(manifold.normal.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(manifold.normal.y, 0.0, epsilon = 1e-6);
        assert_eq!(manifold.collision_point, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_separated_circles_reset() {
        let a = RigidBody::circle(Vec2::ZERO, 1.0);
        let b = RigidBody::circle(Vec2::new(3.0, 0.0), 1.0);
        let previous = CollisionManifold {
            active: true,
            acc_impulse_normal: 4.0,
            acc_impulse_tangent: 1.0,
            ..Default::default()
        };
        let manifold = circle_circle(&a, &b, &previous);
        assert!(!manifold.active);
        assert_eq!(manifold.acc_impulse_normal, 0.0);
        assert_eq!(manifold.acc_impulse_tangent, 0.0);
    }

    #[test]
    fn test_impulses_carry_only_while_touching() {
        let a = RigidBody::circle(Vec2::ZERO, 1.0);
        let b = RigidBody::circle(Vec2::new(1.9, 0.0), 1.0);
        let mut previous = CollisionManifold {
            active: true,
            acc_impulse_normal: 4.0,
            ..Default::default()
        };
        assert_eq!(circle_circle(&a, &b, &previous).acc_impulse_normal, 4.0);

        previous.active = false;
        assert_eq!(circle_circle(&a, &b, &previous).acc_impulse_normal, 0.0);
    }

    #[test]
    fn test_circle_resting_on_box() {
        let ball = RigidBody::circle(Vec2::new(0.0, 0.9), 0.5);
        let manifold = circle_polygon(&ball, &floor(), &CollisionManifold::default());
        assert!(manifold.active);
        assert_relative_eq!(manifold.penetration, 0.1, epsilon = 1e-5);
        // Points from the circle into the polygon.
        assert_relative_eq!(manifold.normal.y, -1.0, epsilon = 1e-6);
        assert_relative_eq!(manifold.collision_point.y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_circle_centre_inside_box() {
        let ball = RigidBody::circle(Vec2::new(0.0, 0.3), 0.25);
        let manifold = circle_polygon(&ball, &floor(), &CollisionManifold::default());
        assert!(manifold.active);
        assert_relative_eq!(manifold.penetration, 0.25, epsilon = 1e-6);
        assert_relative_eq!(manifold.normal.y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_circle_polygon_respects_modes() {
        let ball = RigidBody::circle(Vec2::new(0.0, 0.9), 0.5)
            .with_collision_mode(crate::body::CollisionMode::Selective);
        assert!(!circle_polygon(&ball, &floor(), &CollisionManifold::default()).active);
    }

    #[test]
    fn test_box_on_box_has_two_contacts() {
        let block = RigidBody::rectangle(Vec2::new(0.0, 0.95), 1.0, 1.0);
        let manifold = polygon_polygon(&floor(), &block, &PolygonManifold::default());
        assert!(manifold.cm1.active);
        assert!(manifold.cm2.active);
        assert_relative_eq!(manifold.cm1.normal.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(manifold.cm1.penetration, 0.05, epsilon = 1e-4);
        let xs = [manifold.cm1.collision_point.x, manifold.cm2.collision_point.x];
        assert_relative_eq!(xs[0].abs(), 0.5, epsilon = 1e-4);
        assert_relative_eq!(xs[0] + xs[1], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_tilted_box_keeps_only_first_contact() {
        // Lowest corner sits 0.5 * (cos 0.4 + sin 0.4) below the centre.
        let block = RigidBody::rectangle(Vec2::new(0.0, 1.15), 1.0, 1.0).with_rotation(0.4);
        let touching = CollisionManifold {
            active: true,
            acc_impulse_normal: 3.0,
            acc_impulse_tangent: 0.5,
            ..Default::default()
        };
        let previous = PolygonManifold {
            cm1: touching,
            cm2: touching,
        };
        let manifold = polygon_polygon(&floor(), &block, &previous);

        assert!(manifold.cm1.active);
        assert_eq!(manifold.cm1.acc_impulse_normal, 3.0);
        assert_eq!(manifold.cm1.acc_impulse_tangent, 0.5);
        assert_relative_eq!(manifold.cm1.penetration, 0.00524, epsilon = 1e-4);
        assert_relative_eq!(manifold.cm1.normal.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(manifold.cm1.collision_point.x, -0.266, epsilon = 1e-3);

        assert!(!manifold.cm2.active);
        assert_eq!(manifold.cm2.acc_impulse_normal, 0.0);
        assert_eq!(manifold.cm2.acc_impulse_tangent, 0.0);
    }

    #[test]
    fn test_separated_boxes_reset() {
        let block = RigidBody::rectangle(Vec2::new(0.0, 2.0), 1.0, 1.0);
        let previous = PolygonManifold {
            cm1: CollisionManifold {
                active: true,
                acc_impulse_normal: 3.0,
                ..Default::default()
            },
            cm2: CollisionManifold::default(),
        };
        let manifold = polygon_polygon(&floor(), &block, &previous);
        assert!(!manifold.is_active());
        assert_eq!(manifold.cm1.acc_impulse_normal, 0.0);
    }

    #[test]
    fn test_elastic_head_on() {
        let v = 2.0;
        let a = RigidBody::circle(Vec2::ZERO, 1.0)
            .with_restitution(1.0)
            .with_velocity(Vec2::new(v / 2.0, 0.0));
        // Penetration below slop so the Baumgarte bias adds nothing.
        let b = RigidBody::circle(Vec2::new(1.995, 0.0), 1.0)
            .with_restitution(1.0)
            .with_velocity(Vec2::new(-v / 2.0, 0.0));
        let manifold = circle_circle(&a, &b, &CollisionManifold::default());
        let response = resolve_collision(&a, &b, &manifold, true, &EnvParams::default());
        assert!(response.is_colliding);

        let va = a.velocity + response.delta.a_dv;
        let vb = b.velocity + response.delta.b_dv;
        assert_relative_eq!((vb - va).dot(manifold.normal), v, epsilon = 1e-4);
    }

    #[test]
    fn test_friction_bounded_by_cone() {
        let a = floor().with_friction(1.0);
        let b = RigidBody::rectangle(Vec2::new(0.0, 0.95), 1.0, 1.0)
            .with_friction(1.0)
            .with_velocity(Vec2::new(5.0, -1.0));
        let manifold = polygon_polygon(&a, &b, &PolygonManifold::default());
        let params = EnvParams::default();
        let response = resolve_collision(&a, &b, &manifold.cm1, true, &params);
        let mu = friction_coefficient(1.0, 1.0, params.base_friction);
        assert!(response.acc_impulse_normal > 0.0);
        assert!(response.acc_impulse_tangent.abs() <= response.acc_impulse_normal * mu + 1e-6);
    }

    #[test]
    fn test_excluded_pair_not_resolved() {
        let a = RigidBody::circle(Vec2::ZERO, 1.0);
        let b = RigidBody::circle(Vec2::new(1.5, 0.0), 1.0);
        let mut manifold = circle_circle(&a, &b, &CollisionManifold::default());
        manifold.acc_impulse_normal = 2.0;
        let response = resolve_collision(&a, &b, &manifold, false, &EnvParams::default());
        assert!(!response.is_colliding);
        assert_eq!(response.acc_impulse_normal, 0.0);
        assert!(warm_start_impulse(&a, &b, &manifold, false).is_none());
        assert!(warm_start_impulse(&a, &b, &manifold, true).is_some());
    }
}
