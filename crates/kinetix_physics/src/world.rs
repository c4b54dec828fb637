//! Scene state: the fixed-capacity container every step mutates

use crate::body::{BodyRef, RigidBody, MAX_POLYGON_VERTICES};
use crate::config::StaticParams;
use crate::error::{PhysicsError, Result};
use crate::events::Terminal;
use crate::joint::{Joint, Thruster};
use crate::layers::CollisionMatrix;
use crate::manifold::{
    num_circle_pairs, num_circle_polygon_pairs, num_polygon_pairs, CollisionManifold, PairIndices, PolygonManifold,
};
use crate::mass;
use kinetix_math::Vec2;

/// Default downward gravity
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, -9.81);

/// Number of boundary fixtures [`SceneState::new`] installs
pub const NUM_BOUNDARY_FIXTURES: usize = 4;

/// Entity array of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Polygon,
    Circle,
    Joint,
    Thruster,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Polygon => "polygon",
            Self::Circle => "circle",
            Self::Joint => "joint",
            Self::Thruster => "thruster",
        }
    }
}

/// Every entity and manifold of one simulated scene
///
/// Array lengths equal the capacities in [`StaticParams`] and never change
/// except through [`SceneState::grow`]. Entities are never removed, only
/// deactivated, so indices stay stable.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub polygons: Vec<RigidBody>,
    pub circles: Vec<RigidBody>,
    pub joints: Vec<Joint>,
    pub thrusters: Vec<Thruster>,
    /// Side length is `polygons.len() + circles.len()`
    pub collision_matrix: CollisionMatrix,
    pub rr_manifolds: Vec<PolygonManifold>,
    pub cr_manifolds: Vec<CollisionManifold>,
    pub cc_manifolds: Vec<CollisionManifold>,
    pub gravity: Vec2,
    pub terminal: Terminal,
}

impl SceneState {
    /// All slots inactive
    pub fn blank(params: &StaticParams) -> Self {
        let mut state = Self {
            polygons: vec![RigidBody::empty_polygon(); params.num_polygons],
            circles: vec![RigidBody::empty_circle(); params.num_circles],
            joints: vec![Joint::default(); params.num_joints],
            thrusters: vec![Thruster::default(); params.num_thrusters],
            collision_matrix: CollisionMatrix::new(params.num_bodies()),
            rr_manifolds: Vec::new(),
            cr_manifolds: Vec::new(),
            cc_manifolds: Vec::new(),
            gravity: DEFAULT_GRAVITY,
            terminal: Terminal::Ongoing,
        };
        state.reset_manifolds(params);
        state.recalculate_collision_matrix();
        state
    }

    /// Blank scene enclosed by a floor, two walls and a ceiling
    ///
    /// The fixtures occupy polygon slots `0..4`, are immovable and have
    /// friction 1.
    pub fn new(params: &StaticParams) -> Result<Self> {
        if params.num_polygons < NUM_BOUNDARY_FIXTURES {
            return Err(PhysicsError::InvalidConfig(format!(
                "{} polygon slots cannot hold the {} boundary fixtures",
                params.num_polygons, NUM_BOUNDARY_FIXTURES
            )));
        }
        let mut state = Self::blank(params);

        let slab = mass::rectangle_vertices(5.0, 10.4);
        let fixtures: [(Vec2, [Vec2; MAX_POLYGON_VERTICES]); NUM_BOUNDARY_FIXTURES] = [
            (Vec2::new(2.5, -4.8), slab),
            (
                Vec2::ZERO,
                [Vec2::new(-5.0, 5.0), Vec2::new(0.0, 5.0), Vec2::new(0.0, 0.0), Vec2::new(-5.0, 0.0)],
            ),
            (
                Vec2::ZERO,
                [Vec2::new(5.0, 5.0), Vec2::new(10.0, 5.0), Vec2::new(10.0, 0.0), Vec2::new(5.0, 0.0)],
            ),
            (Vec2::new(2.5, 10.2), slab),
        ];
        for (slot, (position, vertices)) in fixtures.iter().enumerate() {
            state.polygons[slot] = RigidBody::static_polygon(*position, vertices)?.with_friction(1.0);
        }

        state.recalculate_global_positions();
        state.recalculate_collision_matrix();
        Ok(state)
    }

    /// Total body slots
    #[inline]
    pub fn num_bodies(&self) -> usize {
        self.polygons.len() + self.circles.len()
    }

    /// Address a unified body index
    #[inline]
    pub fn body_ref(&self, index: usize) -> BodyRef {
        BodyRef::from_unified(index, self.polygons.len())
    }

    pub fn unified_index(&self, body: BodyRef) -> usize {
        body.unified(self.polygons.len())
    }

    pub fn body(&self, index: usize) -> Option<&RigidBody> {
        self.body_by_ref(self.body_ref(index))
    }

    pub fn body_mut(&mut self, index: usize) -> Option<&mut RigidBody> {
        self.body_by_ref_mut(self.body_ref(index))
    }

    pub fn body_by_ref(&self, body: BodyRef) -> Option<&RigidBody> {
        match body {
            BodyRef::Polygon(i) => self.polygons.get(i),
            BodyRef::Circle(i) => self.circles.get(i),
        }
    }

    pub fn body_by_ref_mut(&mut self, body: BodyRef) -> Option<&mut RigidBody> {
        match body {
            BodyRef::Polygon(i) => self.polygons.get_mut(i),
            BodyRef::Circle(i) => self.circles.get_mut(i),
        }
    }

    /// Active bodies with their references, polygons first
    pub fn active_bodies(&self) -> impl Iterator<Item = (BodyRef, &RigidBody)> {
        let polygons = self.polygons.iter().enumerate().map(|(i, b)| (BodyRef::Polygon(i), b));
        let circles = self.circles.iter().enumerate().map(|(i, b)| (BodyRef::Circle(i), b));
        polygons.chain(circles).filter(|(_, b)| b.active)
    }

    fn body_checked(&self, index: usize) -> Result<&RigidBody> {
        self.body(index).ok_or(PhysicsError::BodyIndexOutOfRange {
            index,
            len: self.num_bodies(),
        })
    }

    /// Place a polygon in the lowest inactive slot
    pub fn add_polygon(&mut self, mut body: RigidBody) -> Result<usize> {
        if body.as_polygon().is_none() {
            return Err(PhysicsError::InvalidVertexCount(0));
        }
        let slot = lowest_inactive(self.polygons.iter().map(|b| b.active), EntityKind::Polygon)?;
        body.active = true;
        self.polygons[slot] = body;
        Ok(slot)
    }

    /// Place a circle in the lowest inactive slot, returning the circle slot
    pub fn add_circle(&mut self, mut body: RigidBody) -> Result<usize> {
        if body.as_polygon().is_some() {
            return Err(PhysicsError::InvalidConfig("add_circle expects a circle body".into()));
        }
        let slot = lowest_inactive(self.circles.iter().map(|b| b.active), EntityKind::Circle)?;
        body.active = true;
        self.circles[slot] = body;
        Ok(slot)
    }

    /// Place a joint in the lowest inactive slot and refresh the exclusion matrix
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<usize> {
        self.body_checked(joint.b_index)?;
        let a = self.body_checked(joint.a_index)?;
        let slot = lowest_inactive(self.joints.iter().map(|j| j.active), EntityKind::Joint)?;

        joint.active = true;
        joint.global_position = a.world_point(joint.a_relative_pos);
        self.joints[slot] = joint;
        self.recalculate_collision_matrix();
        Ok(slot)
    }

    /// Place a thruster in the lowest inactive slot
    pub fn add_thruster(&mut self, mut thruster: Thruster) -> Result<usize> {
        let owner = self.body_checked(thruster.object_index)?;
        let slot = lowest_inactive(self.thrusters.iter().map(|t| t.active), EntityKind::Thruster)?;

        thruster.active = true;
        thruster.global_position = owner.world_point(thruster.relative_position);
        self.thrusters[slot] = thruster;
        Ok(slot)
    }

    /// Deactivate a body together with every joint and thruster attached to it
    pub fn deactivate_body(&mut self, index: usize) -> Result<()> {
        let len = self.num_bodies();
        let body = self
            .body_mut(index)
            .ok_or(PhysicsError::BodyIndexOutOfRange { index, len })?;
        body.active = false;

        let mut detached = 0;
        for joint in self.joints.iter_mut().filter(|j| j.active) {
            if joint.a_index == index || joint.b_index == index {
                joint.active = false;
                detached += 1;
            }
        }
        for thruster in self.thrusters.iter_mut().filter(|t| t.active) {
            if thruster.object_index == index {
                thruster.active = false;
                detached += 1;
            }
        }
        log::debug!("Deactivated body {} and {} attachments", index, detached);
        self.recalculate_collision_matrix();
        Ok(())
    }

    pub fn deactivate_joint(&mut self, slot: usize) {
        if let Some(joint) = self.joints.get_mut(slot) {
            joint.active = false;
            self.recalculate_collision_matrix();
        }
    }

    /// Re-derive the exclusion matrix from the active joints
    pub fn recalculate_collision_matrix(&mut self) {
        self.collision_matrix = CollisionMatrix::from_joints(self.num_bodies(), &self.joints);
    }

    /// Refresh cached world positions of joints and thrusters
    ///
    /// A joint's world position is its anchor on body A.
    pub fn recalculate_global_positions(&mut self) {
        let n_polygons = self.polygons.len();
        let lookup = |polygons: &[RigidBody], circles: &[RigidBody], index: usize| -> Option<(Vec2, f32)> {
            let body = match BodyRef::from_unified(index, n_polygons) {
                BodyRef::Polygon(i) => polygons.get(i),
                BodyRef::Circle(i) => circles.get(i),
            }?;
            Some((body.position, body.rotation))
        };

        for joint in self.joints.iter_mut() {
            if let Some((position, rotation)) = lookup(&self.polygons, &self.circles, joint.a_index) {
                joint.global_position = kinetix_math::Mat2::from_angle(rotation) * joint.a_relative_pos + position;
            }
        }
        for thruster in self.thrusters.iter_mut() {
            if let Some((position, rotation)) = lookup(&self.polygons, &self.circles, thruster.object_index) {
                thruster.global_position = kinetix_math::Mat2::from_angle(rotation) * thruster.relative_position + position;
            }
        }
    }

    /// Outcome signalled by the pairs whose manifolds are in contact
    ///
    /// `pairs` must be the enumeration for this scene's capacities.
    pub fn contact_terminal(&self, pairs: &PairIndices) -> Terminal {
        let outcome = |a: BodyRef, b: BodyRef| match (self.body_by_ref(a), self.body_by_ref(b)) {
            (Some(a), Some(b)) if a.active && b.active => Terminal::from_roles(a.role, b.role),
            _ => Terminal::Ongoing,
        };
        let polygon_polygon = pairs
            .polygon_polygon
            .iter()
            .zip(&self.rr_manifolds)
            .filter(|(_, m)| m.is_active())
            .map(|(&(i, j), _)| outcome(BodyRef::Polygon(i), BodyRef::Polygon(j)));
        let circle_polygon = pairs
            .circle_polygon
            .iter()
            .zip(&self.cr_manifolds)
            .filter(|(_, m)| m.active)
            .map(|(&(i, j), _)| outcome(BodyRef::Circle(i), BodyRef::Polygon(j)));
        let circle_circle = pairs
            .circle_circle
            .iter()
            .zip(&self.cc_manifolds)
            .filter(|(_, m)| m.active)
            .map(|(&(i, j), _)| outcome(BodyRef::Circle(i), BodyRef::Circle(j)));
        Terminal::combine(polygon_polygon.chain(circle_polygon).chain(circle_circle))
    }

    /// Zeroed manifold arrays sized for `params`
    pub fn reset_manifolds(&mut self, params: &StaticParams) {
        let np = params.num_polygons;
        let nc = params.num_circles;
        self.rr_manifolds = vec![PolygonManifold::default(); num_polygon_pairs(np, params.num_static_fixated_polys)];
        self.cr_manifolds = vec![CollisionManifold::default(); num_circle_polygon_pairs(nc, np)];
        self.cc_manifolds = vec![CollisionManifold::default(); num_circle_pairs(nc)];
    }

    /// Double full capacities among `kinds`
    ///
    /// Only kinds with no inactive slot left grow. Joint and thruster
    /// references to circles are shifted by the change in polygon capacity;
    /// manifolds restart empty. Returns whether anything grew.
    pub fn grow(&mut self, params: &mut StaticParams, kinds: &[EntityKind]) -> bool {
        let old_polygons = params.num_polygons;
        let mut grew = false;

        for kind in kinds {
            let (is_full, len) = match kind {
                EntityKind::Polygon => (all_active(self.polygons.iter().map(|b| b.active)), self.polygons.len()),
                EntityKind::Circle => (all_active(self.circles.iter().map(|b| b.active)), self.circles.len()),
                EntityKind::Joint => (all_active(self.joints.iter().map(|j| j.active)), self.joints.len()),
                EntityKind::Thruster => (all_active(self.thrusters.iter().map(|t| t.active)), self.thrusters.len()),
            };
            if !is_full {
                continue;
            }
            let new_len = (len * 2).max(1);
            match kind {
                EntityKind::Polygon => {
                    self.polygons.resize(new_len, RigidBody::empty_polygon());
                    params.num_polygons = new_len;
                }
                EntityKind::Circle => {
                    self.circles.resize(new_len, RigidBody::empty_circle());
                    params.num_circles = new_len;
                }
                EntityKind::Joint => {
                    self.joints.resize(new_len, Joint::default());
                    params.num_joints = new_len;
                }
                EntityKind::Thruster => {
                    self.thrusters.resize(new_len, Thruster::default());
                    params.num_thrusters = new_len;
                }
            }
            grew = true;
        }
        if !grew {
            return false;
        }

        let shift = params.num_polygons - old_polygons;
        if shift > 0 {
            let remap = |index: &mut usize| {
                if *index >= old_polygons {
                    *index += shift;
                }
            };
            for joint in self.joints.iter_mut() {
                remap(&mut joint.a_index);
                remap(&mut joint.b_index);
            }
            for thruster in self.thrusters.iter_mut() {
                remap(&mut thruster.object_index);
            }
        }

        self.reset_manifolds(params);
        self.recalculate_collision_matrix();
        log::info!(
            "Scene grown to {} polygons, {} circles, {} joints, {} thrusters",
            params.num_polygons,
            params.num_circles,
            params.num_joints,
            params.num_thrusters
        );
        true
    }

    /// Check array lengths and cross references against `params`
    pub fn validate(&self, params: &StaticParams) -> Result<()> {
        let expect = |what: &'static str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(PhysicsError::CapacityMismatch { what, expected, actual })
            }
        };
        expect("polygon", params.num_polygons, self.polygons.len())?;
        expect("circle", params.num_circles, self.circles.len())?;
        expect("joint", params.num_joints, self.joints.len())?;
        expect("thruster", params.num_thrusters, self.thrusters.len())?;
        expect("collision_matrix", params.num_bodies(), self.collision_matrix.size())?;
        expect(
            "acc_rr_manifolds",
            num_polygon_pairs(params.num_polygons, params.num_static_fixated_polys),
            self.rr_manifolds.len(),
        )?;
        expect(
            "acc_cr_manifolds",
            num_circle_polygon_pairs(params.num_circles, params.num_polygons),
            self.cr_manifolds.len(),
        )?;
        expect("acc_cc_manifolds", num_circle_pairs(params.num_circles), self.cc_manifolds.len())?;

        let len = self.num_bodies();
        let in_range = |index: usize| {
            if index < len {
                Ok(())
            } else {
                Err(PhysicsError::BodyIndexOutOfRange { index, len })
            }
        };
        for joint in self.joints.iter().filter(|j| j.active) {
            in_range(joint.a_index)?;
            in_range(joint.b_index)?;
        }
        for thruster in self.thrusters.iter().filter(|t| t.active) {
            in_range(thruster.object_index)?;
        }
        Ok(())
    }
}

fn lowest_inactive(mut actives: impl Iterator<Item = bool>, kind: EntityKind) -> Result<usize> {
    actives.position(|active| !active).ok_or_else(|| {
        log::warn!("No free {} slot left", kind.name());
        PhysicsError::CapacityExhausted(kind.name())
    })
}

fn all_active(mut actives: impl Iterator<Item = bool>) -> bool {
    actives.all(|a| a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_scene() {
        let params = StaticParams::small();
        let state = SceneState::blank(&params);
        assert_eq!(state.active_bodies().count(), 0);
        assert_eq!(state.gravity, DEFAULT_GRAVITY);
        assert!(state.validate(&params).is_ok());
        assert_eq!(state.rr_manifolds.len(), 4);
        assert_eq!(state.cr_manifolds.len(), 10);
        assert_eq!(state.cc_manifolds.len(), 1);
    }

    #[test]
    fn test_boundary_fixtures() {
        let state = SceneState::new(&StaticParams::default()).unwrap();
        for body in &state.polygons[..NUM_BOUNDARY_FIXTURES] {
            assert!(body.active);
            assert!(body.is_static());
            assert_eq!(body.friction, 1.0);
        }
        assert_eq!(state.polygons[0].position, Vec2::new(2.5, -4.8));
        assert_eq!(state.polygons[1].as_polygon().unwrap().vertices[0], Vec2::new(-5.0, 5.0));
        assert!(!state.polygons[4].active);

        let tiny = StaticParams::default().with_capacities(3, 1, 1, 1).with_static_fixated_polys(3);
        assert!(SceneState::new(&tiny).is_err());
    }

    #[test]
    fn test_lowest_slot_reuse_and_exhaustion() {
        let params = StaticParams::small();
        let mut state = SceneState::new(&params).unwrap();
        assert_eq!(state.add_polygon(RigidBody::rectangle(Vec2::new(2.5, 1.0), 1.0, 1.0)).unwrap(), 4);
        assert!(matches!(
            state.add_polygon(RigidBody::rectangle(Vec2::ZERO, 1.0, 1.0)),
            Err(PhysicsError::CapacityExhausted("polygon"))
        ));

        assert_eq!(state.add_circle(RigidBody::circle(Vec2::ZERO, 0.5)).unwrap(), 0);
        assert_eq!(state.add_circle(RigidBody::circle(Vec2::ZERO, 0.5)).unwrap(), 1);
        state.deactivate_body(5).unwrap();
        assert_eq!(state.add_circle(RigidBody::circle(Vec2::ZERO, 0.5)).unwrap(), 0);
    }

    #[test]
    fn test_joint_updates_matrix_and_detaches() {
        let params = StaticParams::small();
        let mut state = SceneState::new(&params).unwrap();
        let circle = state.add_circle(RigidBody::circle(Vec2::new(2.0, 2.0), 0.5)).unwrap();
        let circle = state.unified_index(BodyRef::Circle(circle));
        state
            .add_joint(Joint::revolute(0, circle, Vec2::new(0.0, 5.0), Vec2::ZERO))
            .unwrap();
        state.add_thruster(Thruster::new(circle, Vec2::X, 0.0, 1.0)).unwrap();
        assert!(!state.collision_matrix.can_collide(0, circle));

        state.deactivate_body(circle).unwrap();
        assert!(!state.joints[0].active);
        assert!(!state.thrusters[0].active);
        assert!(state.collision_matrix.can_collide(0, circle));
    }

    #[test]
    fn test_joint_index_checked() {
        let mut state = SceneState::new(&StaticParams::small()).unwrap();
        assert!(matches!(
            state.add_joint(Joint::revolute(0, 40, Vec2::ZERO, Vec2::ZERO)),
            Err(PhysicsError::BodyIndexOutOfRange { index: 40, len: 7 })
        ));
    }

    #[test]
    fn test_grow_remaps_circle_references() {
        let mut params = StaticParams::small();
        let mut state = SceneState::new(&params).unwrap();
        state.add_polygon(RigidBody::rectangle(Vec2::new(2.5, 1.0), 1.0, 1.0)).unwrap();
        state.add_circle(RigidBody::circle(Vec2::new(2.0, 2.0), 0.5)).unwrap();
        state.add_joint(Joint::revolute(4, 5, Vec2::ZERO, Vec2::ZERO)).unwrap();

        // Circles still have a free slot, so only polygons double.
        assert!(state.grow(&mut params, &[EntityKind::Polygon, EntityKind::Circle]));
        assert_eq!(params.num_polygons, 10);
        assert_eq!(params.num_circles, 2);
        assert_eq!(state.joints[0].a_index, 4);
        assert_eq!(state.joints[0].b_index, 10);
        assert!(state.circles[0].active);
        assert!(state.validate(&params).is_ok());
        assert!(!state.collision_matrix.can_collide(4, 10));

        assert!(!state.grow(&mut params, &[EntityKind::Circle]));
    }

    #[test]
    fn test_validate_detects_mismatch() {
        let state = SceneState::blank(&StaticParams::small());
        assert!(matches!(
            state.validate(&StaticParams::medium()),
            Err(PhysicsError::CapacityMismatch { what: "polygon", .. })
        ));
    }

    #[test]
    fn test_global_positions_follow_bodies() {
        let mut state = SceneState::new(&StaticParams::small()).unwrap();
        let slot = state.add_circle(RigidBody::circle(Vec2::new(2.0, 2.0), 0.5)).unwrap();
        let index = state.unified_index(BodyRef::Circle(slot));
        state.add_thruster(Thruster::new(index, Vec2::new(0.5, 0.0), 0.0, 1.0)).unwrap();
        state.circles[slot].position = Vec2::new(3.0, 2.0);
        state.recalculate_global_positions();
        assert_eq!(state.thrusters[0].global_position, Vec2::new(3.5, 2.0));
    }
}
