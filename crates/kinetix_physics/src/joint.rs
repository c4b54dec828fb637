//! Joints, motors and thrusters
//!
//! A joint pins an anchor on body A to an anchor on body B. Revolute joints
//! leave the relative rotation free (optionally limited and motorised);
//! fixed joints also drive the relative rotation to a target.
//!
//! The resolver functions are pure: they read two bodies and a joint and
//! return the velocity and position corrections for the stepper to apply.

use crate::body::{RigidBody, VelocityDelta};
use crate::config::EnvParams;
use kinetix_math::{clamp, sign, zero_to_one, Vec2};

/// A pin or weld between two bodies
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Joint {
    /// Unified body index of side A
    pub a_index: usize,
    /// Unified body index of side B
    pub b_index: usize,
    /// Anchor in A's local frame
    pub a_relative_pos: Vec2,
    /// Anchor in B's local frame
    pub b_relative_pos: Vec2,
    /// World anchor, refreshed every step
    pub global_position: Vec2,
    pub active: bool,

    /// Linear impulse carried into the next step's warm start
    pub acc_impulse: Vec2,
    /// Angular impulse carried into the next warm start (fixed joints only)
    pub acc_r_impulse: f32,

    pub motor_speed: f32,
    pub motor_power: f32,
    pub motor_on: bool,

    pub motor_has_joint_limits: bool,
    pub min_rotation: f32,
    pub max_rotation: f32,

    pub is_fixed_joint: bool,
    /// Target (fixed) or reference (revolute) relative rotation
    pub rotation: f32,

    /// Slot in the external binding-action vector
    pub motor_binding: usize,
}

impl Joint {
    /// Free-spinning pin joint
    pub fn revolute(a_index: usize, b_index: usize, a_relative_pos: Vec2, b_relative_pos: Vec2) -> Self {
        Self {
            a_index,
            b_index,
            a_relative_pos,
            b_relative_pos,
            active: true,
            ..Default::default()
        }
    }

    /// Weld holding `b.rotation - a.rotation` at `rotation`
    pub fn fixed(a_index: usize, b_index: usize, a_relative_pos: Vec2, b_relative_pos: Vec2, rotation: f32) -> Self {
        Self {
            is_fixed_joint: true,
            rotation,
            ..Self::revolute(a_index, b_index, a_relative_pos, b_relative_pos)
        }
    }

    /// Enable the motor
    pub fn with_motor(mut self, speed: f32, power: f32) -> Self {
        self.motor_on = true;
        self.motor_speed = speed;
        self.motor_power = power;
        self
    }

    /// Limit relative rotation to `[min, max]`
    pub fn with_limits(mut self, min: f32, max: f32) -> Self {
        self.motor_has_joint_limits = true;
        self.min_rotation = min;
        self.max_rotation = max;
        self
    }

    pub fn with_binding(mut self, binding: usize) -> Self {
        self.motor_binding = binding;
        self
    }

    /// Relative rotation measured from the joint's reference angle
    #[inline]
    pub fn relative_rotation(&self, a: &RigidBody, b: &RigidBody) -> f32 {
        b.rotation - a.rotation - self.rotation
    }

    /// Whether the joint takes part in solving
    #[inline]
    fn resolvable(&self, a: &RigidBody, b: &RigidBody) -> bool {
        !(a.is_static() && b.is_static()) && self.active && a.active && b.active
    }
}

/// A force source attached to a body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Thruster {
    /// Unified body index of the owner
    pub object_index: usize,
    pub relative_position: Vec2,
    /// Thrust direction relative to the owner's rotation
    pub rotation: f32,
    pub power: f32,
    /// World position, refreshed every step
    pub global_position: Vec2,
    pub active: bool,

    pub thruster_binding: usize,
}

impl Thruster {
    pub fn new(object_index: usize, relative_position: Vec2, rotation: f32, power: f32) -> Self {
        Self {
            object_index,
            relative_position,
            rotation,
            power,
            active: true,
            ..Default::default()
        }
    }

    pub fn with_binding(mut self, binding: usize) -> Self {
        self.thruster_binding = binding;
        self
    }
}

/// World-space anchor geometry of a joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAnchors {
    /// Inverse-mass weighted anchor, or the static side's anchor
    pub joint_point: Vec2,
    pub a_point: Vec2,
    pub b_point: Vec2,
    /// Rotated anchor offsets
    pub r_a: Vec2,
    pub r_b: Vec2,
}

pub fn joint_anchors(a: &RigidBody, b: &RigidBody, joint: &Joint) -> JointAnchors {
    let r_a = a.rotation_matrix() * joint.a_relative_pos;
    let r_b = b.rotation_matrix() * joint.b_relative_pos;
    let a_point = r_a + a.position;
    let b_point = r_b + b.position;

    let joint_point = if a.is_static() {
        a_point
    } else if b.is_static() {
        b_point
    } else {
        let a_inv = zero_to_one(a.inverse_mass);
        let b_inv = zero_to_one(b.inverse_mass);
        (a_point / a_inv + b_point / b_inv) / (1.0 / a_inv + 1.0 / b_inv)
    };

    JointAnchors {
        joint_point,
        a_point,
        b_point,
        r_a,
        r_b,
    }
}

/// Result of one joint solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointResponse {
    pub delta: VelocityDelta,
    /// Position corrections, applied directly rather than through velocity
    pub a_dp: Vec2,
    pub b_dp: Vec2,
    pub joint_point: Vec2,
    pub acc_impulse: Vec2,
    pub acc_r_impulse: f32,
}

/// Solve the anchor constraint and the angular constraint of one joint
///
/// Returns `None` when the joint is inactive, either body is inactive, or
/// both bodies are static.
pub fn resolve_joint(a: &RigidBody, b: &RigidBody, joint: &Joint, params: &EnvParams) -> Option<JointResponse> {
    if !joint.resolvable(a, b) {
        return None;
    }

    let sum_inv_mass = zero_to_one(a.inverse_mass + b.inverse_mass);
    let sum_inv_inertia = zero_to_one(a.inverse_inertia + b.inverse_inertia);
    let JointAnchors {
        joint_point,
        a_point,
        b_point,
        r_a,
        r_b,
    } = joint_anchors(a, b, joint);

    let relative_velocity = b.point_velocity(joint_point) - a.point_velocity(joint_point);
    let direction = relative_velocity / zero_to_one(relative_velocity.length());

    let effective_mass = sum_inv_mass
        + r_a.cross(direction).powi(2) * a.inverse_inertia
        + r_b.cross(direction).powi(2) * b.inverse_inertia;
    let impulse = (relative_velocity + (b_point - a_point) * params.baumgarte_coefficient_joints_v)
        / effective_mass
        * params.joint_stiffness;

    let a_dv = impulse * a.inverse_mass;
    let mut a_drv = r_a.cross(impulse) * a.inverse_inertia;
    let b_dv = -impulse * b.inverse_mass;
    let mut b_drv = -r_b.cross(impulse) * b.inverse_inertia;

    let diff = (b_point - a_point) / sum_inv_mass;
    let a_dp = diff * (a.inverse_mass * params.baumgarte_coefficient_joints_p);
    let b_dp = -diff * (b.inverse_mass * params.baumgarte_coefficient_joints_p);

    let relative_rotation = joint.relative_rotation(a, b);
    let target_rotation = clamp(relative_rotation, joint.min_rotation, joint.max_rotation);
    let limit_bias = (relative_rotation - target_rotation) * params.baumgarte_coefficient_joint_limit_av;
    let fixed_bias = relative_rotation * params.baumgarte_coefficient_fixed_joint_av;

    let raw_dav = b.angular_velocity + b_drv - a.angular_velocity - a_drv;
    let dav = if joint.is_fixed_joint {
        raw_dav + fixed_bias
    } else if sign(raw_dav) == sign(limit_bias) {
        // A limit only pushes back; it never fights motion into the range.
        raw_dav + limit_bias
    } else {
        0.0
    };

    let applies_rotation = joint.is_fixed_joint
        || (joint.motor_has_joint_limits && target_rotation != relative_rotation);
    let r_impulse = if applies_rotation { dav / sum_inv_inertia } else { 0.0 };

    a_drv += r_impulse * a.inverse_inertia;
    b_drv -= r_impulse * b.inverse_inertia;

    let acc_r_impulse = if joint.is_fixed_joint {
        r_impulse + joint.acc_r_impulse
    } else {
        0.0
    };

    Some(JointResponse {
        delta: VelocityDelta { a_dv, a_drv, b_dv, b_drv },
        a_dp,
        b_dp,
        joint_point,
        acc_impulse: impulse + joint.acc_impulse,
        acc_r_impulse,
    })
}

/// Re-apply the joint's stored impulses before the iteration loop
pub fn joint_warm_start(a: &RigidBody, b: &RigidBody, joint: &Joint) -> Option<VelocityDelta> {
    if !joint.resolvable(a, b) {
        return None;
    }
    let impulse = joint.acc_impulse;
    let r_a = a.rotation_matrix() * joint.a_relative_pos;
    let r_b = b.rotation_matrix() * joint.b_relative_pos;

    Some(VelocityDelta {
        a_dv: impulse * a.inverse_mass,
        a_drv: r_a.cross(impulse) * a.inverse_inertia + joint.acc_r_impulse * a.inverse_inertia,
        b_dv: -impulse * b.inverse_mass,
        b_drv: -r_b.cross(impulse) * b.inverse_inertia - joint.acc_r_impulse * b.inverse_inertia,
    })
}

/// Angular velocity change from a joint motor for this step's action
///
/// Torque saturates through `tanh` of the angular-velocity error. Near a
/// limit the torque fades over `motor_joint_limit` radians, unless the
/// action drives back into the allowed range.
pub fn motor_impulse(a: &RigidBody, b: &RigidBody, joint: &Joint, action: f32, params: &EnvParams) -> Option<VelocityDelta> {
    if !(a.active && b.active && joint.active && joint.motor_on && !joint.is_fixed_joint && action != 0.0) {
        return None;
    }

    let axial_mass = 1.0 / zero_to_one(a.inverse_inertia + b.inverse_inertia);
    let mut power = params.base_motor_power * joint.motor_power * params.dt * axial_mass;
    let av_target = b.angular_velocity - a.angular_velocity - joint.motor_speed * action * params.base_motor_speed;
    let torque_direction = (av_target * params.motor_decay_coefficient).tanh();

    if joint.motor_has_joint_limits {
        let relative_rotation = joint.relative_rotation(a, b);
        let target = clamp(
            relative_rotation,
            joint.min_rotation + params.motor_joint_limit,
            joint.max_rotation - params.motor_joint_limit,
        );
        let overshoot = relative_rotation - target;
        let fade = if overshoot == 0.0 {
            1.0
        } else {
            (1.0 - (overshoot / params.motor_joint_limit).abs()).max(0.0)
        };
        let reversing = if sign(overshoot) != sign(action) { 1.0 } else { 0.0 };
        power *= fade.max(reversing);
    }

    Some(VelocityDelta {
        a_drv: power * torque_direction * a.inverse_inertia,
        b_drv: -power * torque_direction * b.inverse_inertia,
        ..Default::default()
    })
}

/// Thruster output for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrusterResponse {
    pub global_position: Vec2,
    pub dv: Vec2,
    pub drv: f32,
}

/// Thrust along the owner's rotation plus the thruster's own rotation
///
/// The impulse is `power * base_thruster_power * dt * action`, applied at
/// the thruster's offset so an off-centre thruster also spins its owner.
pub fn thruster_impulse(owner: &RigidBody, thruster: &Thruster, action: f32, params: &EnvParams) -> ThrusterResponse {
    let offset = owner.rotation_matrix() * thruster.relative_position;
    let global_position = offset + owner.position;
    if action == 0.0 {
        return ThrusterResponse {
            global_position,
            dv: Vec2::ZERO,
            drv: 0.0,
        };
    }
    let direction = Vec2::from_angle(owner.rotation + thruster.rotation);
    let force = thruster.power * params.base_thruster_power * params.dt * action;
    ThrusterResponse {
        global_position,
        dv: direction * (force * owner.inverse_mass),
        drv: owner.inverse_inertia * offset.cross(direction) * force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn anchor() -> RigidBody {
        RigidBody::rectangle(Vec2::ZERO, 1.0, 1.0).fixed()
    }

    #[test]
    fn test_anchor_prefers_static_side() {
        let a = anchor();
        let b = RigidBody::circle(Vec2::new(2.0, 0.0), 0.5);
        let joint = Joint::revolute(0, 1, Vec2::new(0.5, 0.0), Vec2::new(-1.0, 0.0));
        let anchors = joint_anchors(&a, &b, &joint);
        assert_eq!(anchors.joint_point, Vec2::new(0.5, 0.0));
        assert_eq!(anchors.b_point, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_weighted_anchor() {
        let a = RigidBody::circle(Vec2::ZERO, 1.0);
        let b = RigidBody::circle(Vec2::new(2.0, 0.0), 1.0);
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::ZERO);
        let anchors = joint_anchors(&a, &b, &joint);
        assert_relative_eq!(anchors.joint_point.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_two_static_bodies_skip() {
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::ZERO);
        assert!(resolve_joint(&anchor(), &anchor(), &joint, &EnvParams::default()).is_none());
        assert!(joint_warm_start(&anchor(), &anchor(), &joint).is_none());
    }

    #[test]
    fn test_joint_pulls_bodies_together() {
        let a = anchor();
        let b = RigidBody::circle(Vec2::new(0.0, -1.1), 0.25);
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::new(0.0, 1.0));
        let response = resolve_joint(&a, &b, &joint, &EnvParams::default()).unwrap();
        // B hangs 0.1 below the anchor: it is pulled up, A is unaffected.
        assert!(response.delta.b_dv.y > 0.0);
        assert!(response.b_dp.y > 0.0);
        assert_eq!(response.delta.a_dv, Vec2::ZERO);
        assert_eq!(response.acc_r_impulse, 0.0);
    }

    #[test]
    fn test_fixed_joint_corrects_rotation() {
        let a = anchor();
        let b = RigidBody::rectangle(Vec2::ZERO, 1.0, 1.0).with_rotation(0.2);
        let joint = Joint::fixed(0, 1, Vec2::ZERO, Vec2::ZERO, 0.0);
        let response = resolve_joint(&a, &b, &joint, &EnvParams::default()).unwrap();
        assert!(response.delta.b_drv < 0.0);
        assert!(response.acc_r_impulse > 0.0);
    }

    #[test]
    fn test_limit_only_pushes_back() {
        let a = anchor();
        let b = RigidBody::rectangle(Vec2::ZERO, 1.0, 1.0).with_rotation(0.5);
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::ZERO).with_limits(-0.3, 0.3);
        let params = EnvParams::default();

        // Still rotating further past the limit: corrected.
        let outward = b.clone().with_angular_velocity(1.0);
        let response = resolve_joint(&a, &outward, &joint, &params).unwrap();
        assert!(response.delta.b_drv < 0.0);

        // Already heading back inside: left alone.
        let inward = b.with_angular_velocity(-1.0);
        let response = resolve_joint(&a, &inward, &joint, &params).unwrap();
        assert_eq!(response.delta.b_drv, 0.0);
    }

    #[test]
    fn test_motor_direction_and_gating() {
        let a = anchor();
        let b = RigidBody::circle(Vec2::ZERO, 0.5);
        let params = EnvParams::default();
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::ZERO).with_motor(1.0, 1.0);

        let delta = motor_impulse(&a, &b, &joint, 1.0, &params).unwrap();
        // Spins B up toward the commanded relative speed.
        assert!(delta.b_drv > 0.0);
        assert_eq!(delta.a_drv, 0.0);
        assert!(motor_impulse(&a, &b, &joint, 0.0, &params).is_none());

        let welded = Joint::fixed(0, 1, Vec2::ZERO, Vec2::ZERO, 0.0).with_motor(1.0, 1.0);
        assert!(motor_impulse(&a, &b, &welded, 1.0, &params).is_none());
    }

    #[test]
    fn test_motor_fades_at_limit() {
        let a = anchor();
        let params = EnvParams::default();
        let joint = Joint::revolute(0, 1, Vec2::ZERO, Vec2::ZERO)
            .with_motor(1.0, 1.0)
            .with_limits(-0.5, 0.5);
        let free = RigidBody::circle(Vec2::ZERO, 0.5);
        let at_limit = free.clone().with_rotation(0.6);

        let full = motor_impulse(&a, &free, &joint, -1.0, &params).unwrap();
        // Pushing further into the upper limit is suppressed entirely.
        let blocked = motor_impulse(&a, &at_limit, &joint, 1.0, &params).unwrap();
        // Driving away from the limit keeps full power.
        let away = motor_impulse(&a, &at_limit, &joint, -1.0, &params).unwrap();
        assert_eq!(blocked.b_drv, 0.0);
        assert_relative_eq!(away.b_drv, full.b_drv, epsilon = 1e-6);
    }

    #[test]
    fn test_thruster_off_centre_spins_owner() {
        let owner = RigidBody::rectangle(Vec2::new(1.0, 1.0), 2.0, 1.0);
        let thruster = Thruster::new(0, Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2, 1.0);
        let params = EnvParams::default();

        let idle = thruster_impulse(&owner, &thruster, 0.0, &params);
        assert_eq!(idle.global_position, Vec2::new(2.0, 1.0));
        assert_eq!(idle.dv, Vec2::ZERO);

        let firing = thruster_impulse(&owner, &thruster, 1.0, &params);
        assert!(firing.dv.y > 0.0);
        assert!(firing.drv > 0.0);
    }
}
