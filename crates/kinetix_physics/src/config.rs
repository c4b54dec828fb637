//! Physics configuration
//!
//! Two parameter blocks drive the engine. [`StaticParams`] fixes array
//! capacities and solver shape for a whole episode; [`EnvParams`] holds the
//! tunable constants read every step. Field names match the persisted level
//! format.

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};

/// Per-step simulation constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvParams {
    /// Fixed timestep
    pub dt: f32,

    /// Penetration allowed before Baumgarte correction kicks in
    pub slop: f32,
    pub baumgarte_coefficient_joints_v: f32,
    pub baumgarte_coefficient_joints_p: f32,
    #[serde(rename = "baumgarte_coefficient_fjoint_av")]
    pub baumgarte_coefficient_fixed_joint_av: f32,
    #[serde(rename = "baumgarte_coefficient_rjoint_limit_av")]
    pub baumgarte_coefficient_joint_limit_av: f32,
    pub baumgarte_coefficient_collision: f32,
    /// Fraction of the linear joint impulse applied per iteration
    pub joint_stiffness: f32,

    pub clip_position: f32,
    pub clip_velocity: f32,
    pub clip_angular_velocity: f32,

    /// Motor speed scale (rad/s)
    pub base_motor_speed: f32,
    pub base_motor_power: f32,
    pub base_thruster_power: f32,
    pub motor_decay_coefficient: f32,
    /// Margin (rad) inside a joint limit where motor torque fades out
    pub motor_joint_limit: f32,

    /// Friction scale applied to both bodies' coefficients
    pub base_friction: f32,

    pub pixels_per_unit: f32,
    /// Derived from the screen size on load; never written
    #[serde(default = "default_num_units", skip_serializing)]
    pub num_units: f32,
    pub max_timesteps: u32,
    pub dense_reward_scale: f32,
    pub num_shape_roles: u32,
}

fn default_num_units() -> f32 {
    5.0
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            slop: 0.01,
            baumgarte_coefficient_joints_v: 2.0,
            baumgarte_coefficient_joints_p: 0.7,
            baumgarte_coefficient_fixed_joint_av: 2.0,
            baumgarte_coefficient_joint_limit_av: 5.0,
            baumgarte_coefficient_collision: 0.2,
            joint_stiffness: 0.6,
            clip_position: 15.0,
            clip_velocity: 100.0,
            clip_angular_velocity: 50.0,
            base_motor_speed: 6.0,
            base_motor_power: 900.0,
            base_thruster_power: 10.0,
            motor_decay_coefficient: 0.1,
            motor_joint_limit: 0.1,
            base_friction: 0.4,
            pixels_per_unit: 100.0,
            num_units: default_num_units(),
            max_timesteps: 5,
            dense_reward_scale: 1.0,
            num_shape_roles: 4,
        }
    }
}

impl EnvParams {
    /// Set timestep
    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    /// Set the friction scale
    pub fn with_base_friction(mut self, base_friction: f32) -> Self {
        self.base_friction = base_friction;
        self
    }

    /// Set the linear joint stiffness
    pub fn with_joint_stiffness(mut self, stiffness: f32) -> Self {
        self.joint_stiffness = stiffness;
        self
    }

    /// Set the contact Baumgarte coefficient
    pub fn with_collision_baumgarte(mut self, coefficient: f32) -> Self {
        self.baumgarte_coefficient_collision = coefficient;
        self
    }

    /// Reject parameter combinations that would divide by zero
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!("dt must be positive, got {}", self.dt)));
        }
        if self.motor_joint_limit == 0.0 {
            return Err(PhysicsError::InvalidConfig("motor_joint_limit must be non-zero".into()));
        }
        Ok(())
    }
}

/// Episode-wide capacities and solver shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticParams {
    pub num_polygons: usize,
    pub num_circles: usize,
    pub num_joints: usize,
    pub num_thrusters: usize,
    pub max_polygon_vertices: usize,

    pub num_solver_iterations: usize,
    /// Manifolds resolved simultaneously per batch; 1 is plain Gauss-Seidel
    pub solver_batch_size: usize,
    pub do_warm_starting: bool,
    /// Leading polygon slots that never move and never collide with each other
    pub num_static_fixated_polys: usize,

    pub screen_dim: [u32; 2],

    pub max_shape_size: f32,
    pub num_motor_bindings: usize,
    pub num_thruster_bindings: usize,
    pub frame_skip: usize,
    #[serde(default = "default_downscale", skip_serializing)]
    pub downscale: u32,
}

fn default_downscale() -> u32 {
    1
}

impl Default for StaticParams {
    fn default() -> Self {
        Self {
            num_polygons: 12,
            num_circles: 4,
            num_joints: 6,
            num_thrusters: 2,
            max_polygon_vertices: crate::body::MAX_POLYGON_VERTICES,
            num_solver_iterations: 10,
            solver_batch_size: 16,
            do_warm_starting: true,
            num_static_fixated_polys: 4,
            screen_dim: [500, 500],
            max_shape_size: 2.0,
            num_motor_bindings: 4,
            num_thruster_bindings: 2,
            frame_skip: 1,
            downscale: default_downscale(),
        }
    }
}

/// Size presets keyed the way compressed level files name them
const SIZE_PRESETS: [(&str, [usize; 4]); 3] = [
    ("s", [5, 2, 1, 1]),
    ("m", [6, 3, 2, 2]),
    ("l", [12, 4, 6, 2]),
];

impl StaticParams {
    fn with_counts([polygons, circles, joints, thrusters]: [usize; 4]) -> Self {
        Self {
            num_polygons: polygons,
            num_circles: circles,
            num_joints: joints,
            num_thrusters: thrusters,
            ..Default::default()
        }
    }

    /// 5 polygons, 2 circles, 1 joint, 1 thruster
    pub fn small() -> Self {
        Self::with_counts(SIZE_PRESETS[0].1)
    }

    /// 6 polygons, 3 circles, 2 joints, 2 thrusters
    pub fn medium() -> Self {
        Self::with_counts(SIZE_PRESETS[1].1)
    }

    /// 12 polygons, 4 circles, 6 joints, 2 thrusters
    pub fn large() -> Self {
        Self::with_counts(SIZE_PRESETS[2].1)
    }

    /// Look up a preset by its compressed key (`"s"`, `"m"`, `"l"`)
    pub fn by_size(size: &str) -> Result<Self> {
        SIZE_PRESETS
            .iter()
            .find(|(key, _)| *key == size)
            .map(|(_, counts)| Self::with_counts(*counts))
            .ok_or_else(|| PhysicsError::UnknownSizePreset(size.to_string()))
    }

    /// The preset whose entity counts match these params, if any
    pub fn size_key(&self) -> Option<&'static str> {
        SIZE_PRESETS
            .iter()
            .find(|(_, counts)| *counts == self.counts())
            .map(|(key, _)| *key)
    }

    /// Whether two param sets describe the same entity capacities
    pub fn same_capacities(&self, other: &StaticParams) -> bool {
        self.counts() == other.counts()
    }

    fn counts(&self) -> [usize; 4] {
        [self.num_polygons, self.num_circles, self.num_joints, self.num_thrusters]
    }

    /// Total body slots; the side length of the collision matrix
    pub fn num_bodies(&self) -> usize {
        self.num_polygons + self.num_circles
    }

    /// Length of the action vector `step` expects
    pub fn action_len(&self) -> usize {
        self.num_joints + self.num_thrusters
    }

    /// Set solver iteration count
    pub fn with_solver_iterations(mut self, iterations: usize) -> Self {
        self.num_solver_iterations = iterations;
        self
    }

    /// Set solver batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.solver_batch_size = batch_size;
        self
    }

    /// Enable or disable warm starting
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.do_warm_starting = enabled;
        self
    }

    /// Set the number of leading fixated polygon slots
    pub fn with_static_fixated_polys(mut self, count: usize) -> Self {
        self.num_static_fixated_polys = count;
        self
    }

    /// Set all four entity capacities
    pub fn with_capacities(mut self, polygons: usize, circles: usize, joints: usize, thrusters: usize) -> Self {
        self.num_polygons = polygons;
        self.num_circles = circles;
        self.num_joints = joints;
        self.num_thrusters = thrusters;
        self
    }

    /// Reject parameter combinations the stepper cannot run
    pub fn validate(&self) -> Result<()> {
        if self.solver_batch_size == 0 {
            return Err(PhysicsError::InvalidConfig("solver_batch_size must be at least 1".into()));
        }
        if self.num_solver_iterations == 0 {
            return Err(PhysicsError::InvalidConfig("num_solver_iterations must be at least 1".into()));
        }
        if self.max_polygon_vertices != crate::body::MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidConfig(format!(
                "max_polygon_vertices must be {}, got {}",
                crate::body::MAX_POLYGON_VERTICES,
                self.max_polygon_vertices
            )));
        }
        if self.num_static_fixated_polys > self.num_polygons {
            return Err(PhysicsError::InvalidConfig(format!(
                "{} fixated polygons exceed {} polygon slots",
                self.num_static_fixated_polys, self.num_polygons
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StaticParams::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.size_key(), Some("l"));
        assert_eq!(config.action_len(), 8);
        assert!(EnvParams::default().validate().is_ok());
    }

    #[test]
    fn test_size_presets() {
        let small = StaticParams::by_size("s").unwrap();
        assert_eq!(small.num_polygons, 5);
        assert_eq!(small.num_thrusters, 1);
        assert_eq!(small.size_key(), Some("s"));
        assert!(small.same_capacities(&StaticParams::small()));
        assert_eq!(StaticParams::medium().size_key(), Some("m"));
        assert!(matches!(
            StaticParams::by_size("xl"),
            Err(PhysicsError::UnknownSizePreset(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        assert!(StaticParams::default().with_batch_size(0).validate().is_err());
        assert!(StaticParams::small().with_static_fixated_polys(6).validate().is_err());
        assert!(EnvParams::default().with_dt(0.0).validate().is_err());
    }

    #[test]
    fn test_snake_case_keys() {
        let json = serde_json::to_value(EnvParams::default()).unwrap();
        assert!(json.get("baumgarte_coefficient_fjoint_av").is_some());
        assert!(json.get("baumgarte_coefficient_rjoint_limit_av").is_some());
        assert!(json.get("num_units").is_none());

        let json = serde_json::to_value(StaticParams::default()).unwrap();
        assert_eq!(json["screen_dim"], serde_json::json!([500, 500]));
        assert!(json.get("downscale").is_none());
    }
}
