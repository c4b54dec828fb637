//! Persisted level format
//!
//! A level is a JSON document with three blocks:
//!
//! ```text
//! {
//!   "env_state":         { polygon, circle, joint, thruster, collision_matrix,
//!                          acc_rr_manifolds, acc_cr_manifolds, acc_cc_manifolds, gravity },
//!   "env_params":        { ...EnvParams } | { type, size, params },
//!   "static_env_params": { ...StaticParams } | { type, size, params },
//!   "version":           "1.0.0"
//! }
//! ```
//!
//! Older writers stored arrays as objects keyed `"0"`, `"1"`, ... and
//! collision-matrix cells as numbers; both forms are accepted on load.

use crate::body::{CollisionMode, Polygon, RigidBody, Role, Shape, MAX_POLYGON_VERTICES};
use crate::config::{EnvParams, StaticParams};
use crate::error::{PhysicsError, Result};
use crate::events::Terminal;
use crate::joint::{Joint, Thruster};
use crate::layers::CollisionMatrix;
use crate::manifold::{num_circle_pairs, num_circle_polygon_pairs, num_polygon_pairs, CollisionManifold, PairIndices, PolygonManifold};
use crate::stepper::PhysicsEngine;
use crate::world::SceneState;
use kinetix_math::{zero_to_one, Vec2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Read;

/// Format version written by [`Level::to_json_value`]
pub const LEVEL_VERSION: &str = "1.0.0";

/// A scene together with the parameters it was built for
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub state: SceneState,
    pub env_params: EnvParams,
    pub static_params: StaticParams,
}

impl Level {
    pub fn new(state: SceneState, env_params: EnvParams, static_params: StaticParams) -> Self {
        Self {
            state,
            env_params,
            static_params,
        }
    }

    /// Empty bordered scene of a size preset with default env params
    pub fn empty(size: &str) -> Result<Self> {
        let static_params = StaticParams::by_size(size)?;
        let state = SceneState::new(&static_params)?;
        Ok(Self::new(state, EnvParams::default(), static_params))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json_value(value)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        let mut root = match normalize(value) {
            Value::Object(root) => root,
            _ => return Err(level_error("document root must be an object")),
        };

        if let Some(version) = root.get("version").and_then(Value::as_str) {
            if version != LEVEL_VERSION {
                log::debug!("Loading level written by format version {}", version);
            }
        }

        let static_params = read_static_params(take(&mut root, "static_env_params")?)?;
        let mut env_params = read_env_params(take(&mut root, "env_params")?)?;
        env_params.num_units = static_params.screen_dim[0] as f32 / zero_to_one(env_params.pixels_per_unit);

        let record: StateRecord = decode(take(&mut root, "env_state")?, "env_state")?;
        let mut state = record.into_state(&static_params)?;
        state.validate(&static_params)?;
        // Not persisted; the saved contacts determine it.
        state.terminal = state.contact_terminal(&PairIndices::new(&static_params));

        log::debug!(
            "Loaded level with {} active bodies",
            state.active_bodies().count()
        );
        Ok(Self::new(state, env_params, static_params))
    }

    /// Serialize to the level document
    ///
    /// With `compress`, parameter blocks that match a preset collapse to
    /// size markers.
    pub fn to_json_value(&self, compress: bool) -> Result<Value> {
        let (env_params, static_params) = if compress {
            let static_params = match self.static_params.size_key() {
                Some(size) => CompressedParams::size(size),
                None => CompressedParams::full(serde_json::to_value(&self.static_params)?),
            };
            (serde_json::to_value(CompressedParams::size("s"))?, serde_json::to_value(static_params)?)
        } else {
            (
                serde_json::to_value(&self.env_params)?,
                serde_json::to_value(&self.static_params)?,
            )
        };

        let mut root = Map::new();
        root.insert("env_state".into(), serde_json::to_value(StateRecord::from_state(&self.state))?);
        root.insert("env_params".into(), env_params);
        root.insert("static_env_params".into(), static_params);
        root.insert("version".into(), Value::String(LEVEL_VERSION.into()));
        Ok(Value::Object(root))
    }

    pub fn to_json_string(&self, compress: bool) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_value(compress)?)?)
    }

    /// Engine configured for this level's parameters
    pub fn engine(&self) -> Result<PhysicsEngine> {
        PhysicsEngine::new(self.static_params.clone(), self.env_params.clone())
    }
}

fn level_error(message: impl Into<String>) -> PhysicsError {
    PhysicsError::Level(message.into())
}

fn take(map: &mut Map<String, Value>, key: &str) -> Result<Value> {
    map.remove(key).ok_or_else(|| level_error(format!("missing `{}`", key)))
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| level_error(format!("invalid `{}`: {}", what, e)))
}

/// Rewrite index-keyed objects as arrays, recursively
///
/// An object qualifies when it is non-empty and its keys are exactly
/// `"0"..="n-1"`; elements are ordered numerically.
fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => {
            let indexed: Option<Vec<usize>> = map.keys().map(|k| k.parse::<usize>().ok()).collect();
            match indexed {
                Some(mut indices) if !indices.is_empty() => {
                    indices.sort_unstable();
                    if indices.iter().enumerate().all(|(i, &k)| i == k) {
                        let mut map = map;
                        let items = (0..indices.len())
                            .filter_map(|i| map.remove(&i.to_string()))
                            .map(normalize)
                            .collect();
                        return Value::Array(items);
                    }
                    Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
                }
                _ => Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect()),
            }
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CompressionKind {
    Size,
    Full,
}

/// `{type, size, params}` parameter block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompressedParams {
    #[serde(rename = "type")]
    kind: CompressionKind,
    size: Option<String>,
    params: Option<Value>,
}

impl CompressedParams {
    fn size(size: &str) -> Self {
        Self {
            kind: CompressionKind::Size,
            size: Some(size.to_string()),
            params: None,
        }
    }

    fn full(params: Value) -> Self {
        Self {
            kind: CompressionKind::Full,
            size: None,
            params: Some(params),
        }
    }
}

fn compressed(value: &Value) -> Result<Option<CompressedParams>> {
    if value.get("type").is_none() {
        return Ok(None);
    }
    decode(value.clone(), "compressed params").map(Some)
}

fn read_static_params(value: Value) -> Result<StaticParams> {
    let params: StaticParams = match compressed(&value)? {
        Some(CompressedParams {
            kind: CompressionKind::Size,
            size,
            ..
        }) => StaticParams::by_size(size.as_deref().unwrap_or_default())?,
        Some(CompressedParams {
            kind: CompressionKind::Full,
            params,
            ..
        }) => decode(params.ok_or_else(|| level_error("full static params without `params`"))?, "static_env_params")?,
        None => decode(value, "static_env_params")?,
    };
    params.validate()?;
    Ok(params)
}

fn read_env_params(value: Value) -> Result<EnvParams> {
    let params: EnvParams = match compressed(&value)? {
        Some(CompressedParams {
            kind: CompressionKind::Size,
            ..
        }) => EnvParams::default(),
        Some(CompressedParams {
            kind: CompressionKind::Full,
            params,
            ..
        }) => decode(params.ok_or_else(|| level_error("full env params without `params`"))?, "env_params")?,
        None => decode(value, "env_params")?,
    };
    params.validate()?;
    Ok(params)
}

/// Collision-matrix cell: a boolean, or 0/1 from older writers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum MatrixCell {
    Flag(bool),
    Number(f64),
}

impl MatrixCell {
    fn is_set(self) -> bool {
        match self {
            Self::Flag(flag) => flag,
            Self::Number(n) => n != 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BodyRecord {
    position: [f32; 2],
    rotation: f32,
    velocity: [f32; 2],
    angular_velocity: f32,
    inverse_mass: f32,
    inverse_inertia: f32,
    friction: f32,
    restitution: f32,
    collision_mode: u8,
    active: bool,
    n_vertices: usize,
    vertices: Vec<[f32; 2]>,
    radius: f32,
    density: f32,
    role: u8,
}

impl BodyRecord {
    fn from_body(body: &RigidBody) -> Self {
        let mut vertices = vec![[0.0; 2]; MAX_POLYGON_VERTICES];
        let (n_vertices, radius) = match &body.shape {
            Shape::Polygon(polygon) => {
                for (slot, vertex) in vertices.iter_mut().zip(polygon.vertices.iter()) {
                    *slot = vertex.to_array();
                }
                (polygon.n_vertices, 0.0)
            }
            Shape::Circle { radius } => (0, *radius),
        };
        Self {
            position: body.position.to_array(),
            rotation: body.rotation,
            velocity: body.velocity.to_array(),
            angular_velocity: body.angular_velocity,
            inverse_mass: body.inverse_mass,
            inverse_inertia: body.inverse_inertia,
            friction: body.friction,
            restitution: body.restitution,
            collision_mode: body.collision_mode.value(),
            active: body.active,
            n_vertices,
            vertices,
            radius,
            density: body.density,
            role: body.role.value(),
        }
    }

    fn into_body(self, is_polygon: bool, slot: usize) -> Result<RigidBody> {
        let shape = if is_polygon {
            if self.n_vertices > MAX_POLYGON_VERTICES || self.vertices.len() < self.n_vertices {
                return Err(level_error(format!("polygon {} has {} vertices", slot, self.n_vertices)));
            }
            if self.active && self.n_vertices < 3 {
                return Err(PhysicsError::InvalidVertexCount(self.n_vertices));
            }
            let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
            for (dst, src) in vertices.iter_mut().zip(&self.vertices) {
                *dst = Vec2::from_array(*src);
            }
            Shape::Polygon(Polygon {
                vertices,
                n_vertices: self.n_vertices,
            })
        } else {
            Shape::Circle { radius: self.radius }
        };

        let collision_mode = CollisionMode::from_value(self.collision_mode)
            .ok_or_else(|| level_error(format!("unknown collision mode {}", self.collision_mode)))?;
        let role = Role::from_value(self.role).ok_or_else(|| level_error(format!("unknown role {}", self.role)))?;

        Ok(RigidBody {
            position: Vec2::from_array(self.position),
            rotation: self.rotation,
            velocity: Vec2::from_array(self.velocity),
            angular_velocity: self.angular_velocity,
            inverse_mass: self.inverse_mass,
            inverse_inertia: self.inverse_inertia,
            friction: self.friction,
            restitution: self.restitution,
            collision_mode,
            active: self.active,
            density: self.density,
            role,
            shape,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifoldRecord {
    normal: [f32; 2],
    penetration: f32,
    collision_point: [f32; 2],
    active: bool,
    acc_impulse_normal: f32,
    acc_impulse_tangent: f32,
    restitution_velocity_target: f32,
}

impl From<&CollisionManifold> for ManifoldRecord {
    fn from(m: &CollisionManifold) -> Self {
        Self {
            normal: m.normal.to_array(),
            penetration: m.penetration,
            collision_point: m.collision_point.to_array(),
            active: m.active,
            acc_impulse_normal: m.acc_impulse_normal,
            acc_impulse_tangent: m.acc_impulse_tangent,
            restitution_velocity_target: m.restitution_velocity_target,
        }
    }
}

impl From<ManifoldRecord> for CollisionManifold {
    fn from(r: ManifoldRecord) -> Self {
        Self {
            normal: Vec2::from_array(r.normal),
            penetration: r.penetration,
            collision_point: Vec2::from_array(r.collision_point),
            active: r.active,
            acc_impulse_normal: r.acc_impulse_normal,
            acc_impulse_tangent: r.acc_impulse_tangent,
            restitution_velocity_target: r.restitution_velocity_target,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JointRecord {
    a_index: usize,
    b_index: usize,
    a_relative_pos: [f32; 2],
    b_relative_pos: [f32; 2],
    global_position: [f32; 2],
    active: bool,
    acc_impulse: [f32; 2],
    acc_r_impulse: f32,
    motor_speed: f32,
    motor_power: f32,
    motor_on: bool,
    motor_has_joint_limits: bool,
    min_rotation: f32,
    max_rotation: f32,
    is_fixed_joint: bool,
    rotation: f32,
    motor_binding: usize,
}

impl From<&Joint> for JointRecord {
    fn from(j: &Joint) -> Self {
        Self {
            a_index: j.a_index,
            b_index: j.b_index,
            a_relative_pos: j.a_relative_pos.to_array(),
            b_relative_pos: j.b_relative_pos.to_array(),
            global_position: j.global_position.to_array(),
            active: j.active,
            acc_impulse: j.acc_impulse.to_array(),
            acc_r_impulse: j.acc_r_impulse,
            motor_speed: j.motor_speed,
            motor_power: j.motor_power,
            motor_on: j.motor_on,
            motor_has_joint_limits: j.motor_has_joint_limits,
            min_rotation: j.min_rotation,
            max_rotation: j.max_rotation,
            is_fixed_joint: j.is_fixed_joint,
            rotation: j.rotation,
            motor_binding: j.motor_binding,
        }
    }
}

impl From<JointRecord> for Joint {
    fn from(r: JointRecord) -> Self {
        Self {
            a_index: r.a_index,
            b_index: r.b_index,
            a_relative_pos: Vec2::from_array(r.a_relative_pos),
            b_relative_pos: Vec2::from_array(r.b_relative_pos),
            global_position: Vec2::from_array(r.global_position),
            active: r.active,
            acc_impulse: Vec2::from_array(r.acc_impulse),
            acc_r_impulse: r.acc_r_impulse,
            motor_speed: r.motor_speed,
            motor_power: r.motor_power,
            motor_on: r.motor_on,
            motor_has_joint_limits: r.motor_has_joint_limits,
            min_rotation: r.min_rotation,
            max_rotation: r.max_rotation,
            is_fixed_joint: r.is_fixed_joint,
            rotation: r.rotation,
            motor_binding: r.motor_binding,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThrusterRecord {
    object_index: usize,
    relative_position: [f32; 2],
    rotation: f32,
    power: f32,
    global_position: [f32; 2],
    active: bool,
    thruster_binding: usize,
}

impl From<&Thruster> for ThrusterRecord {
    fn from(t: &Thruster) -> Self {
        Self {
            object_index: t.object_index,
            relative_position: t.relative_position.to_array(),
            rotation: t.rotation,
            power: t.power,
            global_position: t.global_position.to_array(),
            active: t.active,
            thruster_binding: t.thruster_binding,
        }
    }
}

impl From<ThrusterRecord> for Thruster {
    fn from(r: ThrusterRecord) -> Self {
        Self {
            object_index: r.object_index,
            relative_position: Vec2::from_array(r.relative_position),
            rotation: r.rotation,
            power: r.power,
            global_position: Vec2::from_array(r.global_position),
            active: r.active,
            thruster_binding: r.thruster_binding,
        }
    }
}

/// The `env_state` block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateRecord {
    polygon: Vec<BodyRecord>,
    circle: Vec<BodyRecord>,
    joint: Vec<JointRecord>,
    thruster: Vec<ThrusterRecord>,
    collision_matrix: Vec<Vec<MatrixCell>>,
    /// Flattened `(cm1, cm2)` pairs
    acc_rr_manifolds: Vec<ManifoldRecord>,
    acc_cr_manifolds: Vec<ManifoldRecord>,
    acc_cc_manifolds: Vec<ManifoldRecord>,
    gravity: [f32; 2],
}

fn expect_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(level_error(format!("`{}` has {} entries, expected {}", what, actual, expected)));
    }
    Ok(())
}

impl StateRecord {
    fn from_state(state: &SceneState) -> Self {
        Self {
            polygon: state.polygons.iter().map(BodyRecord::from_body).collect(),
            circle: state.circles.iter().map(BodyRecord::from_body).collect(),
            joint: state.joints.iter().map(JointRecord::from).collect(),
            thruster: state.thrusters.iter().map(ThrusterRecord::from).collect(),
            collision_matrix: state
                .collision_matrix
                .rows()
                .into_iter()
                .map(|row| row.into_iter().map(MatrixCell::Flag).collect())
                .collect(),
            acc_rr_manifolds: state
                .rr_manifolds
                .iter()
                .flat_map(|m| [ManifoldRecord::from(&m.cm1), ManifoldRecord::from(&m.cm2)])
                .collect(),
            acc_cr_manifolds: state.cr_manifolds.iter().map(ManifoldRecord::from).collect(),
            acc_cc_manifolds: state.cc_manifolds.iter().map(ManifoldRecord::from).collect(),
            gravity: state.gravity.to_array(),
        }
    }

    fn into_state(self, params: &StaticParams) -> Result<SceneState> {
        let np = params.num_polygons;
        let nc = params.num_circles;
        expect_len("polygon", self.polygon.len(), np)?;
        expect_len("circle", self.circle.len(), nc)?;
        expect_len("joint", self.joint.len(), params.num_joints)?;
        expect_len("thruster", self.thruster.len(), params.num_thrusters)?;
        expect_len(
            "acc_rr_manifolds",
            self.acc_rr_manifolds.len(),
            2 * num_polygon_pairs(np, params.num_static_fixated_polys),
        )?;
        expect_len("acc_cr_manifolds", self.acc_cr_manifolds.len(), num_circle_polygon_pairs(nc, np))?;
        expect_len("acc_cc_manifolds", self.acc_cc_manifolds.len(), num_circle_pairs(nc))?;
        expect_len("collision_matrix", self.collision_matrix.len(), np + nc)?;

        let rows = self
            .collision_matrix
            .into_iter()
            .map(|row| row.into_iter().map(MatrixCell::is_set).collect())
            .collect();
        let collision_matrix =
            CollisionMatrix::from_rows(rows).ok_or_else(|| level_error("`collision_matrix` is not square"))?;

        let polygons = self
            .polygon
            .into_iter()
            .enumerate()
            .map(|(slot, r)| r.into_body(true, slot))
            .collect::<Result<Vec<_>>>()?;
        let circles = self
            .circle
            .into_iter()
            .enumerate()
            .map(|(slot, r)| r.into_body(false, slot))
            .collect::<Result<Vec<_>>>()?;

        let mut flat = self.acc_rr_manifolds.into_iter().map(CollisionManifold::from);
        let mut rr_manifolds = Vec::with_capacity(flat.len() / 2);
        while let (Some(cm1), Some(cm2)) = (flat.next(), flat.next()) {
            rr_manifolds.push(PolygonManifold { cm1, cm2 });
        }

        Ok(SceneState {
            polygons,
            circles,
            joints: self.joint.into_iter().map(Joint::from).collect(),
            thrusters: self.thruster.into_iter().map(Thruster::from).collect(),
            collision_matrix,
            rr_manifolds,
            cr_manifolds: self.acc_cr_manifolds.into_iter().map(CollisionManifold::from).collect(),
            cc_manifolds: self.acc_cc_manifolds.into_iter().map(CollisionManifold::from).collect(),
            gravity: Vec2::from_array(self.gravity),
            terminal: Terminal::Ongoing,
        })
    }
}
