//! The fixed-timestep pipeline
//!
//! One step runs, in order:
//!
//! 1. gravity on every active dynamic body
//! 2. manifold generation for every enumerated pair
//! 3. motors and thrusters, once
//! 4. warm start of contacts (polygon, circle-polygon, circle) and joints
//! 5. `num_solver_iterations` passes of joints, then batched contacts
//! 6. integration and velocity clipping
//! 7. joint and thruster world positions
//! 8. contact events and the terminal outcome

use crate::batch::{map_batch, BatchPlan};
use crate::bindings::bind_actions;
use crate::body::{BodyRef, VelocityDelta};
use crate::collision::{circle_circle, circle_polygon, polygon_polygon, resolve_collision, warm_start_impulse};
use crate::config::{EnvParams, StaticParams};
use crate::error::{PhysicsError, Result};
use crate::events::{ContactData, ContactEvent, ContactEventType, Discard, EventCollector, PhysicsEventHandler, Terminal};
use crate::joint::{joint_warm_start, motor_impulse, resolve_joint, thruster_impulse};
use crate::manifold::{CollisionManifold, PairIndices, PairKind};
use crate::world::SceneState;
use kinetix_math::{clamp, Vec2};

/// Which manifold array, and which contact of a polygon pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContactSlot {
    PolygonPrimary,
    PolygonSecondary,
    CirclePolygon,
    CircleCircle,
}

impl ContactSlot {
    fn manifold(self, state: &SceneState, slot: usize) -> Option<&CollisionManifold> {
        match self {
            Self::PolygonPrimary => state.rr_manifolds.get(slot).map(|m| &m.cm1),
            Self::PolygonSecondary => state.rr_manifolds.get(slot).map(|m| &m.cm2),
            Self::CirclePolygon => state.cr_manifolds.get(slot),
            Self::CircleCircle => state.cc_manifolds.get(slot),
        }
    }

    fn manifold_mut(self, state: &mut SceneState, slot: usize) -> Option<&mut CollisionManifold> {
        match self {
            Self::PolygonPrimary => state.rr_manifolds.get_mut(slot).map(|m| &mut m.cm1),
            Self::PolygonSecondary => state.rr_manifolds.get_mut(slot).map(|m| &mut m.cm2),
            Self::CirclePolygon => state.cr_manifolds.get_mut(slot),
            Self::CircleCircle => state.cc_manifolds.get_mut(slot),
        }
    }

    fn bodies(self, (i, j): (usize, usize)) -> (BodyRef, BodyRef) {
        match self {
            Self::PolygonPrimary | Self::PolygonSecondary => (BodyRef::Polygon(i), BodyRef::Polygon(j)),
            Self::CirclePolygon => (BodyRef::Circle(i), BodyRef::Polygon(j)),
            Self::CircleCircle => (BodyRef::Circle(i), BodyRef::Circle(j)),
        }
    }
}

/// Active flags of every manifold slot, captured before generation
struct ContactSnapshot {
    polygon_polygon: Vec<bool>,
    circle_polygon: Vec<bool>,
    circle_circle: Vec<bool>,
}

impl ContactSnapshot {
    fn capture(state: &SceneState) -> Self {
        Self {
            polygon_polygon: state.rr_manifolds.iter().map(|m| m.is_active()).collect(),
            circle_polygon: state.cr_manifolds.iter().map(|m| m.active).collect(),
            circle_circle: state.cc_manifolds.iter().map(|m| m.active).collect(),
        }
    }
}

fn apply_delta(state: &mut SceneState, a: BodyRef, b: BodyRef, delta: &VelocityDelta) {
    if let Some(body) = state.body_by_ref_mut(a) {
        body.apply_velocity_delta(delta.a_dv, delta.a_drv);
    }
    if let Some(body) = state.body_by_ref_mut(b) {
        body.apply_velocity_delta(delta.b_dv, delta.b_drv);
    }
}

/// Steps scenes of one capacity layout
///
/// The pair enumeration is derived from the static params once; a scene
/// grown with [`SceneState::grow`] needs a new engine.
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    static_params: StaticParams,
    env_params: EnvParams,
    pairs: PairIndices,
}

impl PhysicsEngine {
    pub fn new(static_params: StaticParams, env_params: EnvParams) -> Result<Self> {
        static_params.validate()?;
        env_params.validate()?;
        let pairs = PairIndices::new(&static_params);
        log::debug!(
            "Engine ready: {} polygon, {} circle-polygon, {} circle pairs",
            pairs.polygon_polygon.len(),
            pairs.circle_polygon.len(),
            pairs.circle_circle.len()
        );
        Ok(Self {
            static_params,
            env_params,
            pairs,
        })
    }

    pub fn static_params(&self) -> &StaticParams {
        &self.static_params
    }

    pub fn env_params(&self) -> &EnvParams {
        &self.env_params
    }

    /// Advance `state` by one timestep
    ///
    /// `actions` holds one motor direction per joint slot followed by one
    /// thrust level per thruster slot.
    pub fn step(&self, state: &mut SceneState, actions: &[f32]) -> Result<Terminal> {
        self.step_with_handler(state, actions, &mut Discard)
    }

    /// Advance one timestep and record contact events
    pub fn step_with_events(&self, state: &mut SceneState, actions: &[f32], events: &mut EventCollector) -> Result<Terminal> {
        self.step_with_handler(state, actions, events)
    }

    /// Map controller bindings to actions, then run `frame_skip` steps
    ///
    /// Stops early as soon as a step ends the episode.
    pub fn step_bound(&self, state: &mut SceneState, binding_actions: &[f32]) -> Result<Terminal> {
        let actions = bind_actions(state, &self.static_params, binding_actions)?;
        let mut terminal = Terminal::Ongoing;
        for _ in 0..self.static_params.frame_skip.max(1) {
            terminal = self.step(state, &actions)?;
            if terminal.is_done() {
                break;
            }
        }
        Ok(terminal)
    }

    pub fn step_with_handler<H: PhysicsEventHandler>(&self, state: &mut SceneState, actions: &[f32], handler: &mut H) -> Result<Terminal> {
        let expected = self.static_params.action_len();
        if actions.len() != expected {
            log::warn!("Rejected action vector of length {} (expected {})", actions.len(), expected);
            return Err(PhysicsError::ActionLength {
                expected,
                actual: actions.len(),
            });
        }
        state.validate(&self.static_params)?;
        let (joint_actions, thruster_actions) = actions.split_at(self.static_params.num_joints);

        let before = ContactSnapshot::capture(state);

        self.apply_gravity(state);
        self.generate_manifolds(state);
        self.apply_motors(state, joint_actions);
        self.apply_thrusters(state, thruster_actions);

        if self.static_params.do_warm_starting {
            self.warm_start(state);
        }

        let batch_size = self.static_params.solver_batch_size;
        let plans = [
            (
                ContactSlot::PolygonPrimary,
                BatchPlan::new(&active_flags(&state.rr_manifolds, |m| m.is_active()), batch_size),
            ),
            (
                ContactSlot::CirclePolygon,
                BatchPlan::new(&active_flags(&state.cr_manifolds, |m| m.active), batch_size),
            ),
            (
                ContactSlot::CircleCircle,
                BatchPlan::new(&active_flags(&state.cc_manifolds, |m| m.active), batch_size),
            ),
        ];
        for _ in 0..self.static_params.num_solver_iterations {
            self.solve_joints(state);
            for (kind, plan) in &plans {
                self.solve_contacts(state, *kind, plan);
                if *kind == ContactSlot::PolygonPrimary {
                    // Second contacts reuse the pair layout of the first.
                    self.solve_contacts(state, ContactSlot::PolygonSecondary, plan);
                }
            }
        }

        self.integrate(state);
        state.recalculate_global_positions();

        let terminal = self.report(state, &before, handler);
        if terminal != state.terminal {
            log::debug!("Terminal changed {:?} -> {:?}", state.terminal, terminal);
        }
        state.terminal = terminal;
        handler.on_terminal(terminal);
        Ok(terminal)
    }

    fn pairs_for(&self, kind: ContactSlot) -> &[(usize, usize)] {
        match kind {
            ContactSlot::PolygonPrimary | ContactSlot::PolygonSecondary => &self.pairs.polygon_polygon,
            ContactSlot::CirclePolygon => &self.pairs.circle_polygon,
            ContactSlot::CircleCircle => &self.pairs.circle_circle,
        }
    }

    fn apply_gravity(&self, state: &mut SceneState) {
        let dv = state.gravity * self.env_params.dt;
        for body in state.polygons.iter_mut().chain(state.circles.iter_mut()) {
            if body.active && !body.is_static() {
                body.velocity += dv;
            }
        }
    }

    /// Regenerate every manifold slot; pairs with an inactive body are reset
    fn generate_manifolds(&self, state: &mut SceneState) {
        for (slot, &(i, j)) in self.pairs.circle_circle.iter().enumerate() {
            let (a, b) = (&state.circles[i], &state.circles[j]);
            let mut manifold = state.cc_manifolds[slot];
            if a.active && b.active {
                manifold = circle_circle(a, b, &manifold);
            } else {
                manifold.reset();
            }
            state.cc_manifolds[slot] = manifold;
        }

        for (slot, &(i, j)) in self.pairs.polygon_polygon.iter().enumerate() {
            let (a, b) = (&state.polygons[i], &state.polygons[j]);
            let mut manifold = state.rr_manifolds[slot];
            if a.active && b.active {
                manifold = polygon_polygon(a, b, &manifold);
            } else {
                manifold.reset();
            }
            state.rr_manifolds[slot] = manifold;
        }

        for (slot, &(i, j)) in self.pairs.circle_polygon.iter().enumerate() {
            let (circle, polygon) = (&state.circles[i], &state.polygons[j]);
            let mut manifold = state.cr_manifolds[slot];
            if circle.active && polygon.active {
                manifold = circle_polygon(circle, polygon, &manifold);
            } else {
                manifold.reset();
            }
            state.cr_manifolds[slot] = manifold;
        }
    }

    /// Motor torques are all computed from the same pre-motor state
    fn apply_motors(&self, state: &mut SceneState, actions: &[f32]) {
        let deltas: Vec<(usize, usize, VelocityDelta)> = state
            .joints
            .iter()
            .zip(actions)
            .filter(|(joint, _)| joint.active)
            .filter_map(|(joint, &action)| {
                let a = state.body(joint.a_index)?;
                let b = state.body(joint.b_index)?;
                motor_impulse(a, b, joint, action, &self.env_params).map(|d| (joint.a_index, joint.b_index, d))
            })
            .collect();
        for (a, b, delta) in deltas {
            let (ra, rb) = (state.body_ref(a), state.body_ref(b));
            apply_delta(state, ra, rb, &delta);
        }
    }

    fn apply_thrusters(&self, state: &mut SceneState, actions: &[f32]) {
        let responses: Vec<_> = state
            .thrusters
            .iter()
            .enumerate()
            .zip(actions)
            .filter(|((_, thruster), _)| thruster.active)
            .filter_map(|((slot, thruster), &action)| {
                let owner = state.body(thruster.object_index)?;
                Some((slot, action, thruster_impulse(owner, thruster, action, &self.env_params)))
            })
            .collect();
        for (slot, action, response) in responses {
            let thruster = &mut state.thrusters[slot];
            thruster.global_position = response.global_position;
            if action == 0.0 {
                continue;
            }
            let owner = thruster.object_index;
            if let Some(body) = state.body_mut(owner).filter(|b| b.active) {
                body.apply_velocity_delta(response.dv, response.drv);
            }
        }
    }

    fn warm_start(&self, state: &mut SceneState) {
        let kinds: [&[ContactSlot]; 3] = [
            &[ContactSlot::PolygonPrimary, ContactSlot::PolygonSecondary],
            &[ContactSlot::CirclePolygon],
            &[ContactSlot::CircleCircle],
        ];
        let n_polygons = state.polygons.len();
        for slots in kinds {
            let pairs = self.pairs_for(slots[0]);
            let mut deltas = Vec::new();
            for (slot, &pair) in pairs.iter().enumerate() {
                for &kind in slots {
                    let Some(manifold) = kind.manifold(state, slot) else { continue };
                    let (ra, rb) = kind.bodies(pair);
                    let (Some(a), Some(b)) = (state.body_by_ref(ra), state.body_by_ref(rb)) else { continue };
                    let does_collide = state.collision_matrix.can_collide(ra.unified(n_polygons), rb.unified(n_polygons));
                    if let Some(delta) = warm_start_impulse(a, b, manifold, does_collide) {
                        deltas.push((ra, rb, delta));
                    }
                }
            }
            for (ra, rb, delta) in deltas {
                apply_delta(state, ra, rb, &delta);
            }
        }

        for slot in 0..state.joints.len() {
            let joint = &state.joints[slot];
            if !joint.active {
                continue;
            }
            let (Some(a), Some(b)) = (state.body(joint.a_index), state.body(joint.b_index)) else { continue };
            if let Some(delta) = joint_warm_start(a, b, joint) {
                let (ra, rb) = (state.body_ref(joint.a_index), state.body_ref(joint.b_index));
                apply_delta(state, ra, rb, &delta);
            }
        }
    }

    /// Joints are solved one after another, each seeing the previous one's result
    fn solve_joints(&self, state: &mut SceneState) {
        for slot in 0..state.joints.len() {
            let joint = &state.joints[slot];
            if !joint.active {
                continue;
            }
            let (ra, rb) = (state.body_ref(joint.a_index), state.body_ref(joint.b_index));
            let (Some(a), Some(b)) = (state.body_by_ref(ra), state.body_by_ref(rb)) else { continue };

            let Some(response) = resolve_joint(a, b, joint, &self.env_params) else {
                let joint = &mut state.joints[slot];
                joint.acc_impulse = Vec2::ZERO;
                joint.acc_r_impulse = 0.0;
                continue;
            };

            let joint = &mut state.joints[slot];
            joint.acc_impulse = response.acc_impulse;
            joint.acc_r_impulse = response.acc_r_impulse;
            joint.global_position = response.joint_point;

            apply_delta(state, ra, rb, &response.delta);
            if let Some(body) = state.body_by_ref_mut(ra) {
                body.position += response.a_dp;
            }
            if let Some(body) = state.body_by_ref_mut(rb) {
                body.position += response.b_dp;
            }
        }
    }

    /// Resolve one manifold array batch by batch
    fn solve_contacts(&self, state: &mut SceneState, kind: ContactSlot, plan: &BatchPlan) {
        let pairs = self.pairs_for(kind);
        let n_polygons = state.polygons.len();
        for members in plan.batches() {
            let snapshot: &SceneState = state;
            let responses = map_batch(members, |slot| {
                let manifold = kind.manifold(snapshot, slot)?;
                if !manifold.active {
                    return None;
                }
                let (ra, rb) = kind.bodies(*pairs.get(slot)?);
                let a = snapshot.body_by_ref(ra)?;
                let b = snapshot.body_by_ref(rb)?;
                let does_collide = snapshot
                    .collision_matrix
                    .can_collide(ra.unified(n_polygons), rb.unified(n_polygons));
                Some((ra, rb, resolve_collision(a, b, manifold, does_collide, &self.env_params)))
            });

            for (&slot, response) in members.iter().zip(responses) {
                let Some((ra, rb, response)) = response else { continue };
                if let Some(manifold) = kind.manifold_mut(state, slot) {
                    manifold.acc_impulse_normal = response.acc_impulse_normal;
                    manifold.acc_impulse_tangent = response.acc_impulse_tangent;
                }
                if response.is_colliding {
                    apply_delta(state, ra, rb, &response.delta);
                }
            }
        }
    }

    fn integrate(&self, state: &mut SceneState) {
        let params = &self.env_params;
        for body in state.polygons.iter_mut().chain(state.circles.iter_mut()) {
            if !body.active {
                continue;
            }
            if !body.is_static() {
                body.position += body.velocity * params.dt;
                body.rotation += body.angular_velocity * params.dt;
            }
            body.velocity = body.velocity.clamp_symmetric(params.clip_velocity);
            body.angular_velocity = clamp(body.angular_velocity, -params.clip_angular_velocity, params.clip_angular_velocity);
        }
    }

    /// Emit contact events and derive the terminal outcome
    fn report<H: PhysicsEventHandler>(&self, state: &SceneState, before: &ContactSnapshot, handler: &mut H) -> Terminal {
        let mut touching = 0;

        let mut visit = |kind: PairKind, slot_kind: ContactSlot, pair: (usize, usize), was_active: bool, contacts: Vec<ContactData>| {
            let (ra, rb) = slot_kind.bodies(pair);
            let now_active = !contacts.is_empty();
            let event_type = match (was_active, now_active) {
                (false, true) => ContactEventType::Started,
                (true, true) => ContactEventType::Persisted,
                (true, false) => ContactEventType::Stopped,
                (false, false) => return,
            };
            if now_active {
                touching += 1;
            }
            handler.on_contact(&ContactEvent {
                body1: ra,
                body2: rb,
                kind,
                event_type,
                contacts,
            });
        };

        for (slot, (&pair, manifold)) in self.pairs.polygon_polygon.iter().zip(&state.rr_manifolds).enumerate() {
            let contacts = manifold.contacts().into_iter().filter(|m| m.active).map(ContactData::from).collect();
            let was = before.polygon_polygon.get(slot).copied().unwrap_or(false);
            visit(PairKind::PolygonPolygon, ContactSlot::PolygonPrimary, pair, was, contacts);
        }
        for (slot, (&pair, manifold)) in self.pairs.circle_polygon.iter().zip(&state.cr_manifolds).enumerate() {
            let contacts = active_contact(manifold);
            let was = before.circle_polygon.get(slot).copied().unwrap_or(false);
            visit(PairKind::CirclePolygon, ContactSlot::CirclePolygon, pair, was, contacts);
        }
        for (slot, (&pair, manifold)) in self.pairs.circle_circle.iter().zip(&state.cc_manifolds).enumerate() {
            let contacts = active_contact(manifold);
            let was = before.circle_circle.get(slot).copied().unwrap_or(false);
            visit(PairKind::CircleCircle, ContactSlot::CircleCircle, pair, was, contacts);
        }

        log::trace!("Step finished with {} touching pairs", touching);
        state.contact_terminal(&self.pairs)
    }
}

fn active_contact(manifold: &CollisionManifold) -> Vec<ContactData> {
    if manifold.active {
        vec![ContactData::from(manifold)]
    } else {
        Vec::new()
    }
}

fn active_flags<T>(manifolds: &[T], active: impl Fn(&T) -> bool) -> Vec<bool> {
    manifolds.iter().map(active).collect()
}

/// Advance a scene by one timestep
///
/// Convenience form of [`PhysicsEngine::step`] that takes the scene by
/// value and returns the stepped scene.
pub fn step(mut state: SceneState, static_params: &StaticParams, env_params: &EnvParams, actions: &[f32]) -> Result<SceneState> {
    let engine = PhysicsEngine::new(static_params.clone(), env_params.clone())?;
    engine.step(&mut state, actions)?;
    Ok(state)
}
