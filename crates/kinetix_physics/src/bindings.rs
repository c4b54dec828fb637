//! Map controller bindings onto per-joint and per-thruster actions
//!
//! A controller exposes `num_motor_bindings` motor axes followed by
//! `num_thruster_bindings` thruster triggers. Each joint and thruster names
//! the binding it listens to, so several entities can share one input.

use crate::config::StaticParams;
use crate::error::{PhysicsError, Result};
use crate::world::SceneState;

/// Expand a binding vector into the action vector `step` expects
pub fn bind_actions(state: &SceneState, params: &StaticParams, binding_actions: &[f32]) -> Result<Vec<f32>> {
    let expected = params.num_motor_bindings + params.num_thruster_bindings;
    if binding_actions.len() != expected {
        return Err(PhysicsError::BindingActionLength {
            expected,
            actual: binding_actions.len(),
        });
    }

    let lookup = |index: usize| {
        binding_actions
            .get(index)
            .copied()
            .ok_or(PhysicsError::BodyIndexOutOfRange { index, len: expected })
    };

    let mut actions = Vec::with_capacity(state.joints.len() + state.thrusters.len());
    for joint in &state.joints {
        if joint.motor_binding >= params.num_motor_bindings {
            return Err(PhysicsError::BodyIndexOutOfRange {
                index: joint.motor_binding,
                len: params.num_motor_bindings,
            });
        }
        actions.push(lookup(joint.motor_binding)?);
    }
    for thruster in &state.thrusters {
        if thruster.thruster_binding >= params.num_thruster_bindings {
            return Err(PhysicsError::BodyIndexOutOfRange {
                index: thruster.thruster_binding,
                len: params.num_thruster_bindings,
            });
        }
        actions.push(lookup(params.num_motor_bindings + thruster.thruster_binding)?);
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{Joint, Thruster};

    #[test]
    fn test_bindings_fan_out() {
        let params = StaticParams::medium();
        let mut state = SceneState::blank(&params);
        state.joints[0] = Joint::default().with_binding(2);
        state.joints[1] = Joint::default().with_binding(2);
        state.thrusters[1] = Thruster::default().with_binding(1);

        let actions = bind_actions(&state, &params, &[0.0, 1.0, -1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(actions, vec![-1.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binding_length_checked() {
        let params = StaticParams::small();
        let state = SceneState::blank(&params);
        assert!(matches!(
            bind_actions(&state, &params, &[0.0; 3]),
            Err(PhysicsError::BindingActionLength { expected: 6, actual: 3 })
        ));
    }

    #[test]
    fn test_binding_out_of_range() {
        let params = StaticParams::small();
        let mut state = SceneState::blank(&params);
        state.thrusters[0].thruster_binding = 5;
        assert!(bind_actions(&state, &params, &[0.0; 6]).is_err());
    }
}
