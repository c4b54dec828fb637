//! Invariant tests for kinetix_physics
//!
//! Properties the solver must keep for every scene it steps

use approx::assert_relative_eq;
use kinetix_physics::collision::{circle_circle, relative_normal_velocity, resolve_collision};
use kinetix_physics::prelude::*;

fn engine(params: &StaticParams) -> PhysicsEngine {
    PhysicsEngine::new(params.clone(), EnvParams::default()).unwrap()
}

fn idle(params: &StaticParams) -> Vec<f32> {
    vec![0.0; params.action_len()]
}

/// INVARIANT: Overlapping circles report depth and a unit normal from A to B
#[test]
fn invariant_circle_overlap_geometry() {
    let a = RigidBody::circle(Vec2::ZERO, 1.0);
    let mut b = RigidBody::circle(Vec2::new(1.5, 0.0), 1.0);
    b.inverse_mass = 0.0;
    b.inverse_inertia = 0.0;

    let manifold = circle_circle(&a, &b, &CollisionManifold::default());
    assert!(manifold.active);
    assert_relative_eq!(manifold.penetration, 0.5, epsilon = 1e-6);
    assert_relative_eq!(manifold.normal.x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(manifold.normal.y, 0.0, epsilon = 1e-6);
}

/// INVARIANT: A perfectly elastic head-on hit reverses the approach speed
#[test]
fn invariant_elastic_head_on_reverses_velocity() {
    let speed = 3.0;
    let a = RigidBody::circle(Vec2::ZERO, 1.0)
        .with_restitution(1.0)
        .with_velocity(Vec2::new(speed / 2.0, 0.0));
    let b = RigidBody::circle(Vec2::new(1.995, 0.0), 1.0)
        .with_restitution(1.0)
        .with_velocity(Vec2::new(-speed / 2.0, 0.0));

    let manifold = circle_circle(&a, &b, &CollisionManifold::default());
    let before = relative_normal_velocity(&a, &b, manifold.collision_point, manifold.normal);
    assert_relative_eq!(before, -speed, epsilon = 1e-5);

    let response = resolve_collision(&a, &b, &manifold, true, &EnvParams::default());
    let mut a = a;
    let mut b = b;
    a.apply_velocity_delta(response.delta.a_dv, response.delta.a_drv);
    b.apply_velocity_delta(response.delta.b_dv, response.delta.b_drv);

    let after = relative_normal_velocity(&a, &b, manifold.collision_point, manifold.normal);
    assert_relative_eq!(after, speed, epsilon = 1e-4);
}

/// INVARIANT: Accumulated impulses never survive a gap in contact
#[test]
fn invariant_warm_start_resets_across_gap() {
    let a = RigidBody::circle(Vec2::ZERO, 1.0);
    let touching = RigidBody::circle(Vec2::new(1.5, 0.0), 1.0);
    let apart = RigidBody::circle(Vec2::new(3.0, 0.0), 1.0);

    let mut manifold = CollisionManifold::default();
    for _ in 0..3 {
        manifold = circle_circle(&a, &touching, &manifold);
        // Stand-in for the solver accumulating impulse.
        manifold.acc_impulse_normal += 1.0;
        manifold.acc_impulse_tangent += 0.5;
    }
    assert_relative_eq!(manifold.acc_impulse_normal, 3.0);

    manifold = circle_circle(&a, &apart, &manifold);
    assert!(!manifold.active);
    assert_eq!(manifold.acc_impulse_normal, 0.0);
    assert_eq!(manifold.acc_impulse_tangent, 0.0);

    manifold = circle_circle(&a, &touching, &manifold);
    assert!(manifold.active);
    assert_eq!(manifold.acc_impulse_normal, 0.0);
    assert_eq!(manifold.acc_impulse_tangent, 0.0);
}

/// INVARIANT: Lifting a resting ball clears its floor contact slot
#[test]
fn invariant_stepper_clears_lifted_contact() {
    let params = StaticParams::small();
    let engine = engine(&params);
    let mut scene = SceneState::new(&params).unwrap();
    scene.add_circle(RigidBody::circle(Vec2::new(2.5, 0.62), 0.25)).unwrap();

    for _ in 0..3 {
        engine.step(&mut scene, &idle(&params)).unwrap();
    }
    // Circle 0 against polygon 0 (the floor) is the first circle-polygon slot.
    assert!(scene.cr_manifolds[0].active);
    assert!(scene.cr_manifolds[0].acc_impulse_normal > 0.0);

    scene.circles[0].position = Vec2::new(2.5, 3.0);
    scene.circles[0].velocity = Vec2::ZERO;
    engine.step(&mut scene, &idle(&params)).unwrap();
    assert!(!scene.cr_manifolds[0].active);
    assert_eq!(scene.cr_manifolds[0].acc_impulse_normal, 0.0);
    assert_eq!(scene.cr_manifolds[0].acc_impulse_tangent, 0.0);
}

/// INVARIANT: Exclusion propagates along joint chains
#[test]
fn invariant_joint_chain_exclusion() {
    let params = StaticParams::medium();
    let mut scene = SceneState::new(&params).unwrap();
    let a = scene.add_polygon(RigidBody::rectangle(Vec2::new(1.0, 2.0), 0.5, 0.5)).unwrap();
    let b = scene.add_polygon(RigidBody::rectangle(Vec2::new(2.0, 2.0), 0.5, 0.5)).unwrap();
    let circle = scene.add_circle(RigidBody::circle(Vec2::new(3.0, 2.0), 0.25)).unwrap();
    let c = scene.unified_index(BodyRef::Circle(circle));

    scene.add_joint(Joint::revolute(a, b, Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0))).unwrap();
    scene.add_joint(Joint::revolute(b, c, Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0))).unwrap();

    let matrix = &scene.collision_matrix;
    assert!(!matrix.can_collide(a, b));
    assert!(!matrix.can_collide(b, c));
    assert!(!matrix.can_collide(a, c));
    assert!(!matrix.can_collide(c, a));
    // Unjoined bodies are unaffected.
    assert!(matrix.can_collide(0, a));
}

/// INVARIANT: A body pinned to a fixed anchor holds its anchor under gravity
#[test]
fn invariant_pinned_body_holds_anchor() {
    let params = StaticParams::small();
    let engine = engine(&params);
    let mut scene = SceneState::new(&params).unwrap();

    // Box hanging from the underside of the ceiling (slot 3, centre y = 10.2).
    let slot = scene.add_polygon(RigidBody::rectangle(Vec2::new(2.5, 3.5), 0.4, 1.0)).unwrap();
    let a_rel = Vec2::new(0.0, -6.2);
    let b_rel = Vec2::new(0.0, 0.5);
    scene.add_joint(Joint::revolute(3, slot, a_rel, b_rel)).unwrap();

    for _ in 0..300 {
        engine.step(&mut scene, &idle(&params)).unwrap();
    }

    let anchor_a = scene.polygons[3].world_point(a_rel);
    let anchor_b = scene.polygons[slot].world_point(b_rel);
    let drift = (anchor_a - anchor_b).length();
    assert!(drift < 0.05, "anchor drifted by {}", drift);
}

/// INVARIANT: Failure wins when a ball touches a goal and a hazard at once
#[test]
fn invariant_failure_takes_precedence() {
    let params = StaticParams::small();
    let engine = engine(&params);
    let mut scene = SceneState::new(&params).unwrap();
    scene.polygons[0].role = Role::Goal;

    let square = [
        Vec2::new(0.1, 0.1),
        Vec2::new(0.1, -0.1),
        Vec2::new(-0.1, -0.1),
        Vec2::new(-0.1, 0.1),
    ];
    let hazard = RigidBody::static_polygon(Vec2::new(2.8, 0.6), &square)
        .unwrap()
        .with_role(Role::Hazard);
    scene.add_polygon(hazard).unwrap();
    scene
        .add_circle(RigidBody::circle(Vec2::new(2.5, 0.6), 0.25).with_role(Role::Ball))
        .unwrap();

    let mut events = EventCollector::new();
    let terminal = engine.step_with_events(&mut scene, &idle(&params), &mut events).unwrap();
    assert_eq!(terminal, Terminal::Failure);
    assert_eq!(terminal.value(), -1);
    assert_eq!(events.touching().filter(|e| e.kind == PairKind::CirclePolygon).count(), 2);
}

/// INVARIANT: Inactive bodies are never moved by a step
#[test]
fn invariant_inactive_bodies_untouched() {
    let params = StaticParams::small();
    let engine = engine(&params);
    let mut scene = SceneState::new(&params).unwrap();
    scene.add_circle(RigidBody::circle(Vec2::new(2.5, 3.0), 0.25)).unwrap();
    let ball = scene.unified_index(BodyRef::Circle(0));
    scene.deactivate_body(ball).unwrap();
    let before = scene.circles.clone();

    for _ in 0..10 {
        engine.step(&mut scene, &idle(&params)).unwrap();
    }
    assert_eq!(scene.circles, before);
}

/// INVARIANT: Velocities stay within the configured clip
#[test]
fn invariant_velocity_clipped() {
    let params = StaticParams::small();
    let env = EnvParams::default();
    let engine = PhysicsEngine::new(params.clone(), env.clone()).unwrap();
    let mut scene = SceneState::new(&params).unwrap();
    scene
        .add_circle(
            RigidBody::circle(Vec2::new(2.5, 3.0), 0.25)
                .with_velocity(Vec2::new(0.0, 500.0))
                .with_angular_velocity(-400.0),
        )
        .unwrap();

    engine.step(&mut scene, &idle(&params)).unwrap();
    let ball = &scene.circles[0];
    assert!(ball.velocity.y <= env.clip_velocity);
    assert!(ball.angular_velocity >= -env.clip_angular_velocity);
}

/// INVARIANT: Scene capacities never change while stepping
#[test]
fn invariant_capacities_fixed() {
    let params = StaticParams::medium();
    let engine = engine(&params);
    let mut scene = SceneState::new(&params).unwrap();
    scene.add_circle(RigidBody::circle(Vec2::new(2.0, 2.0), 0.3)).unwrap();
    scene.add_polygon(RigidBody::rectangle(Vec2::new(3.0, 1.0), 0.5, 0.5)).unwrap();

    for _ in 0..20 {
        engine.step(&mut scene, &idle(&params)).unwrap();
    }
    scene.validate(&params).unwrap();
}
