//! Kinetix Physics - deterministic 2D rigid bodies
//!
//! A fixed-capacity scene of circles and convex polygons (up to four
//! vertices), pin and weld joints with motors and limits, and thrusters,
//! advanced one fixed timestep at a time by a sequential-impulse solver.
//!
//! # Features
//!
//! - Circle-circle, circle-polygon and polygon-polygon contact manifolds
//! - Warm-started contacts with Baumgarte stabilization and Coulomb friction
//! - Revolute and fixed joints, saturating motors, rotation limits
//! - Joint-derived collision exclusion
//! - Goal/hazard contact detection for episode termination
//! - JSON level persistence
//!
//! The same scene, parameters and actions always produce the same result.
//! Every iteration order is fixed by slot index.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PhysicsEngine                   │
//! │  gravity → manifolds → motors/thrusters →        │
//! │  warm start → [joints → contact batches] × N →   │
//! │  integrate → anchors → events/terminal           │
//! └──────────────────────────────────────────────────┘
//!                         │ &mut
//!                         ▼
//! ┌──────────────────────────────────────────────────┐
//! │                   SceneState                     │
//! │  polygons  circles  joints  thrusters            │
//! │  collision_matrix   rr/cr/cc manifold slots      │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use kinetix_physics::prelude::*;
//!
//! let params = StaticParams::small();
//! let engine = PhysicsEngine::new(params.clone(), EnvParams::default()).unwrap();
//! let mut scene = SceneState::new(&params).unwrap();
//!
//! scene
//!     .add_circle(RigidBody::circle(Vec2::new(2.5, 2.0), 0.3).with_role(Role::Ball))
//!     .unwrap();
//!
//! let actions = vec![0.0; params.action_len()];
//! let terminal = engine.step(&mut scene, &actions).unwrap();
//! assert_eq!(terminal, Terminal::Ongoing);
//! ```

pub mod batch;
pub mod bindings;
pub mod body;
pub mod collision;
pub mod config;
pub mod error;
pub mod events;
pub mod joint;
pub mod layers;
pub mod level;
pub mod manifold;
pub mod mass;
pub mod material;
pub mod stepper;
pub mod world;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::bindings::bind_actions;
    pub use crate::body::{BodyRef, CollisionMode, Polygon, RigidBody, Role, Shape};
    pub use crate::config::{EnvParams, StaticParams};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::events::{ContactData, ContactEvent, ContactEventType, EventCollector, PhysicsEventHandler, Terminal};
    pub use crate::joint::{Joint, Thruster};
    pub use crate::layers::CollisionMatrix;
    pub use crate::level::Level;
    pub use crate::manifold::{CollisionManifold, PairKind, PolygonManifold};
    pub use crate::material::Material;
    pub use crate::stepper::{step, PhysicsEngine};
    pub use crate::world::{EntityKind, SceneState};
    pub use kinetix_math::Vec2;
}

pub use prelude::*;
