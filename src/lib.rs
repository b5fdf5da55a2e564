//! Deterministic fixed-timestep 2D rigid-body physics.
//!
//! A [`PhysicsWorld`] owns bodies built from [`BodyDef`]s and joints connecting them, and
//! advances them with [`PhysicsWorld::step`]. Every step runs, in order: the force hook,
//! the broadphase, the narrowphase, island solving and sleeping, time-of-impact sub-steps
//! and finally the collision callbacks.

pub mod math;
pub mod objects;
pub mod constraints;
pub mod integration;
pub mod collision;
pub mod shapes;
pub mod world;
pub mod common;
pub mod error;

// Re-export key types for easier use
pub use math::vec2::Vec2;
pub use objects::{BodyDef, BodyId, RigidBody, ShapeId};
pub use shapes::{Shape, Circle, Polygon};
pub use constraints::{Joint, JointId, RevoluteJoint, RopeJoint, SpringJoint, WheelJoint};
pub use collision::{CollisionCallback, ContactData};
pub use world::{ForceHook, PhysicsWorld, RayCastHit};
pub use common::{Material, WorldConfig};
pub use error::{PhysicsError, Result};
