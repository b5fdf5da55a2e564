pub mod rigid_body;

pub use rigid_body::{BodyDef, BodyId, CollisionFilter, RigidBody, ShapeId};
