mod ccd;
mod island;
mod physics_world;

pub use island::Island;
pub use physics_world::{ForceHook, PhysicsWorld, RayCastHit};
