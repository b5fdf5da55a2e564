pub mod aabb;
pub mod broadphase;
pub mod contact_data;
pub mod detection;
pub mod dynamic_tree;
pub mod gjk;
pub mod manifold;
pub mod raycast;
pub mod toi;

// Re-export key types
pub use aabb::AABB;
pub use broadphase::{BroadPhase, PairKey};
pub use contact_data::{CollisionCallback, ContactData};
pub use dynamic_tree::{DebugNode, DynamicTree};
pub use gjk::DistanceOutput;
pub use manifold::{ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType};
pub use raycast::{RayCastInput, RayCastOutput};
pub use toi::time_of_impact;
