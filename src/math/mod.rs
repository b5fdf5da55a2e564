pub mod mat2;
pub mod mat3;
pub mod transform;
pub mod vec2;
pub mod vec3;

pub use mat2::Mat2;
pub use mat3::Mat3;
pub use transform::{clean_angle, Rotation, Sweep, Transform};
pub use vec2::Vec2;
pub use vec3::Vec3;
