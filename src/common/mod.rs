pub mod arena;
pub mod config;
pub mod material;

pub use arena::Arena;
pub use config::WorldConfig;
pub use material::Material;
