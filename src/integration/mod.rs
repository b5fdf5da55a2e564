pub mod integrator;

pub use integrator::{advance, integrate_position, integrate_remaining, integrate_velocity};
