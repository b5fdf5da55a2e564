use crate::math::Vec2;

/// Mass properties of a shape or a whole body.
///
/// `inertia` is the rotational inertia about the local origin of whatever produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f64,
    pub center: Vec2,
    pub inertia: f64,
}

impl MassData {
    pub fn inv_mass(&self) -> f64 {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }
}
