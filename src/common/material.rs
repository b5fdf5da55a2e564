//! Surface properties shared by every shape of a body.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction and restitution of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Coefficient of restitution. 0 = perfectly inelastic, 1 = perfectly elastic.
    pub restitution: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
}

impl Material {
    pub fn new(restitution: f64, friction: f64) -> Self {
        Material {
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
        }
    }

    /// A contact bounces as much as its bouncier side.
    pub fn mix_restitution(a: &Material, b: &Material) -> f64 {
        a.restitution.max(b.restitution)
    }

    /// Geometric mean, so a frictionless side makes the whole contact frictionless.
    pub fn mix_friction(a: &Material, b: &Material) -> f64 {
        (a.friction * b.friction).sqrt()
    }
}

impl Default for Material {
    fn default() -> Self {
        Material {
            restitution: 0.2,
            friction: 0.6,
        }
    }
}
