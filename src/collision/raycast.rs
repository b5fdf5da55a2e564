use crate::math::Vec2;

/// A segment `p1 -> p1 + max_fraction * (p2 - p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f64,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    pub fn point_at(&self, fraction: f64) -> Vec2 {
        self.p1 + (self.p2 - self.p1) * fraction
    }
}

/// Where a ray first enters a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    /// Fraction along `p1 -> p2` of the entry point.
    pub fraction: f64,
    /// Outward surface normal at the entry point.
    pub normal: Vec2,
}
