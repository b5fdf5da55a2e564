use super::mat2::Mat2;
use super::vec2::Vec2;
use std::f64::consts::PI;

const INV_TWO_PI: f64 = 1.0 / (2.0 * PI);

/// Wraps an angle into [-pi, pi].
pub fn clean_angle(angle: f64) -> f64 {
    angle - 2.0 * PI * (angle * INV_TWO_PI + angle.signum() * 0.5).trunc()
}

/// A normalized angle with its cached sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    angle: f64,
    sin: f64,
    cos: f64,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation { angle: 0.0, sin: 0.0, cos: 1.0 };

    pub fn new(radians: f64) -> Self {
        let angle = clean_angle(radians);
        let (sin, cos) = angle.sin_cos();
        Self { angle, sin, cos }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn set_angle(&mut self, radians: f64) {
        *self = Rotation::new(radians);
    }

    pub fn sin(&self) -> f64 {
        self.sin
    }

    pub fn cos(&self) -> f64 {
        self.cos
    }

    /// Rotates a local vector into the world frame.
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    /// Rotates a world vector into the local frame.
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    pub fn as_matrix(&self) -> Mat2 {
        Mat2::new(self.cos, -self.sin, self.sin, self.cos)
    }
}

/// Rigid transform: rotation about the origin followed by a translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: Rotation,
}

impl Transform {
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            position,
            rotation: Rotation::new(angle),
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: Rotation::IDENTITY,
        }
    }

    pub fn apply(&self, point: Vec2) -> Vec2 {
        self.rotation.apply(point) + self.position
    }

    pub fn apply_inverse(&self, point: Vec2) -> Vec2 {
        self.rotation.apply_inverse(point - self.position)
    }
}

/// Linear motion of a body's center of mass over the unfinished part of a step.
///
/// `c0`/`a0` hold the pose at step fraction `alpha0`; `c`/`a` the pose at the end of the step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f64,
    pub a: f64,
    pub alpha0: f64,
}

impl Sweep {
    /// Pose at `beta` in [0, 1], measured over the remaining interval `[alpha0, 1]`.
    pub fn transform_at(&self, beta: f64) -> Transform {
        Transform::new(
            self.c0.lerp(self.c, beta),
            self.a0 * (1.0 - beta) + self.a * beta,
        )
    }

    /// Moves the start of the sweep forward to step fraction `alpha`.
    pub fn advance(&mut self, alpha: f64) {
        if alpha <= self.alpha0 || self.alpha0 >= 1.0 {
            return;
        }
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 = self.c0.lerp(self.c, beta);
        self.a0 = self.a0 * (1.0 - beta) + self.a * beta;
        self.alpha0 = alpha;
    }
}
