use super::vec2::Vec2;

/// Row-major 2x2 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat2 {
    pub m00: f64,
    pub m01: f64,
    pub m10: f64,
    pub m11: f64,
}

impl Mat2 {
    pub const ZERO: Mat2 = Mat2 { m00: 0.0, m01: 0.0, m10: 0.0, m11: 0.0 };
    pub const IDENTITY: Mat2 = Mat2 { m00: 1.0, m01: 0.0, m10: 0.0, m11: 1.0 };

    pub const fn new(m00: f64, m01: f64, m10: f64, m11: f64) -> Self {
        Self { m00, m01, m10, m11 }
    }

    pub fn from_angle(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self::new(c, -s, s, c)
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Reciprocal of the determinant, or zero when the matrix is singular.
    fn inv_determinant(&self) -> f64 {
        let det = self.determinant();
        if det != 0.0 {
            1.0 / det
        } else {
            0.0
        }
    }

    /// Inverse matrix. A singular matrix yields the zero matrix.
    pub fn inverse(&self) -> Mat2 {
        let d = self.inv_determinant();
        Mat2::new(d * self.m11, -d * self.m01, -d * self.m10, d * self.m00)
    }

    pub fn transpose(&self) -> Mat2 {
        Mat2::new(self.m00, self.m10, self.m01, self.m11)
    }

    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.m00 * v.x + self.m01 * v.y, self.m10 * v.x + self.m11 * v.y)
    }

    /// Solves `A x = b` without forming the inverse. Singular systems return zero.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let d = self.inv_determinant();
        Vec2::new(
            d * (self.m11 * b.x - self.m01 * b.y),
            d * (self.m00 * b.y - self.m10 * b.x),
        )
    }
}

impl std::ops::Add for Mat2 {
    type Output = Mat2;

    fn add(self, o: Mat2) -> Mat2 {
        Mat2::new(self.m00 + o.m00, self.m01 + o.m01, self.m10 + o.m10, self.m11 + o.m11)
    }
}
