use super::vec2::Vec2;
use super::vec3::Vec3;

/// Row-major 3x3 matrix. Only the solves needed by point-plus-angle constraints are provided.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat3 {
    pub m: [[f64; 3]; 3],
}

impl Mat3 {
    pub const ZERO: Mat3 = Mat3 { m: [[0.0; 3]; 3] };

    pub fn new(m: [[f64; 3]; 3]) -> Self {
        Self { m }
    }

    fn column(&self, c: usize) -> Vec3 {
        Vec3::new(self.m[0][c], self.m[1][c], self.m[2][c])
    }

    /// Solves the upper-left 2x2 block against `b`. Singular blocks return zero.
    pub fn solve2(&self, b: Vec2) -> Vec2 {
        let m = &self.m;
        let mut det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(
            det * (m[1][1] * b.x - m[0][1] * b.y),
            det * (m[0][0] * b.y - m[1][0] * b.x),
        )
    }

    /// Solves the full system by Cramer's rule. Singular matrices return zero.
    pub fn solve3(&self, b: Vec3) -> Vec3 {
        let ex = self.column(0);
        let ey = self.column(1);
        let ez = self.column(2);
        let mut det = ex.dot(ey.cross(ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec3::new(
            det * b.dot(ey.cross(ez)),
            det * ex.dot(b.cross(ez)),
            det * ex.dot(ey.cross(b)),
        )
    }
}
