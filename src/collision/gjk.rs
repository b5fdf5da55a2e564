//! GJK distance between the cores of two convex shapes.
//!
//! Circles enter as their center point. Callers add the radii themselves.

use crate::math::{Transform, Vec2};
use crate::shapes::Shape;

/// Upper bound on support point additions.
const MAX_ITERATIONS: usize = 20;

/// One support point of the Minkowski difference `B - A`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexVertex {
    pub index_a: usize,
    pub index_b: usize,
    /// World support point on A.
    pub point_a: Vec2,
    /// World support point on B.
    pub point_b: Vec2,
    /// `point_b - point_a`.
    pub w: Vec2,
    /// Barycentric weight of this vertex in the closest point.
    pub bary: f64,
}

impl SimplexVertex {
    fn new(shape_a: &Shape, xf_a: &Transform, index_a: usize, shape_b: &Shape, xf_b: &Transform, index_b: usize) -> Self {
        let point_a = xf_a.apply(shape_a.vertex(index_a));
        let point_b = xf_b.apply(shape_b.vertex(index_b));
        Self {
            index_a,
            index_b,
            point_a,
            point_b,
            w: point_b - point_a,
            bary: 1.0,
        }
    }
}

/// Up to three support points.
#[derive(Debug, Clone, PartialEq)]
pub struct Simplex {
    vertices: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn new(first: SimplexVertex) -> Self {
        Self {
            vertices: [first; 3],
            count: 1,
        }
    }

    pub fn vertices(&self) -> &[SimplexVertex] {
        &self.vertices[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push(&mut self, vertex: SimplexVertex) {
        self.vertices[self.count] = vertex;
        self.count += 1;
    }

    fn keep(&mut self, indices: &[usize], weights: &[f64]) {
        let old = self.vertices;
        for (slot, (&i, &bary)) in indices.iter().zip(weights).enumerate() {
            self.vertices[slot] = SimplexVertex { bary, ..old[i] };
        }
        self.count = indices.len();
    }

    /// Reduces the simplex to the sub-simplex closest to the origin and sets its weights.
    fn solve(&mut self) {
        match self.count {
            1 => self.vertices[0].bary = 1.0,
            2 => self.solve2(),
            3 => self.solve3(),
            _ => {}
        }
    }

    fn solve2(&mut self) {
        let s1 = self.vertices[0].w;
        let s2 = self.vertices[1].w;
        let e12 = s2 - s1;

        let d12_1 = -s1.dot(e12);
        if d12_1 <= 0.0 {
            self.keep(&[0], &[1.0]);
            return;
        }
        let d12_2 = s2.dot(e12);
        if d12_2 <= 0.0 {
            self.keep(&[1], &[1.0]);
            return;
        }
        let inv = 1.0 / (d12_1 + d12_2);
        self.keep(&[0, 1], &[d12_2 * inv, d12_1 * inv]);
    }

    fn solve3(&mut self) {
        let s1 = self.vertices[0].w;
        let s2 = self.vertices[1].w;
        let s3 = self.vertices[2].w;

        let e12 = s2 - s1;
        let d12_1 = -s1.dot(e12);
        let d12_2 = s2.dot(e12);

        let e13 = s3 - s1;
        let d13_1 = -s1.dot(e13);
        let d13_2 = s3.dot(e13);

        let e23 = s3 - s2;
        let d23_1 = -s2.dot(e23);
        let d23_2 = s3.dot(e23);

        let n123 = e12.cross(e13);
        let d123_1 = n123 * s2.cross(s3);
        let d123_2 = n123 * s3.cross(s1);
        let d123_3 = n123 * s1.cross(s2);

        if d12_1 <= 0.0 && d13_1 <= 0.0 {
            self.keep(&[0], &[1.0]);
        } else if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.keep(&[0, 1], &[d12_2 * inv, d12_1 * inv]);
        } else if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.keep(&[0, 2], &[d13_2 * inv, d13_1 * inv]);
        } else if d12_2 <= 0.0 && d23_1 <= 0.0 {
            self.keep(&[1], &[1.0]);
        } else if d13_2 <= 0.0 && d23_2 <= 0.0 {
            self.keep(&[2], &[1.0]);
        } else if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.keep(&[1, 2], &[d23_2 * inv, d23_1 * inv]);
        } else {
            // Origin inside the triangle.
            let inv = 1.0 / (d123_1 + d123_2 + d123_3);
            self.keep(&[0, 1, 2], &[d123_1 * inv, d123_2 * inv, d123_3 * inv]);
        }
    }

    /// Direction from the simplex toward the origin.
    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.vertices[0].w,
            2 => {
                let s1 = self.vertices[0].w;
                let e12 = self.vertices[1].w - s1;
                if e12.cross(-s1) > 0.0 {
                    Vec2::scalar_cross(1.0, e12)
                } else {
                    e12.cross_scalar(1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.vertices[0].point_a, self.vertices[0].point_b),
            2 => {
                let [v1, v2, _] = self.vertices;
                (
                    v1.point_a * v1.bary + v2.point_a * v2.bary,
                    v1.point_b * v1.bary + v2.point_b * v2.bary,
                )
            }
            _ => {
                let [v1, v2, v3] = self.vertices;
                let p = v1.point_a * v1.bary + v2.point_a * v2.bary + v3.point_a * v3.bary;
                (p, p)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A's core.
    pub point_a: Vec2,
    /// Closest point on B's core.
    pub point_b: Vec2,
    /// Zero when the cores overlap.
    pub distance: f64,
    pub simplex: Simplex,
    pub iterations: usize,
}

/// Closest points between the cores of two shapes.
pub fn distance(shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> DistanceOutput {
    let mut simplex = Simplex::new(SimplexVertex::new(shape_a, xf_a, 0, shape_b, xf_b, 0));

    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        let previous: Vec<(usize, usize)> = simplex
            .vertices()
            .iter()
            .map(|v| (v.index_a, v.index_b))
            .collect();

        simplex.solve();
        if simplex.len() == 3 {
            break;
        }

        let direction = simplex.search_direction();
        if direction.magnitude_squared() < f64::EPSILON {
            break;
        }

        let index_a = shape_a.support(xf_a.rotation.apply_inverse(-direction));
        let index_b = shape_b.support(xf_b.rotation.apply_inverse(direction));
        iterations += 1;

        // Revisiting a support pair means no further progress is possible.
        if previous.contains(&(index_a, index_b)) {
            break;
        }
        simplex.push(SimplexVertex::new(shape_a, xf_a, index_a, shape_b, xf_b, index_b));
    }

    let (point_a, point_b) = simplex.witness_points();
    DistanceOutput {
        point_a,
        point_b,
        distance: point_a.distance(point_b),
        simplex,
        iterations,
    }
}
