//! Time of impact by conservative advancement over two sweeps.

use tracing::debug;

use super::gjk::{self, Simplex};
use crate::math::{Sweep, Transform, Vec2};
use crate::shapes::Shape;

/// Accepted band below the target separation.
pub const TOI_TOLERANCE: f64 = 0.001;
const MAX_OUTER_ITERATIONS: usize = 20;
const MAX_PUSH_ITERATIONS: usize = 10;
const MAX_ROOT_ITERATIONS: usize = 50;

/// Separating axis chosen from a GJK simplex, evaluated along the sweeps.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SeparationFunction {
    /// World axis between two support points.
    Points { axis: Vec2 },
    /// Axis normal to an edge of A, in A's frame.
    FaceA { axis: Vec2, local_point: Vec2 },
    /// Axis normal to an edge of B, in B's frame.
    FaceB { axis: Vec2, local_point: Vec2 },
}

impl SeparationFunction {
    fn new(simplex: &Simplex, shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Self {
        let v = simplex.vertices();
        if v.len() == 1 {
            return SeparationFunction::Points {
                axis: v[0].w.normalize(),
            };
        }

        if v[0].index_a == v[1].index_a {
            let b1 = shape_b.vertex(v[0].index_b);
            let b2 = shape_b.vertex(v[1].index_b);
            let mut axis = (b2 - b1).cross_scalar(1.0).normalize();
            let local_point = (b1 + b2) * 0.5;
            let normal = xf_b.rotation.apply(axis);
            if (v[0].point_a - xf_b.apply(local_point)).dot(normal) < 0.0 {
                axis = -axis;
            }
            return SeparationFunction::FaceB { axis, local_point };
        }

        let a1 = shape_a.vertex(v[0].index_a);
        let a2 = shape_a.vertex(v[1].index_a);
        let mut axis = (a2 - a1).cross_scalar(1.0).normalize();
        let local_point = (a1 + a2) * 0.5;
        let normal = xf_a.rotation.apply(axis);
        if (v[0].point_b - xf_a.apply(local_point)).dot(normal) < 0.0 {
            axis = -axis;
        }
        SeparationFunction::FaceA { axis, local_point }
    }

    /// Deepest support points along the axis at the given poses.
    fn find_supports(&self, shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> (usize, usize) {
        match *self {
            SeparationFunction::Points { axis } => (
                shape_a.support(xf_a.rotation.apply_inverse(axis)),
                shape_b.support(xf_b.rotation.apply_inverse(-axis)),
            ),
            SeparationFunction::FaceA { axis, .. } => {
                let normal = xf_a.rotation.apply(axis);
                (0, shape_b.support(xf_b.rotation.apply_inverse(-normal)))
            }
            SeparationFunction::FaceB { axis, .. } => {
                let normal = xf_b.rotation.apply(axis);
                (shape_a.support(xf_a.rotation.apply_inverse(-normal)), 0)
            }
        }
    }

    fn evaluate(
        &self,
        shape_a: &Shape,
        xf_a: &Transform,
        index_a: usize,
        shape_b: &Shape,
        xf_b: &Transform,
        index_b: usize,
    ) -> f64 {
        match *self {
            SeparationFunction::Points { axis } => {
                let pa = xf_a.apply(shape_a.vertex(index_a));
                let pb = xf_b.apply(shape_b.vertex(index_b));
                (pb - pa).dot(axis)
            }
            SeparationFunction::FaceA { axis, local_point } => {
                let normal = xf_a.rotation.apply(axis);
                let pa = xf_a.apply(local_point);
                let pb = xf_b.apply(shape_b.vertex(index_b));
                (pb - pa).dot(normal)
            }
            SeparationFunction::FaceB { axis, local_point } => {
                let normal = xf_b.rotation.apply(axis);
                let pb = xf_b.apply(local_point);
                let pa = xf_a.apply(shape_a.vertex(index_a));
                (pa - pb).dot(normal)
            }
        }
    }
}

/// Earliest fraction in `[0, 1]` of the sweeps at which the shapes come within
/// [`TOI_TOLERANCE`] of touching.
///
/// Returns `None` when they never get that close, and also when they already touch at the
/// start of the sweep: that is a resting contact, not a new impact.
pub fn time_of_impact(shape_a: &Shape, sweep_a: &Sweep, shape_b: &Shape, sweep_b: &Sweep) -> Option<f64> {
    let target = shape_a.radius() + shape_b.radius();
    let mut t0 = 0.0;

    for outer in 0..MAX_OUTER_ITERATIONS {
        let mut t1 = 1.0;
        let xf_a = sweep_a.transform_at(t0);
        let xf_b = sweep_b.transform_at(t0);

        let output = gjk::distance(shape_a, &xf_a, shape_b, &xf_b);
        if output.distance < target + 0.25 * TOI_TOLERANCE {
            return if outer == 0 { None } else { Some(t0) };
        }

        let function = SeparationFunction::new(&output.simplex, shape_a, &xf_a, shape_b, &xf_b);
        let separation_at = |t: f64, index_a: usize, index_b: usize| {
            let xf_a = sweep_a.transform_at(t);
            let xf_b = sweep_b.transform_at(t);
            function.evaluate(shape_a, &xf_a, index_a, shape_b, &xf_b, index_b)
        };

        for _ in 0..MAX_PUSH_ITERATIONS {
            let (index_a, index_b) = function.find_supports(
                shape_a,
                &sweep_a.transform_at(t1),
                shape_b,
                &sweep_b.transform_at(t1),
            );

            let s1 = separation_at(t1, index_a, index_b);
            if s1 > target {
                // Still apart at the end of the sweep along this axis.
                return None;
            }
            if s1 > target - TOI_TOLERANCE {
                t0 = t1;
                break;
            }

            let s0 = separation_at(t0, index_a, index_b);
            if s0 < target - TOI_TOLERANCE {
                return None;
            }
            if s0 <= target {
                return Some(t0);
            }

            if let Some(t) = find_root(
                |t| separation_at(t, index_a, index_b),
                target,
                (t0, s0),
                (t1, s1),
            ) {
                t1 = t;
            }
        }
    }

    None
}

/// Mixed bisection and secant search for a time in `[a0, a1]` where the separation lands
/// within `TOI_TOLERANCE` below `target`. `s0` must be above the band and `s1` below it.
fn find_root<F: Fn(f64) -> f64>(
    separation: F,
    target: f64,
    (mut a0, mut s0): (f64, f64),
    (mut a1, mut s1): (f64, f64),
) -> Option<f64> {
    for i in 0..MAX_ROOT_ITERATIONS {
        let t = if i % 2 == 1 {
            a0 + (target - s0) * (a1 - a0) / (s1 - s0)
        } else {
            0.5 * (a0 + a1)
        };
        let s = separation(t);
        if s > target - TOI_TOLERANCE && s <= target {
            return Some(t);
        }
        if s > target {
            a0 = t;
            s0 = s;
        } else {
            a1 = t;
            s1 = s;
        }
    }
    debug!(
        iterations = MAX_ROOT_ITERATIONS,
        lower = a0,
        upper = a1,
        "time of impact root search did not converge"
    );
    None
}
