use std::f64::consts::PI;

use super::mass::MassData;
use crate::collision::raycast::{RayCastInput, RayCastOutput};
use crate::collision::AABB;
use crate::math::{Transform, Vec2};

/// A solid disc. `center` is the disc's position in its body's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub radius: f64,
    pub center: Vec2,
}

impl Circle {
    pub fn new(radius: f64) -> Self {
        assert!(radius >= 0.0, "Circle radius cannot be negative");
        Self {
            radius,
            center: Vec2::ZERO,
        }
    }

    /// Circle offset from the body origin.
    pub fn with_center(mut self, center: Vec2) -> Self {
        self.center = center;
        self
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let p = xf.apply(self.center);
        let r = Vec2::new(self.radius, self.radius);
        AABB::new(p - r, p + r)
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        let mass = density * PI * self.radius * self.radius;
        MassData {
            mass,
            center: self.center,
            inertia: mass * (0.5 * self.radius * self.radius + self.center.magnitude_squared()),
        }
    }

    /// Entry point of the segment into the disc. Rays starting inside report nothing.
    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let s = input.p1 - xf.apply(self.center);
        let b = s.magnitude_squared() - self.radius * self.radius;
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.magnitude_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < f64::EPSILON {
            return None;
        }

        let a = -(c + sigma.sqrt());
        if (0.0..=input.max_fraction * rr).contains(&a) {
            let fraction = a / rr;
            return Some(RayCastOutput {
                fraction,
                normal: (s + r * fraction).normalize(),
            });
        }
        None
    }

    pub(crate) fn recenter(&mut self, offset: Vec2) {
        self.center -= offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_circle_new() {
        let c = Circle::new(5.0);
        assert_eq!(c.radius, 5.0);
        assert_eq!(c.center, Vec2::ZERO);
    }

    #[test]
    #[should_panic]
    fn test_circle_new_negative_radius() {
        Circle::new(-1.0);
    }

    #[test]
    fn test_circle_mass() {
        let mass = Circle::new(2.0).compute_mass(0.5);
        assert!((mass.mass - 2.0 * PI).abs() < EPSILON);
        assert!((mass.inertia - 0.5 * mass.mass * 4.0).abs() < EPSILON);

        // Offset circles pick up the parallel-axis term.
        let offset = Circle::new(1.0).with_center(Vec2::new(3.0, 0.0)).compute_mass(1.0);
        assert!((offset.inertia - offset.mass * (0.5 + 9.0)).abs() < EPSILON);
        assert_eq!(offset.center, Vec2::new(3.0, 0.0));
    }

    #[test]
    fn test_circle_aabb_follows_transform() {
        let c = Circle::new(0.5).with_center(Vec2::new(1.0, 0.0));
        let xf = Transform::new(Vec2::new(2.0, 2.0), std::f64::consts::PI / 2.0);
        let aabb = c.compute_aabb(&xf);
        assert!((aabb.min.x - 1.5).abs() < EPSILON);
        assert!((aabb.max.y - 3.5).abs() < EPSILON);
    }

    #[test]
    fn test_circle_raycast_hit_and_miss() {
        let c = Circle::new(1.0);
        let xf = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let hit = c
            .raycast(&RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0)), &xf)
            .unwrap();
        assert!((hit.fraction - 0.4).abs() < EPSILON);
        assert!((hit.normal.x - -1.0).abs() < EPSILON);

        let miss = c.raycast(&RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(10.0, 2.0)), &xf);
        assert!(miss.is_none());

        let mut short = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        short.max_fraction = 0.3;
        assert!(c.raycast(&short, &xf).is_none());
    }
}
