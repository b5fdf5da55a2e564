use std::any::Any;

use super::{nudge, point_velocity, Joint, JointAnchors};
use crate::math::Vec2;
use crate::objects::{BodyId, RigidBody};

/// Anchors closer than this have no usable direction.
const MIN_LENGTH: f64 = 0.005;
/// Largest stretch removed by one position correction.
const MAX_CORRECTION: f64 = 0.2;

/// Keeps two anchors at most `max_length` apart. Slack ropes exert nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct RopeJoint {
    anchors: JointAnchors,
    max_length: f64,
    u: Vec2,
    length: f64,
    mass: f64,
    impulse: f64,
}

impl RopeJoint {
    pub fn new(body_a: BodyId, body_b: BodyId, anchor_a: Vec2, anchor_b: Vec2, max_length: f64) -> Self {
        Self {
            anchors: JointAnchors::new(body_a, body_b, anchor_a, anchor_b),
            max_length: max_length.max(0.0),
            u: Vec2::ZERO,
            length: 0.0,
            mass: 0.0,
            impulse: 0.0,
        }
    }

    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    pub fn set_max_length(&mut self, max_length: f64) {
        self.max_length = max_length.max(0.0);
    }

    /// Anchor distance at the last `initialize`.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Accumulated impulse along the rope, never positive.
    pub fn impulse(&self) -> f64 {
        self.impulse
    }

    pub fn anchors(&self) -> &JointAnchors {
        &self.anchors
    }
}

impl Joint for RopeJoint {
    fn body_a(&self) -> BodyId {
        self.anchors.body_a
    }

    fn body_b(&self) -> BodyId {
        self.anchors.body_b
    }

    fn attach(&mut self, a: &RigidBody, b: &RigidBody) {
        self.anchors.attach(a, b);
    }

    fn initialize(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let d = self.anchors.offset(a, b);
        self.length = d.magnitude();
        if self.length < MIN_LENGTH {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }
        self.u = d * (1.0 / self.length);

        let cra = ra.cross(self.u);
        let crb = rb.cross(self.u);
        let inv_mass =
            a.inv_mass + a.inv_inertia * cra * cra + b.inv_mass + b.inv_inertia * crb * crb;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        let p = self.u * self.impulse;
        a.apply_impulse(-p, ra);
        b.apply_impulse(p, rb);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(point_velocity(b, rb) - point_velocity(a, ra));
        // Slack: allow closing at the speed that just takes up the slack.
        if c < 0.0 && dt > 0.0 {
            cdot += c / dt;
        }

        let old = self.impulse;
        self.impulse = (self.impulse - self.mass * cdot).min(0.0);
        let p = self.u * (self.impulse - old);
        a.apply_impulse(-p, ra);
        b.apply_impulse(p, rb);
    }

    fn positional_correction(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        let (ra, rb) = self.anchors.arms(a, b);
        let d = self.anchors.offset(a, b);
        let length = d.magnitude();
        if length < MIN_LENGTH {
            return;
        }
        let u = d * (1.0 / length);
        let c = (length - self.max_length).clamp(0.0, MAX_CORRECTION);

        let p = u * (-self.mass * c);
        nudge(a, -p * a.inv_mass, -a.inv_inertia * ra.cross(p));
        nudge(b, p * b.inv_mass, b.inv_inertia * rb.cross(p));
    }

    fn clone_box(&self) -> Box<dyn Joint> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::BodyDef;
    use crate::shapes::Circle;

    const EPSILON: f64 = 1e-9;
    const DT: f64 = 1.0 / 60.0;

    fn pair(distance: f64) -> (RigidBody, RigidBody) {
        let a = BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(0.1))
            .fixed()
            .build()
            .unwrap();
        let b = BodyDef::new(Vec2::new(0.0, -distance))
            .with_shape(Circle::new(0.1))
            .build()
            .unwrap();
        (a, b)
    }

    #[test]
    fn test_taut_rope_stops_separation() {
        let (mut a, mut b) = pair(2.0);
        let mut rope = RopeJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 2.0);
        rope.attach(&a, &b);
        b.velocity = Vec2::new(0.0, -4.0);
        rope.initialize(&mut a, &mut b, DT);
        rope.apply_impulse(&mut a, &mut b, DT);
        assert!(b.velocity.y.abs() < EPSILON);
        assert!(rope.impulse() < 0.0);
    }

    #[test]
    fn test_slack_rope_lets_bodies_approach_limit() {
        let (mut a, mut b) = pair(1.0);
        let mut rope = RopeJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 2.0);
        rope.attach(&a, &b);
        b.velocity = Vec2::new(0.0, -10.0);
        rope.initialize(&mut a, &mut b, DT);
        rope.apply_impulse(&mut a, &mut b, DT);
        // Free fall is allowed until the rope would pass its limit within this step.
        let limit_speed = 1.0 / DT;
        assert!((b.velocity.y - -10.0).abs() < EPSILON);

        b.velocity = Vec2::new(0.0, -100.0);
        rope.apply_impulse(&mut a, &mut b, DT);
        assert!((b.velocity.y + limit_speed).abs() < 1e-6);
    }

    #[test]
    fn test_rope_never_pushes() {
        let (mut a, mut b) = pair(2.0);
        let mut rope = RopeJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 2.0);
        rope.attach(&a, &b);
        b.velocity = Vec2::new(0.0, 3.0);
        rope.initialize(&mut a, &mut b, DT);
        rope.apply_impulse(&mut a, &mut b, DT);
        assert!((b.velocity.y - 3.0).abs() < EPSILON);
        assert_eq!(rope.impulse(), 0.0);
    }

    #[test]
    fn test_positional_correction_pulls_back() {
        let (mut a, mut b) = pair(2.1);
        let mut rope = RopeJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 2.0);
        rope.attach(&a, &b);
        rope.initialize(&mut a, &mut b, DT);
        rope.positional_correction(&mut a, &mut b);
        assert!((b.position.y - -2.0).abs() < EPSILON);
        assert_eq!(a.position, Vec2::ZERO);
    }
}
