use std::any::Any;
use std::f64::consts::PI;

use super::{nudge, point_velocity, Joint, JointAnchors};
use crate::math::Vec2;
use crate::objects::{BodyId, RigidBody};

const MIN_LENGTH: f64 = 0.005;
const MAX_CORRECTION: f64 = 0.2;

/// Soft distance constraint between two anchors.
///
/// With a positive `frequency` (Hz) the joint behaves as a damped spring with the given
/// damping ratio. A frequency of zero makes it a rigid distance joint.
#[derive(Debug, Clone, PartialEq)]
pub struct SpringJoint {
    anchors: JointAnchors,
    rest_length: f64,
    frequency: f64,
    damping: f64,
    u: Vec2,
    mass: f64,
    impulse: f64,
    gamma: f64,
    bias: f64,
}

impl SpringJoint {
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
        rest_length: f64,
        frequency: f64,
        damping: f64,
    ) -> Self {
        Self {
            anchors: JointAnchors::new(body_a, body_b, anchor_a, anchor_b),
            rest_length: rest_length.max(0.0),
            frequency: frequency.max(0.0),
            damping: damping.max(0.0),
            u: Vec2::ZERO,
            mass: 0.0,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn set_spring(&mut self, frequency: f64, damping: f64) {
        self.frequency = frequency.max(0.0);
        self.damping = damping.max(0.0);
    }

    pub fn impulse(&self) -> f64 {
        self.impulse
    }

    pub fn anchors(&self) -> &JointAnchors {
        &self.anchors
    }
}

impl Joint for SpringJoint {
    fn body_a(&self) -> BodyId {
        self.anchors.body_a
    }

    fn body_b(&self) -> BodyId {
        self.anchors.body_b
    }

    fn attach(&mut self, a: &RigidBody, b: &RigidBody) {
        self.anchors.attach(a, b);
    }

    fn initialize(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let d = self.anchors.offset(a, b);
        let length = d.magnitude();
        self.u = if length > MIN_LENGTH { d * (1.0 / length) } else { Vec2::ZERO };

        let cra = ra.cross(self.u);
        let crb = rb.cross(self.u);
        let mut inv_mass =
            a.inv_mass + a.inv_inertia * cra * cra + b.inv_mass + b.inv_inertia * crb * crb;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency > 0.0 {
            let c = length - self.rest_length;
            let omega = 2.0 * PI * self.frequency;
            let damping = 2.0 * self.mass * self.damping * omega;
            let stiffness = self.mass * omega * omega;

            let gamma = dt * (damping + dt * stiffness);
            self.gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
            self.bias = c * dt * stiffness * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        let p = self.u * self.impulse;
        a.apply_impulse(-p, ra);
        b.apply_impulse(p, rb);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let cdot = self.u.dot(point_velocity(b, rb) - point_velocity(a, ra));
        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        a.apply_impulse(-p, ra);
        b.apply_impulse(p, rb);
    }

    fn positional_correction(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        // Soft springs absorb drift through their bias.
        if self.frequency > 0.0 {
            return;
        }

        let (ra, rb) = self.anchors.arms(a, b);
        let d = self.anchors.offset(a, b);
        let length = d.magnitude();
        if length < MIN_LENGTH {
            return;
        }
        let u = d * (1.0 / length);
        let c = (length - self.rest_length).clamp(-MAX_CORRECTION, MAX_CORRECTION);

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

    const DT: f64 = 1.0 / 60.0;

    fn pair(distance: f64) -> (RigidBody, RigidBody) {
        let a = BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(0.1))
            .fixed()
            .build()
            .unwrap();
        let b = BodyDef::new(Vec2::new(distance, 0.0))
            .with_shape(Circle::new(0.1))
            .build()
            .unwrap();
        (a, b)
    }

    #[test]
    fn test_stretched_spring_pulls_back() {
        let (mut a, mut b) = pair(1.5);
        let mut spring = SpringJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 1.0, 2.0, 0.1);
        spring.attach(&a, &b);
        spring.initialize(&mut a, &mut b, DT);
        spring.apply_impulse(&mut a, &mut b, DT);
        assert!(b.velocity.x < 0.0);
        assert!(spring.impulse() < 0.0);
    }

    #[test]
    fn test_compressed_spring_pushes_apart() {
        let (mut a, mut b) = pair(0.5);
        let mut spring = SpringJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 1.0, 2.0, 0.1);
        spring.attach(&a, &b);
        spring.initialize(&mut a, &mut b, DT);
        spring.apply_impulse(&mut a, &mut b, DT);
        assert!(b.velocity.x > 0.0);
    }

    #[test]
    fn test_soft_spring_skips_position_correction() {
        let (mut a, mut b) = pair(1.5);
        let mut spring = SpringJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 1.0, 2.0, 0.1);
        spring.attach(&a, &b);
        spring.initialize(&mut a, &mut b, DT);
        spring.positional_correction(&mut a, &mut b);
        assert_eq!(b.position, Vec2::new(1.5, 0.0));
    }

    #[test]
    fn test_rigid_spring_holds_length() {
        let (mut a, mut b) = pair(1.1);
        let mut spring = SpringJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO, 1.0, 0.0, 0.0);
        spring.attach(&a, &b);
        spring.initialize(&mut a, &mut b, DT);
        b.velocity = Vec2::new(2.0, 0.0);
        spring.apply_impulse(&mut a, &mut b, DT);
        assert!(b.velocity.x.abs() < 1e-9);
        spring.positional_correction(&mut a, &mut b);
        assert!((b.position.x - 1.0).abs() < 1e-9);
    }
}
