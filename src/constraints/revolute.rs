use std::any::Any;
use std::f64::consts::PI;

use super::{nudge, point_velocity, Joint, JointAnchors};
use crate::error::{PhysicsError, Result};
use crate::math::{clean_angle, Mat2, Mat3, Vec2, Vec3};
use crate::objects::{BodyId, RigidBody};

/// Angular error tolerated at a limit.
const ANGULAR_SLOP: f64 = PI / 90.0;
/// Largest angular step one correction may take.
const MAX_ANGULAR_CORRECTION: f64 = PI / 22.5;

/// Where the relative angle sits with respect to the limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    Inactive,
    Between,
    AtLower,
    AtUpper,
}

/// Pins an anchor on A to an anchor on B, optionally bounding their relative angle.
#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJoint {
    anchors: JointAnchors,
    limits: Option<(f64, f64)>,
    reference_angle: f64,
    mass: Mat3,
    impulse: Vec3,
    state: LimitState,
}

impl RevoluteJoint {
    /// Anchors are given in each body's definition frame.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            anchors: JointAnchors::new(body_a, body_b, anchor_a, anchor_b),
            limits: None,
            reference_angle: 0.0,
            mass: Mat3::ZERO,
            impulse: Vec3::ZERO,
            state: LimitState::Inactive,
        }
    }

    /// Bounds the angle of B relative to A, measured from the angle at attach time.
    pub fn with_limits(mut self, lower: f64, upper: f64) -> Result<Self> {
        self.set_limits(Some((lower, upper)))?;
        Ok(self)
    }

    pub fn set_limits(&mut self, limits: Option<(f64, f64)>) -> Result<()> {
        if let Some((lower, upper)) = limits {
            if !(-PI..=PI).contains(&upper) {
                return Err(PhysicsError::invalid_joint_limits(format!(
                    "upper limit {} outside [-pi, pi]",
                    upper
                )));
            }
            if !(-PI..=PI).contains(&lower) {
                return Err(PhysicsError::invalid_joint_limits(format!(
                    "lower limit {} outside [-pi, pi]",
                    lower
                )));
            }
            if lower > upper {
                return Err(PhysicsError::invalid_joint_limits(format!(
                    "lower limit {} above upper limit {}",
                    lower, upper
                )));
            }
        }
        self.limits = limits;
        self.state = if limits.is_some() { LimitState::Between } else { LimitState::Inactive };
        self.impulse.z = 0.0;
        Ok(())
    }

    pub fn limits(&self) -> Option<(f64, f64)> {
        self.limits
    }

    pub fn limit_state(&self) -> LimitState {
        self.state
    }

    /// Angle of B relative to A, zero at attach time.
    pub fn joint_angle(&self, a: &RigidBody, b: &RigidBody) -> f64 {
        clean_angle(b.angle() - a.angle() - self.reference_angle)
    }

    /// Accumulated impulse: point constraint in x/y, limit in z.
    pub fn impulse(&self) -> Vec3 {
        self.impulse
    }

    pub fn anchors(&self) -> &JointAnchors {
        &self.anchors
    }
}

impl Joint for RevoluteJoint {
    fn body_a(&self) -> BodyId {
        self.anchors.body_a
    }

    fn body_b(&self) -> BodyId {
        self.anchors.body_b
    }

    fn attach(&mut self, a: &RigidBody, b: &RigidBody) {
        self.anchors.attach(a, b);
        self.reference_angle = clean_angle(b.angle() - a.angle());
    }

    fn initialize(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        let m = &mut self.mass.m;
        m[0][0] = ma + mb + ra.y * ra.y * ia + rb.y * rb.y * ib;
        m[0][1] = -ra.y * ra.x * ia - rb.y * rb.x * ib;
        m[0][2] = -ra.y * ia - rb.y * ib;
        m[1][0] = m[0][1];
        m[1][1] = ma + mb + ra.x * ra.x * ia + rb.x * rb.x * ib;
        m[1][2] = ra.x * ia + rb.x * ib;
        m[2][0] = m[0][2];
        m[2][1] = m[1][2];
        m[2][2] = ia + ib;

        if let Some((lower, upper)) = self.limits {
            let angle = self.joint_angle(a, b);
            let next = if angle <= lower {
                LimitState::AtLower
            } else if angle >= upper {
                LimitState::AtUpper
            } else {
                LimitState::Between
            };
            if next != self.state || next == LimitState::Between {
                self.impulse.z = 0.0;
            }
            self.state = next;
        }

        let p = Vec2::new(self.impulse.x, self.impulse.y);
        a.velocity -= p * ma;
        a.angular_velocity -= ia * (ra.cross(p) + self.impulse.z);
        b.velocity += p * mb;
        b.angular_velocity += ib * (rb.cross(p) + self.impulse.z);
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, _dt: f64) {
        let (ra, rb) = self.anchors.arms(a, b);
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        let cdot1 = point_velocity(b, rb) - point_velocity(a, ra);

        let (p, angular) = match self.state {
            LimitState::AtLower | LimitState::AtUpper => {
                let cdot2 = b.angular_velocity - a.angular_velocity;
                let mut impulse = -self.mass.solve3(Vec3::new(cdot1.x, cdot1.y, cdot2));
                let new_z = self.impulse.z + impulse.z;
                let pushes_wrong_way = match self.state {
                    LimitState::AtLower => new_z < 0.0,
                    _ => new_z > 0.0,
                };

                if pushes_wrong_way {
                    // Release the limit and solve the point constraint alone.
                    let column = Vec2::new(self.mass.m[0][2], self.mass.m[1][2]);
                    let rhs = -cdot1 + column * self.impulse.z;
                    let reduced = self.mass.solve2(rhs);
                    impulse = Vec3::new(reduced.x, reduced.y, -self.impulse.z);
                    self.impulse.x += reduced.x;
                    self.impulse.y += reduced.y;
                    self.impulse.z = 0.0;
                } else {
                    self.impulse += impulse;
                }
                (Vec2::new(impulse.x, impulse.y), impulse.z)
            }
            LimitState::Inactive | LimitState::Between => {
                let impulse = self.mass.solve2(-cdot1);
                self.impulse.x += impulse.x;
                self.impulse.y += impulse.y;
                (impulse, 0.0)
            }
        };

        a.velocity -= p * ma;
        a.angular_velocity -= ia * (ra.cross(p) + angular);
        b.velocity += p * mb;
        b.angular_velocity += ib * (rb.cross(p) + angular);
    }

    fn positional_correction(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        if let Some((lower, upper)) = self.limits {
            if ia + ib > 0.0 {
                let angle = self.joint_angle(a, b);
                let c = match self.state {
                    LimitState::AtLower => {
                        (angle - lower + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0)
                    }
                    LimitState::AtUpper => {
                        (angle - upper - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION)
                    }
                    LimitState::Inactive | LimitState::Between => 0.0,
                };
                let limit_impulse = -c / (ia + ib);
                nudge(a, Vec2::ZERO, -ia * limit_impulse);
                nudge(b, Vec2::ZERO, ib * limit_impulse);
            }
        }

        // Arms follow the corrected angles.
        let (ra, rb) = self.anchors.arms(a, b);
        let c = self.anchors.offset(a, b);
        let k = Mat2::new(
            ma + mb + ia * ra.y * ra.y + ib * rb.y * rb.y,
            -ia * ra.x * ra.y - ib * rb.x * rb.y,
            -ia * ra.x * ra.y - ib * rb.x * rb.y,
            ma + mb + ia * ra.x * ra.x + ib * rb.x * rb.x,
        );
        let impulse = -k.solve(c);

        nudge(a, -impulse * ma, -ia * ra.cross(impulse));
        nudge(b, impulse * mb, ib * rb.cross(impulse));
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
    use crate::shapes::Polygon;

    const EPSILON: f64 = 1e-9;

    fn pair() -> (RigidBody, RigidBody) {
        let a = BodyDef::new(Vec2::ZERO)
            .with_shape(Polygon::new_box(0.5, 0.5))
            .fixed()
            .build()
            .unwrap();
        let b = BodyDef::new(Vec2::new(1.0, 0.0))
            .with_shape(Polygon::new_box(0.5, 0.1))
            .build()
            .unwrap();
        (a, b)
    }

    #[test]
    fn test_limits_are_validated() {
        let j = RevoluteJoint::new(BodyId(0), BodyId(1), Vec2::ZERO, Vec2::ZERO);
        assert!(j.clone().with_limits(-0.5, 0.5).is_ok());
        assert!(matches!(
            j.clone().with_limits(0.5, -0.5),
            Err(PhysicsError::InvalidJointLimits(_))
        ));
        assert!(j.clone().with_limits(-4.0, 0.0).is_err());
        assert!(j.with_limits(0.0, 3.5).is_err());
    }

    #[test]
    fn test_anchor_velocities_match_after_solve() {
        let (mut a, mut b) = pair();
        let mut j = RevoluteJoint::new(BodyId(0), BodyId(1), Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0));
        j.attach(&a, &b);
        b.velocity = Vec2::new(0.0, -3.0);
        b.angular_velocity = 1.0;

        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        for _ in 0..4 {
            j.apply_impulse(&mut a, &mut b, 1.0 / 60.0);
        }
        let (ra, rb) = j.anchors().arms(&a, &b);
        let rel = point_velocity(&b, rb) - point_velocity(&a, ra);
        assert!(rel.magnitude() < EPSILON, "relative anchor velocity {:?}", rel);
        assert_eq!(a.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_positional_correction_closes_gap() {
        let (mut a, mut b) = pair();
        let mut j = RevoluteJoint::new(BodyId(0), BodyId(1), Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0));
        j.attach(&a, &b);
        b.position = Vec2::new(1.2, -0.1);
        let before = j.anchors().offset(&a, &b).magnitude();
        for _ in 0..3 {
            j.positional_correction(&mut a, &mut b);
        }
        let after = j.anchors().offset(&a, &b).magnitude();
        assert!(after < before * 0.1, "gap {} -> {}", before, after);
    }

    #[test]
    fn test_limit_state_transitions() {
        let (mut a, mut b) = pair();
        let mut j = RevoluteJoint::new(BodyId(0), BodyId(1), Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0))
            .with_limits(-0.25, 0.25)
            .unwrap();
        j.attach(&a, &b);
        assert_eq!(j.limit_state(), LimitState::Between);

        b.rotation = crate::math::Rotation::new(-0.3);
        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        assert_eq!(j.limit_state(), LimitState::AtLower);

        b.rotation = crate::math::Rotation::new(0.3);
        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        assert_eq!(j.limit_state(), LimitState::AtUpper);
        assert_eq!(j.impulse().z, 0.0);

        // Pushing against the upper stop builds angular impulse that survives while it holds.
        b.angular_velocity = 2.0;
        j.apply_impulse(&mut a, &mut b, 1.0 / 60.0);
        let held = j.impulse().z;
        assert!(held < 0.0, "z = {}", held);
        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        assert_eq!(j.limit_state(), LimitState::AtUpper);
        assert_eq!(j.impulse().z, held);

        b.rotation = crate::math::Rotation::new(0.1);
        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        assert_eq!(j.limit_state(), LimitState::Between);
        assert_eq!(j.impulse().z, 0.0);
    }

    #[test]
    fn test_limit_stops_rotation_past_lower_bound() {
        let (mut a, mut b) = pair();
        let mut j = RevoluteJoint::new(BodyId(0), BodyId(1), Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0))
            .with_limits(-0.25, 0.25)
            .unwrap();
        j.attach(&a, &b);
        b.rotation = crate::math::Rotation::new(-0.25);
        b.angular_velocity = -2.0;
        j.initialize(&mut a, &mut b, 1.0 / 60.0);
        for _ in 0..8 {
            j.apply_impulse(&mut a, &mut b, 1.0 / 60.0);
        }
        assert!(b.angular_velocity > -EPSILON, "w = {}", b.angular_velocity);
        assert!(j.impulse().z >= 0.0);
    }

    #[test]
    fn test_clone_box_keeps_state() {
        let j = RevoluteJoint::new(BodyId(2), BodyId(5), Vec2::ZERO, Vec2::ZERO);
        let boxed: Box<dyn Joint> = Box::new(j.clone());
        let copy = boxed.clone();
        assert_eq!(copy.body_a(), BodyId(2));
        assert_eq!(copy.as_any().downcast_ref::<RevoluteJoint>(), Some(&j));
    }
}
