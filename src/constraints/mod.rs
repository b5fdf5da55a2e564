use std::any::Any;
use std::fmt;

use crate::common::Arena;
use crate::math::{Rotation, Vec2};
use crate::objects::{BodyId, RigidBody};

pub mod revolute;
pub mod rope;
pub mod spring;
pub mod wheel;

// Re-export the joint types for easier access
pub use revolute::{LimitState, RevoluteJoint};
pub use rope::RopeJoint;
pub use spring::SpringJoint;
pub use wheel::WheelJoint;

/// Handle of a joint inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(pub(crate) usize);

impl JointId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint #{}", self.0)
    }
}

/// A constraint between two bodies, solved alongside contacts.
///
/// Body A is always passed first. `initialize` runs once per step and applies the
/// accumulated impulse of the previous step. `apply_impulse` runs once per velocity
/// iteration and must tolerate any number of calls. `positional_correction` runs once per
/// position iteration.
pub trait Joint: fmt::Debug {
    fn body_a(&self) -> BodyId;

    fn body_b(&self) -> BodyId;

    /// Rebases the anchors onto the bodies' centers of mass. Called once when the joint is
    /// added to a world.
    fn attach(&mut self, a: &RigidBody, b: &RigidBody);

    fn initialize(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64);

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64);

    fn positional_correction(&mut self, a: &mut RigidBody, b: &mut RigidBody);

    fn clone_box(&self) -> Box<dyn Joint>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn Joint> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Bodies and anchor points shared by every joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAnchors {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Anchor on A, in A's frame. Relative to the body origin until attached, then to its
    /// center of mass.
    pub local_a: Vec2,
    pub local_b: Vec2,
    attached: bool,
}

impl JointAnchors {
    pub fn new(body_a: BodyId, body_b: BodyId, local_a: Vec2, local_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_a,
            local_b,
            attached: false,
        }
    }

    pub fn attach(&mut self, a: &RigidBody, b: &RigidBody) {
        if self.attached {
            return;
        }
        self.local_a -= a.local_center;
        self.local_b -= b.local_center;
        self.attached = true;
    }

    /// World-space lever arms from each center of mass to its anchor.
    pub fn arms(&self, a: &RigidBody, b: &RigidBody) -> (Vec2, Vec2) {
        (a.rotation.apply(self.local_a), b.rotation.apply(self.local_b))
    }

    /// Separation of the anchors, from A's to B's.
    pub fn offset(&self, a: &RigidBody, b: &RigidBody) -> Vec2 {
        let (ra, rb) = self.arms(a, b);
        b.position + rb - a.position - ra
    }
}

/// Velocity of an anchor point with lever arm `r`.
pub(crate) fn point_velocity(body: &RigidBody, r: Vec2) -> Vec2 {
    body.velocity + Vec2::scalar_cross(body.angular_velocity, r)
}

/// Moves a body's center and angle during position correction.
pub(crate) fn nudge(body: &mut RigidBody, linear: Vec2, angular: f64) {
    if !body.is_dynamic() {
        return;
    }
    body.position += linear;
    body.rotation = Rotation::new(body.angle() + angular);
}

/// Mutable references to a joint's two bodies. None when either is gone or they coincide.
pub(crate) fn get_mutable_body_pair(
    bodies: &mut Arena<RigidBody>,
    a: BodyId,
    b: BodyId,
) -> Option<(&mut RigidBody, &mut RigidBody)> {
    bodies.pair_mut(a.0, b.0)
}
