use std::any::Any;
use std::f64::consts::PI;

use super::{nudge, Joint, JointAnchors};
use crate::math::Vec2;
use crate::objects::{BodyId, RigidBody};

/// Suspension joint: B's anchor slides along an axis fixed in A, held by an optional spring,
/// and B spins freely or under a torque-limited motor.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelJoint {
    anchors: JointAnchors,
    /// Suspension axis in A's frame.
    local_axis: Vec2,
    frequency: f64,
    damping: f64,

    motor_enabled: bool,
    motor_speed: f64,
    max_motor_torque: f64,

    ax: Vec2,
    ay: Vec2,
    s_ax: f64,
    s_bx: f64,
    s_ay: f64,
    s_by: f64,

    impulse: f64,
    spring_impulse: f64,
    motor_impulse: f64,
    mass: f64,
    spring_mass: f64,
    motor_mass: f64,
    bias: f64,
    gamma: f64,
}

impl WheelJoint {
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
        axis: Vec2,
        frequency: f64,
        damping: f64,
    ) -> Self {
        Self {
            anchors: JointAnchors::new(body_a, body_b, anchor_a, anchor_b),
            local_axis: axis.normalize(),
            frequency: frequency.max(0.0),
            damping: damping.max(0.0),
            motor_enabled: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            ax: Vec2::ZERO,
            ay: Vec2::ZERO,
            s_ax: 0.0,
            s_bx: 0.0,
            s_ay: 0.0,
            s_by: 0.0,
            impulse: 0.0,
            spring_impulse: 0.0,
            motor_impulse: 0.0,
            mass: 0.0,
            spring_mass: 0.0,
            motor_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
        }
    }

    /// Drives B's spin relative to A toward `speed` (rad/s) with at most `max_torque`.
    pub fn set_motor(&mut self, speed: f64, max_torque: f64) {
        self.motor_enabled = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque.abs();
    }

    pub fn disable_motor(&mut self) {
        self.motor_enabled = false;
        self.motor_speed = 0.0;
        self.max_motor_torque = 0.0;
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    pub fn motor_speed(&self) -> f64 {
        self.motor_speed
    }

    pub fn max_motor_torque(&self) -> f64 {
        self.max_motor_torque
    }

    pub fn motor_impulse(&self) -> f64 {
        self.motor_impulse
    }

    pub fn set_spring(&mut self, frequency: f64, damping: f64) {
        self.frequency = frequency.max(0.0);
        self.damping = damping.max(0.0);
    }

    pub fn axis(&self) -> Vec2 {
        self.local_axis
    }

    pub fn anchors(&self) -> &JointAnchors {
        &self.anchors
    }

    /// Perpendicular of the axis, in world space.
    fn perpendicular(&self, a: &RigidBody) -> Vec2 {
        a.rotation.apply(Vec2::scalar_cross(1.0, self.local_axis))
    }
}

impl Joint for WheelJoint {
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
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
        let d = self.anchors.offset(a, b);

        self.ay = self.perpendicular(a);
        self.s_ay = (d + ra).cross(self.ay);
        self.s_by = rb.cross(self.ay);
        let k = ma + mb + ia * self.s_ay * self.s_ay + ib * self.s_by * self.s_by;
        self.mass = if k > 0.0 { 1.0 / k } else { 0.0 };

        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;
        if self.frequency > 0.0 {
            self.ax = a.rotation.apply(self.local_axis);
            self.s_ax = (d + ra).cross(self.ax);
            self.s_bx = rb.cross(self.ax);
            let inv_mass = ma + mb + ia * self.s_ax * self.s_ax + ib * self.s_bx * self.s_bx;

            if inv_mass > 0.0 {
                let spring_mass = 1.0 / inv_mass;
                let c = d.dot(self.ax);
                let omega = 2.0 * PI * self.frequency;
                let damping = 2.0 * spring_mass * self.damping * omega;
                let stiffness = spring_mass * omega * omega;

                let gamma = dt * (damping + dt * stiffness);
                self.gamma = if gamma > 0.0 { 1.0 / gamma } else { 0.0 };
                self.bias = c * dt * stiffness * self.gamma;

                let softened = inv_mass + self.gamma;
                self.spring_mass = if softened > 0.0 { 1.0 / softened } else { 0.0 };
            }
        } else {
            self.ax = Vec2::ZERO;
            self.s_ax = 0.0;
            self.s_bx = 0.0;
            self.spring_impulse = 0.0;
        }

        if self.motor_enabled {
            self.motor_mass = if ia + ib > 0.0 { 1.0 / (ia + ib) } else { 0.0 };
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        let p = self.ay * self.impulse + self.ax * self.spring_impulse;
        let la = self.s_ay * self.impulse + self.s_ax * self.spring_impulse + self.motor_impulse;
        let lb = self.s_by * self.impulse + self.s_bx * self.spring_impulse + self.motor_impulse;
        a.velocity -= p * ma;
        a.angular_velocity -= ia * la;
        b.velocity += p * mb;
        b.angular_velocity += ib * lb;
    }

    fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody, dt: f64) {
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);

        // Spring along the axis.
        {
            let cdot = self.ax.dot(b.velocity - a.velocity) + self.s_bx * b.angular_velocity
                - self.s_ax * a.angular_velocity;
            let impulse = -(cdot + self.bias + self.gamma * self.spring_impulse) * self.spring_mass;
            self.spring_impulse += impulse;

            let p = self.ax * impulse;
            a.velocity -= p * ma;
            a.angular_velocity -= ia * impulse * self.s_ax;
            b.velocity += p * mb;
            b.angular_velocity += ib * impulse * self.s_bx;
        }

        // Motor.
        {
            let cdot = b.angular_velocity - a.angular_velocity - self.motor_speed;
            let max_impulse = dt * self.max_motor_torque;
            let old = self.motor_impulse;
            self.motor_impulse =
                (self.motor_impulse - self.motor_mass * cdot).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;

            a.angular_velocity -= ia * impulse;
            b.angular_velocity += ib * impulse;
        }

        // Rigid perpendicular constraint.
        {
            let cdot = self.ay.dot(b.velocity - a.velocity) + self.s_by * b.angular_velocity
                - self.s_ay * a.angular_velocity;
            let impulse = -self.mass * cdot;
            self.impulse += impulse;

            let p = self.ay * impulse;
            a.velocity -= p * ma;
            a.angular_velocity -= ia * impulse * self.s_ay;
            b.velocity += p * mb;
            b.angular_velocity += ib * impulse * self.s_by;
        }
    }

    fn positional_correction(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        let (ra, rb) = self.anchors.arms(a, b);
        let (ma, mb, ia, ib) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
        let d = self.anchors.offset(a, b);

        let ay = self.perpendicular(a);
        let s_ay = (d + ra).cross(ay);
        let s_by = rb.cross(ay);

        let c = d.dot(ay);
        let k = ma + mb + ia * s_ay * s_ay + ib * s_by * s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = ay * impulse;
        nudge(a, -p * ma, -ia * impulse * s_ay);
        nudge(b, p * mb, ib * impulse * s_by);
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
