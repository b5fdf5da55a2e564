use crate::math::{Rotation, Vec2};
use crate::objects::rigid_body::RigidBody;

/// Velocity half of semi-implicit Euler: applies gravity and the accumulated force/torque.
pub fn integrate_velocity(body: &mut RigidBody, gravity: Vec2, dt: f64) {
    if !body.is_active() {
        // Static or sleeping, do not integrate
        return;
    }

    // v = v + (g + F/m) * dt
    body.velocity += (gravity + body.force * body.inv_mass) * dt;
    // omega = omega + (T/I) * dt
    body.angular_velocity += body.torque * body.inv_inertia * dt;
}

/// Position half of semi-implicit Euler. Records the starting pose for interpolation and
/// continuous collision.
pub fn integrate_position(body: &mut RigidBody, dt: f64) {
    if !body.is_active() {
        return;
    }

    body.prev_position = body.position;
    body.prev_angle = body.angle();
    body.alpha0 = 0.0;

    body.position += body.velocity * dt;
    body.rotation = Rotation::new(body.angle() + body.angular_velocity * dt);
}

/// Moves a body to fraction `alpha` of the step along its recorded motion.
pub fn advance(body: &mut RigidBody, alpha: f64) {
    let mut sweep = body.sweep();
    sweep.advance(alpha);
    let xf = sweep.transform_at(0.0);
    body.prev_position = sweep.c0;
    body.prev_angle = sweep.a0;
    body.alpha0 = sweep.alpha0;
    body.position = xf.position;
    body.rotation = xf.rotation;
}

/// Integrates the unfinished part of the step, `(1 - alpha0) * dt`, from the current pose.
pub fn integrate_remaining(body: &mut RigidBody, dt: f64) {
    if !body.is_active() {
        return;
    }
    let h = (1.0 - body.alpha0) * dt;
    body.position += body.velocity * h;
    body.rotation = Rotation::new(body.angle() + body.angular_velocity * h);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::BodyDef;
    use crate::shapes::Circle;
    const EPSILON: f64 = 1e-9;

    // Helper to create a default body for tests
    fn ball() -> RigidBody {
        BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(1.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_integrate_linear_motion_no_force() {
        let mut rb = ball();
        rb.velocity = Vec2::new(10.0, -5.0);
        let dt = 0.1;

        integrate_velocity(&mut rb, Vec2::ZERO, dt);
        integrate_position(&mut rb, dt);

        assert!((rb.position.x - 1.0).abs() < EPSILON);
        assert!((rb.position.y - -0.5).abs() < EPSILON);
        assert_eq!(rb.velocity, Vec2::new(10.0, -5.0)); // Velocity unchanged
        assert_eq!(rb.prev_position, Vec2::ZERO);
    }

    #[test]
    fn test_integrate_constant_force_and_gravity() {
        let mut rb = ball();
        let mass = rb.mass;
        rb.apply_force(Vec2::new(10.0 * mass, 0.0));
        let dt = 0.1;

        integrate_velocity(&mut rb, Vec2::new(0.0, -10.0), dt);
        integrate_position(&mut rb, dt);

        // v = (10, -10) * 0.1
        assert!((rb.velocity.x - 1.0).abs() < EPSILON);
        assert!((rb.velocity.y - -1.0).abs() < EPSILON);
        // p = v * dt
        assert!((rb.position.x - 0.1).abs() < EPSILON);
        assert!((rb.position.y - -0.1).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_angular_motion_constant_torque() {
        let mut rb = ball();
        let inertia = rb.inertia;
        rb.torque = 5.0;
        let expected_alpha = 5.0 / inertia;
        let dt = 0.1;

        integrate_velocity(&mut rb, Vec2::ZERO, dt);
        integrate_position(&mut rb, dt);

        assert!((rb.angular_velocity - expected_alpha * dt).abs() < EPSILON);
        assert!((rb.angle() - expected_alpha * dt * dt).abs() < EPSILON);
    }

    #[test]
    fn test_integrate_static_and_sleeping_bodies() {
        let mut rb = BodyDef::new(Vec2::new(1.0, 1.0))
            .with_shape(Circle::new(1.0))
            .fixed()
            .build()
            .unwrap();
        let initial = rb.clone();
        integrate_velocity(&mut rb, Vec2::new(0.0, -10.0), 0.1);
        integrate_position(&mut rb, 0.1);
        assert_eq!(rb.position, initial.position);
        assert_eq!(rb.velocity, Vec2::ZERO);

        let mut sleeper = ball();
        sleeper.sleep();
        integrate_velocity(&mut sleeper, Vec2::new(0.0, -10.0), 0.1);
        assert_eq!(sleeper.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_advance_and_finish_step() {
        let mut rb = ball();
        rb.velocity = Vec2::new(10.0, 0.0);
        integrate_position(&mut rb, 0.1);
        assert!((rb.position.x - 1.0).abs() < EPSILON);

        advance(&mut rb, 0.25);
        assert!((rb.position.x - 0.25).abs() < EPSILON);
        assert!((rb.alpha0 - 0.25).abs() < EPSILON);

        integrate_remaining(&mut rb, 0.1);
        assert!((rb.position.x - 1.0).abs() < EPSILON);
    }
}
