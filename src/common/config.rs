//! Solver tuning knobs.

use crate::math::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of a [`PhysicsWorld`](crate::world::PhysicsWorld).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Acceleration applied to every awake dynamic body.
    pub gravity: Vec2,
    /// Sequential-impulse passes per island per step.
    pub velocity_iterations: usize,
    /// Position-correction passes per island per step.
    pub position_iterations: usize,
    /// Whether resting islands are put to sleep.
    pub allow_sleep: bool,
    /// Linear speed under which a body counts as resting.
    pub linear_sleep_tolerance: f64,
    /// Angular speed under which a body counts as resting.
    pub angular_sleep_tolerance: f64,
    /// Resting time after which an island falls asleep.
    pub time_to_sleep: f64,
    /// Enables the time-of-impact pass after the discrete solve.
    pub continuous_collision: bool,
    /// Pairs whose relative speed is below this are left to the discrete solver.
    pub toi_min_relative_speed: f64,
    /// Upper bound on time-of-impact events handled in one step.
    pub max_toi_events: usize,
    /// Upper bound on time-of-impact events per manifold in one step.
    pub max_toi_per_pair: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.8),
            velocity_iterations: 8,
            position_iterations: 3,
            allow_sleep: true,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0_f64.to_radians(),
            time_to_sleep: 0.5,
            continuous_collision: true,
            toi_min_relative_speed: 1.0,
            max_toi_events: 64,
            max_toi_per_pair: 8,
        }
    }
}

impl WorldConfig {
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, velocity: usize, position: usize) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    #[must_use]
    pub fn with_sleep(mut self, allow_sleep: bool) -> Self {
        self.allow_sleep = allow_sleep;
        self
    }

    #[must_use]
    pub fn with_continuous_collision(mut self, enabled: bool) -> Self {
        self.continuous_collision = enabled;
        self
    }

    /// Zero gravity, everything else default.
    #[must_use]
    pub fn zero_gravity() -> Self {
        Self::default().with_gravity(Vec2::ZERO)
    }
}
