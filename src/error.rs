//! Error types for world construction and editing.

use thiserror::Error;

/// Construction-time failures. Numerical trouble during a step is never reported here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A polygon needs at least three points.
    #[error("polygon needs at least 3 points, got {0}")]
    TooFewVertices(usize),

    /// All points were collinear or coincident.
    #[error("polygon points are degenerate: {0}")]
    DegeneratePolygon(String),

    /// Filter groups are 0 (collide with nothing) or 1 to 32.
    #[error("filter group {0} is out of bounds (0 - 32)")]
    FilterGroupOutOfRange(u32),

    /// Exclusion entries name groups 2 to 32.
    #[error("exclusion group {0} is out of bounds (2 - 32)")]
    ExclusionGroupOutOfRange(u32),

    /// Joint angle limits must lie in [-pi, pi] with lower <= upper.
    #[error("invalid joint limits: {0}")]
    InvalidJointLimits(String),

    /// The referenced body does not exist.
    #[error("body not found: {0}")]
    BodyNotFound(String),

    /// The referenced joint does not exist.
    #[error("joint not found: {0}")]
    JointNotFound(String),

    /// A joint must connect two different bodies.
    #[error("joint connects body {0} to itself")]
    SelfJoint(String),
}

impl PhysicsError {
    pub fn degenerate_polygon(msg: impl Into<String>) -> Self {
        Self::DegeneratePolygon(msg.into())
    }

    pub fn invalid_joint_limits(msg: impl Into<String>) -> Self {
        Self::InvalidJointLimits(msg.into())
    }

    pub fn body_not_found(id: impl std::fmt::Display) -> Self {
        Self::BodyNotFound(id.to_string())
    }

    pub fn joint_not_found(id: impl std::fmt::Display) -> Self {
        Self::JointNotFound(id.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
