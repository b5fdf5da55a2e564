use std::fmt;
use std::rc::Rc;

use super::manifold::Manifold;
use crate::math::Vec2;
use crate::objects::ShapeId;

/// Per-step report handed to a body's collision callback.
///
/// Each force is the one the receiving body's shape exerts on the other shape. Sensor
/// contacts report no forces.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactData {
    pub shape: ShapeId,
    pub other_shape: ShapeId,
    pub normal_forces: Vec<Vec2>,
    pub tangent_forces: Vec<Vec2>,
}

impl ContactData {
    /// `flipped` builds the report for the manifold's second shape.
    pub fn new(manifold: &Manifold, flipped: bool, dt: f64) -> Self {
        let (shape, other_shape) = if flipped {
            (manifold.key.1, manifold.key.0)
        } else {
            (manifold.key.0, manifold.key.1)
        };

        let mut data = Self {
            shape,
            other_shape,
            normal_forces: Vec::new(),
            tangent_forces: Vec::new(),
        };
        if manifold.sensor || dt <= 0.0 {
            return data;
        }

        let sign = if flipped { -1.0 } else { 1.0 };
        for point in &manifold.points {
            data.normal_forces
                .push(manifold.normal * (sign * point.normal_impulse / dt));
            data.tangent_forces
                .push(manifold.tangent * (sign * point.tangent_impulse / dt));
        }
        data
    }
}

/// Shared collision callback. Cloning a body or forking a world shares the closure.
#[derive(Clone)]
pub struct CollisionCallback(Rc<dyn Fn(&ContactData)>);

impl CollisionCallback {
    pub fn new(f: impl Fn(&ContactData) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, data: &ContactData) {
        (self.0)(data)
    }
}

impl fmt::Debug for CollisionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CollisionCallback")
    }
}
