pub mod circle;
pub mod mass;
pub mod polygon;

pub use circle::Circle;
pub use mass::MassData;
pub use polygon::Polygon;

use crate::collision::raycast::{RayCastInput, RayCastOutput};
use crate::collision::AABB;
use crate::math::{Transform, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShapeKind {
    Circle,
    Polygon,
}

/// Collision geometry attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::Polygon(_) => ShapeKind::Polygon,
        }
    }

    /// Skin radius used by distance queries. Polygons have none.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(_) => 0.0,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        match self {
            Shape::Circle(c) => c.compute_aabb(xf),
            Shape::Polygon(p) => p.compute_aabb(xf),
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => c.compute_mass(density),
            Shape::Polygon(p) => p.compute_mass(density),
        }
    }

    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => c.raycast(input, xf),
            Shape::Polygon(p) => p.raycast(input, xf),
        }
    }

    /// Vertices seen by GJK. A circle is its center point.
    pub fn vertex_count(&self) -> usize {
        match self {
            Shape::Circle(_) => 1,
            Shape::Polygon(p) => p.vertices.len(),
        }
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        match self {
            Shape::Circle(c) => c.center,
            Shape::Polygon(p) => p.vertices[index],
        }
    }

    /// Index of the support vertex along a body-space direction.
    pub fn support(&self, direction: Vec2) -> usize {
        match self {
            Shape::Circle(_) => 0,
            Shape::Polygon(p) => p.support(direction),
        }
    }

    /// Shifts the geometry so `offset` becomes the new origin.
    pub(crate) fn recenter(&mut self, offset: Vec2) {
        match self {
            Shape::Circle(c) => c.recenter(offset),
            Shape::Polygon(p) => p.recenter(offset),
        }
    }
}

impl From<Circle> for Shape {
    fn from(circle: Circle) -> Self {
        Shape::Circle(circle)
    }
}

impl From<Polygon> for Shape {
    fn from(polygon: Polygon) -> Self {
        Shape::Polygon(polygon)
    }
}
