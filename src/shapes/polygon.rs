use super::mass::MassData;
use crate::collision::raycast::{RayCastInput, RayCastOutput};
use crate::collision::AABB;
use crate::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

const INV3: f64 = 1.0 / 3.0;

/// A convex polygon with counter-clockwise vertices in body space.
///
/// `normals[i]` is the outward normal of the edge `vertices[i] -> vertices[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Vec2>,
    pub normals: Vec<Vec2>,
}

impl Polygon {
    /// Builds the convex hull of `points`.
    ///
    /// Interior points are dropped and the winding is made counter-clockwise, so any
    /// ordering of the input is accepted.
    pub fn new(points: &[Vec2]) -> Result<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::TooFewVertices(points.len()));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::degenerate_polygon("non-finite vertex"));
        }

        // Gift wrapping from the rightmost (then lowest) point.
        let mut rightmost = 0;
        for (i, p) in points.iter().enumerate().skip(1) {
            let best = points[rightmost];
            if p.x > best.x || (p.x == best.x && p.y < best.y) {
                rightmost = i;
            }
        }

        let mut hull = Vec::with_capacity(points.len());
        let mut index = rightmost;
        loop {
            if hull.len() > points.len() {
                return Err(PhysicsError::degenerate_polygon("hull did not close"));
            }
            hull.push(index);

            let mut next = 0;
            for i in 1..points.len() {
                if next == index {
                    next = i;
                    continue;
                }
                let e1 = points[next] - points[index];
                let e2 = points[i] - points[index];
                let c = e1.cross(e2);
                if c < 0.0 || (c == 0.0 && e2.magnitude_squared() > e1.magnitude_squared()) {
                    next = i;
                }
            }
            index = next;
            if next == rightmost {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(PhysicsError::degenerate_polygon("collinear points"));
        }

        let vertices: Vec<Vec2> = hull.into_iter().map(|i| points[i]).collect();
        let polygon = Self::from_hull(vertices);
        if polygon.area() <= f64::EPSILON {
            return Err(PhysicsError::degenerate_polygon("zero area"));
        }
        Ok(polygon)
    }

    /// Axis-aligned box centered on the body origin.
    pub fn new_box(half_width: f64, half_height: f64) -> Self {
        Self {
            vertices: vec![
                Vec2::new(-half_width, -half_height),
                Vec2::new(half_width, -half_height),
                Vec2::new(half_width, half_height),
                Vec2::new(-half_width, half_height),
            ],
            normals: vec![
                Vec2::new(0.0, -1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(-1.0, 0.0),
            ],
        }
    }

    /// Box placed at `center` in body space and rotated by `angle`.
    pub fn new_oriented_box(half_width: f64, half_height: f64, center: Vec2, angle: f64) -> Self {
        let xf = Transform::new(center, angle);
        let mut polygon = Self::new_box(half_width, half_height);
        for v in polygon.vertices.iter_mut() {
            *v = xf.apply(*v);
        }
        for n in polygon.normals.iter_mut() {
            *n = xf.rotation.apply(*n);
        }
        polygon
    }

    fn from_hull(vertices: Vec<Vec2>) -> Self {
        let n = vertices.len();
        let normals = (0..n)
            .map(|i| {
                let edge = vertices[(i + 1) % n] - vertices[i];
                Vec2::new(edge.y, -edge.x).normalize()
            })
            .collect();
        Self { vertices, normals }
    }

    /// Signed area, positive for counter-clockwise winding.
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| self.vertices[i].cross(self.vertices[(i + 1) % n]))
            .sum::<f64>()
            * 0.5
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let world: Vec<Vec2> = self.vertices.iter().map(|v| xf.apply(*v)).collect();
        AABB::from_points(&world).unwrap_or_else(|| AABB::new(xf.position, xf.position))
    }

    /// Mass, centroid and rotational inertia about the body origin, from a triangle fan.
    pub fn compute_mass(&self, density: f64) -> MassData {
        let n = self.vertices.len();
        let mut area = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;

        for i in 0..n {
            let p1 = self.vertices[i];
            let p2 = self.vertices[(i + 1) % n];
            let d = p1.cross(p2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (p1 + p2) * (triangle_area * INV3);

            let intx2 = p1.x * p1.x + p2.x * p2.x + p1.x * p2.x;
            let inty2 = p1.y * p1.y + p2.y * p2.y + p1.y * p2.y;
            inertia += 0.25 * INV3 * d * (intx2 + inty2);
        }

        if area > f64::EPSILON {
            center = center * (1.0 / area);
        }

        MassData {
            mass: density * area,
            center,
            inertia: density * inertia,
        }
    }

    /// Index of the vertex furthest along `direction` (body space).
    pub fn support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_projection = f64::NEG_INFINITY;
        for (i, v) in self.vertices.iter().enumerate() {
            let projection = v.dot(direction);
            if projection > best_projection {
                best_projection = projection;
                best = i;
            }
        }
        best
    }

    /// Clips the segment against every edge plane in body space.
    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (vertex, normal) in self.vertices.iter().zip(&self.normals) {
            let numerator = normal.dot(*vertex - p1);
            let denominator = normal.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                lower = numerator / denominator;
                index = Some(normal);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|normal| RayCastOutput {
            fraction: lower,
            normal: xf.rotation.apply(*normal),
        })
    }

    pub(crate) fn recenter(&mut self, offset: Vec2) {
        for v in self.vertices.iter_mut() {
            *v -= offset;
        }
    }
}
