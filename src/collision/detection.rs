//! Narrowphase: fills a manifold with the contact points of two shapes.

use super::manifold::{ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType};
use crate::math::{Transform, Vec2};
use crate::objects::RigidBody;
use crate::shapes::{Circle, Polygon, Shape};

/// Bias that keeps the reference face from flickering between nearly equal axes.
const REFERENCE_FACE_TOLERANCE: f64 = 0.0005;

/// Recomputes the contact points of `shape_a` against `shape_b`.
///
/// Leaves `manifold.points` empty when the shapes are apart. Impulses are not carried over
/// here; see [`Manifold::solve`].
pub fn collide(
    manifold: &mut Manifold,
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) {
    collide_within(manifold, shape_a, xf_a, shape_b, xf_b, 0.0);
}

/// Like [`collide`], but also reports points separated by up to `margin`.
pub(crate) fn collide_within(
    manifold: &mut Manifold,
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
    margin: f64,
) {
    manifold.points.clear();
    match (shape_a, shape_b) {
        (Shape::Polygon(a), Shape::Polygon(b)) => polygon_polygon(manifold, a, xf_a, b, xf_b, margin),
        (Shape::Circle(a), Shape::Circle(b)) => circle_circle(manifold, a, xf_a, b, xf_b, margin),
        (Shape::Circle(a), Shape::Polygon(b)) => circle_polygon(manifold, a, xf_a, b, xf_b, margin),
        (Shape::Polygon(a), Shape::Circle(b)) => polygon_circle(manifold, a, xf_a, b, xf_b, margin),
    }
}

/// Skin radius of a body's shape, zero for polygons and unknown indices.
pub(crate) fn shape_radius(body: &RigidBody, index: u32) -> f64 {
    body.shapes
        .get(index as usize)
        .map_or(0.0, Shape::radius)
}

/// Largest separation of `b` along the face normals of `a`, and the face that produced it.
/// Computed in `b`'s frame.
fn find_separating_axis(a: &Polygon, xf_a: &Transform, b: &Polygon, xf_b: &Transform) -> (usize, f64) {
    let mut best_index = 0;
    let mut best_distance = f64::MIN;
    for (i, (&vertex, &normal)) in a.vertices.iter().zip(&a.normals).enumerate() {
        let n = xf_b.rotation.apply_inverse(xf_a.rotation.apply(normal));
        let v = xf_b.apply_inverse(xf_a.apply(vertex));
        let s = b.vertices[b.support(-n)];
        let d = n.dot(s - v);
        if d > best_distance {
            best_distance = d;
            best_index = i;
        }
    }
    (best_index, best_distance)
}

/// The edge of `incident` most anti-parallel to face `index` of `reference`.
fn find_incident_edge(
    reference: &Polygon,
    xf_ref: &Transform,
    incident: &Polygon,
    xf_inc: &Transform,
    index: usize,
) -> [ManifoldPoint; 2] {
    let ref_normal = xf_inc
        .rotation
        .apply_inverse(xf_ref.rotation.apply(reference.normals[index]));

    let mut edge1 = 0;
    let mut min_dot = f64::MAX;
    for (i, normal) in incident.normals.iter().enumerate() {
        let d = ref_normal.dot(*normal);
        if d < min_dot {
            min_dot = d;
            edge1 = i;
        }
    }
    let edge2 = (edge1 + 1) % incident.vertices.len();

    let point = |edge: usize| {
        let local = incident.vertices[edge];
        ManifoldPoint::new(
            xf_inc.apply(local),
            local,
            ContactId::new(index, edge, FeatureType::Face, FeatureType::Vertex),
        )
    };
    [point(edge1), point(edge2)]
}

/// Sutherland-Hodgman clip of a segment against the half plane `normal . p <= offset`.
fn clip_segment(
    input: &[ManifoldPoint],
    normal: Vec2,
    offset: f64,
    index: usize,
) -> Vec<ManifoldPoint> {
    let mut output = Vec::with_capacity(2);
    let (p0, p1) = (input[0], input[1]);
    let d0 = normal.dot(p0.point) - offset;
    let d1 = normal.dot(p1.point) - offset;

    if d0 <= 0.0 {
        output.push(p0);
    }
    if d1 <= 0.0 {
        output.push(p1);
    }
    if d0 * d1 < 0.0 {
        let t = d0 / (d0 - d1);
        output.push(ManifoldPoint::new(
            p0.point.lerp(p1.point, t),
            p0.local_point.lerp(p1.local_point, t),
            ContactId::new(index, p0.id.index_b, FeatureType::Vertex, FeatureType::Face),
        ));
    }
    output
}

fn polygon_polygon(
    m: &mut Manifold,
    a: &Polygon,
    xf_a: &Transform,
    b: &Polygon,
    xf_b: &Transform,
    margin: f64,
) {
    let (edge_a, separation_a) = find_separating_axis(a, xf_a, b, xf_b);
    if separation_a > margin {
        return;
    }
    let (edge_b, separation_b) = find_separating_axis(b, xf_b, a, xf_a);
    if separation_b > margin {
        return;
    }

    // Prefer whichever face was the reference last step unless the other is clearly better.
    let use_b = if m.kind == Some(ManifoldType::FaceB) {
        separation_b + REFERENCE_FACE_TOLERANCE >= separation_a
    } else {
        separation_b > separation_a + REFERENCE_FACE_TOLERANCE
    };

    let (reference, xf_ref, incident, xf_inc, ref_index, flip) = if use_b {
        (b, xf_b, a, xf_a, edge_b, true)
    } else {
        (a, xf_a, b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(reference, xf_ref, incident, xf_inc, ref_index);

    let iv1 = ref_index;
    let iv2 = (iv1 + 1) % reference.vertices.len();
    let lv1 = reference.vertices[iv1];
    let lv2 = reference.vertices[iv2];

    let local_tangent = (lv2 - lv1).normalize();
    let local_normal = local_tangent.cross_scalar(1.0);
    let local_point = (lv1 + lv2) * 0.5;

    let tangent = xf_ref.rotation.apply(local_tangent);
    let normal = tangent.cross_scalar(1.0);
    let v1 = xf_ref.apply(lv1);
    let v2 = xf_ref.apply(lv2);

    let front_offset = normal.dot(v1);
    let side_offset1 = -tangent.dot(v1);
    let side_offset2 = tangent.dot(v2);

    let clip = clip_segment(&incident_edge, -tangent, side_offset1, iv1);
    if clip.len() < 2 {
        return;
    }
    let clip = clip_segment(&clip, tangent, side_offset2, iv2);
    if clip.len() < 2 {
        return;
    }

    for mut point in clip {
        if normal.dot(point.point) - front_offset <= margin {
            if flip {
                point.id.flip();
            }
            m.points.push(point);
        }
    }

    m.kind = Some(if flip { ManifoldType::FaceB } else { ManifoldType::FaceA });
    m.local_normal = local_normal;
    m.local_tangent = local_tangent;
    m.local_point = local_point;
    m.normal = if flip { -normal } else { normal };
    m.tangent = if flip { -tangent } else { tangent };
}

fn circle_circle(
    m: &mut Manifold,
    a: &Circle,
    xf_a: &Transform,
    b: &Circle,
    xf_b: &Transform,
    margin: f64,
) {
    let pa = xf_a.apply(a.center);
    let pb = xf_b.apply(b.center);
    let d = pb - pa;
    let reach = a.radius + b.radius + margin;
    if d.magnitude_squared() > reach * reach {
        return;
    }

    let normal = if d.magnitude_squared() > f64::EPSILON * f64::EPSILON {
        d.normalize()
    } else {
        Vec2::new(1.0, 0.0)
    };
    let surface_a = pa + normal * a.radius;
    let surface_b = pb - normal * b.radius;

    m.kind = Some(ManifoldType::Circles);
    m.local_point = a.center;
    m.local_normal = Vec2::ZERO;
    m.normal = normal;
    m.tangent = normal.cross_scalar(1.0);
    m.points.push(ManifoldPoint::new(
        (surface_a + surface_b) * 0.5,
        b.center,
        ContactId::new(0, 0, FeatureType::Vertex, FeatureType::Vertex),
    ));
}

/// Circle as shape A, polygon as shape B. The reference feature is always on the polygon.
fn circle_polygon(
    m: &mut Manifold,
    a: &Circle,
    xf_a: &Transform,
    b: &Polygon,
    xf_b: &Transform,
    margin: f64,
) {
    let world_center = xf_a.apply(a.center);
    let center = xf_b.apply_inverse(world_center);
    let count = b.vertices.len();
    let reach = a.radius + margin;

    let mut separation = f64::MIN;
    let mut i1 = 0;
    for (i, (&vertex, &normal)) in b.vertices.iter().zip(&b.normals).enumerate() {
        let s = normal.dot(center - vertex);
        if s > reach {
            return;
        }
        if s > separation {
            separation = s;
            i1 = i;
        }
    }
    let i2 = (i1 + 1) % count;
    let v1 = b.vertices[i1];
    let v2 = b.vertices[i2];

    let face_id = ContactId::new(0, i1, FeatureType::Vertex, FeatureType::Face);

    let (local_normal, local_point, id) = if separation < f64::EPSILON {
        // Center inside the polygon.
        (b.normals[i1], (v1 + v2) * 0.5, face_id)
    } else if (center - v1).dot(v2 - v1) <= 0.0 {
        if (center - v1).magnitude_squared() > reach * reach {
            return;
        }
        let id = ContactId::new(0, i1, FeatureType::Vertex, FeatureType::Vertex);
        ((center - v1).normalize(), v1, id)
    } else if (center - v2).dot(v1 - v2) <= 0.0 {
        if (center - v2).magnitude_squared() > reach * reach {
            return;
        }
        let id = ContactId::new(0, i2, FeatureType::Vertex, FeatureType::Vertex);
        ((center - v2).normalize(), v2, id)
    } else {
        let face_center = (v1 + v2) * 0.5;
        if (center - face_center).dot(b.normals[i1]) > reach {
            return;
        }
        (b.normals[i1], face_center, face_id)
    };

    let normal = -xf_b.rotation.apply(local_normal).normalize();

    m.kind = Some(ManifoldType::FaceB);
    m.local_normal = local_normal;
    m.local_point = local_point;
    m.local_tangent = local_normal.cross_scalar(1.0);
    m.normal = normal;
    m.tangent = normal.cross_scalar(1.0);
    m.points.push(ManifoldPoint::new(world_center + normal * a.radius, a.center, id));
}

/// Polygon as shape A, circle as shape B: the circle routine with the roles swapped back.
fn polygon_circle(
    m: &mut Manifold,
    a: &Polygon,
    xf_a: &Transform,
    b: &Circle,
    xf_b: &Transform,
    margin: f64,
) {
    circle_polygon(m, b, xf_b, a, xf_a, margin);
    if m.points.is_empty() {
        return;
    }
    m.kind = Some(ManifoldType::FaceA);
    m.normal = -m.normal;
    m.tangent = -m.tangent;
    for point in m.points.iter_mut() {
        point.id.flip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::broadphase::PairKey;
    use crate::objects::{BodyDef, BodyId, ShapeId};

    const EPSILON: f64 = 1e-9;

    fn manifold() -> Manifold {
        let body = BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(1.0))
            .build()
            .unwrap();
        let key = PairKey::new(ShapeId::new(BodyId(0), 0), ShapeId::new(BodyId(1), 0));
        Manifold::new(key, &body, &body)
    }

    fn at(x: f64, y: f64) -> Transform {
        Transform::new(Vec2::new(x, y), 0.0)
    }

    fn assert_unit(v: Vec2) {
        assert!((v.magnitude() - 1.0).abs() < EPSILON, "not unit: {:?}", v);
    }

    #[test]
    fn test_circle_circle_single_point() {
        let mut m = manifold();
        let c = Shape::Circle(Circle::new(1.0));
        collide(&mut m, &c, &at(0.0, 0.0), &c, &at(1.5, 0.0));
        assert_eq!(m.points.len(), 1);
        assert_eq!(m.kind, Some(ManifoldType::Circles));
        assert!((m.normal - Vec2::new(1.0, 0.0)).magnitude() < EPSILON);
        assert!((m.points[0].point - Vec2::new(0.75, 0.0)).magnitude() < EPSILON);
        assert!(m.normal.dot(m.tangent).abs() < EPSILON);

        collide(&mut m, &c, &at(0.0, 0.0), &c, &at(2.5, 0.0));
        assert!(m.points.is_empty());
    }

    #[test]
    fn test_coincident_circles_pick_a_normal() {
        let mut m = manifold();
        let c = Shape::Circle(Circle::new(0.5));
        collide(&mut m, &c, &at(1.0, 1.0), &c, &at(1.0, 1.0));
        assert_eq!(m.points.len(), 1);
        assert_unit(m.normal);
    }

    #[test]
    fn test_box_on_box_two_points() {
        let mut m = manifold();
        let ground = Shape::Polygon(Polygon::new_box(5.0, 0.5));
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        collide(&mut m, &ground, &at(0.0, 0.0), &cube, &at(0.3, 0.9));
        assert_eq!(m.points.len(), 2);
        assert_eq!(m.kind, Some(ManifoldType::FaceA));
        assert!((m.normal - Vec2::new(0.0, 1.0)).magnitude() < EPSILON);
        for p in &m.points {
            assert!((p.point.y - 0.4).abs() < EPSILON);
        }
        assert_ne!(m.points[0].id, m.points[1].id);
    }

    #[test]
    fn test_reference_on_b_flips_normal_and_ids() {
        let mut m = manifold();
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        let ground = Shape::Polygon(Polygon::new_box(5.0, 0.5));
        // Cube is A and sits on the ground, B. The ground face is the better reference.
        collide(&mut m, &cube, &at(0.3, 0.9), &ground, &at(0.0, 0.0));
        assert_eq!(m.points.len(), 2);
        assert!(m.normal.y < 0.0, "normal must point from A to B");
        assert_unit(m.normal);
        if m.kind == Some(ManifoldType::FaceB) {
            assert!(m.points.iter().all(|p| p.id.type_b == FeatureType::Face
                || p.id.type_a == FeatureType::Vertex));
        }
    }

    #[test]
    fn test_separated_polygons_have_no_points() {
        let mut m = manifold();
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        collide(&mut m, &cube, &at(0.0, 0.0), &cube, &at(1.2, 0.0));
        assert!(m.points.is_empty());
    }

    #[test]
    fn test_margin_reports_nearly_touching_shapes() {
        let mut m = manifold();
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        collide(&mut m, &cube, &at(0.0, 0.0), &cube, &at(1.0005, 0.0));
        assert!(m.points.is_empty());
        collide_within(&mut m, &cube, &at(0.0, 0.0), &cube, &at(1.0005, 0.0), 0.001);
        assert_eq!(m.points.len(), 2);

        let ball = Shape::Circle(Circle::new(0.5));
        collide_within(&mut m, &ball, &at(0.0, 0.0), &ball, &at(1.0005, 0.0), 0.001);
        assert_eq!(m.points.len(), 1);
    }

    #[test]
    fn test_rotated_box_corner_contact() {
        let mut m = manifold();
        let ground = Shape::Polygon(Polygon::new_box(5.0, 0.5));
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        let half_diag = 0.5 * 2f64.sqrt();
        let xf = Transform::new(Vec2::new(0.0, 0.5 + half_diag - 0.01), std::f64::consts::FRAC_PI_4);
        collide(&mut m, &ground, &at(0.0, 0.0), &cube, &xf);
        assert_eq!(m.points.len(), 1);
        assert!(m.points[0].point.x.abs() < 1e-6);
        assert!((m.normal - Vec2::new(0.0, 1.0)).magnitude() < EPSILON);
    }

    #[test]
    fn test_circle_on_polygon_face() {
        let mut m = manifold();
        let ball = Shape::Circle(Circle::new(0.5));
        let ground = Shape::Polygon(Polygon::new_box(5.0, 0.5));
        collide(&mut m, &ball, &at(1.0, 0.9), &ground, &at(0.0, 0.0));
        assert_eq!(m.points.len(), 1);
        assert_eq!(m.kind, Some(ManifoldType::FaceB));
        assert!((m.normal - Vec2::new(0.0, -1.0)).magnitude() < EPSILON);
        assert!((m.points[0].point - Vec2::new(1.0, 0.4)).magnitude() < EPSILON);
    }

    #[test]
    fn test_circle_polygon_vertex_region() {
        let mut m = manifold();
        let ball = Shape::Circle(Circle::new(0.5));
        let cube = Shape::Polygon(Polygon::new_box(0.5, 0.5));
        collide(&mut m, &ball, &at(0.8, 0.8), &cube, &at(0.0, 0.0));
        assert_eq!(m.points.len(), 1);
        assert_eq!(m.points[0].id.type_b, FeatureType::Vertex);
        let expected = -Vec2::new(1.0, 1.0).normalize();
        assert!((m.normal - expected).magnitude() < EPSILON);

        collide(&mut m, &ball, &at(1.0, 1.0), &cube, &at(0.0, 0.0));
        assert!(m.points.is_empty());
    }

    #[test]
    fn test_polygon_circle_mirrors_circle_polygon() {
        let mut m = manifold();
        let ball = Shape::Circle(Circle::new(0.5));
        let ground = Shape::Polygon(Polygon::new_box(5.0, 0.5));
        collide(&mut m, &ground, &at(0.0, 0.0), &ball, &at(1.0, 0.9));
        assert_eq!(m.points.len(), 1);
        assert_eq!(m.kind, Some(ManifoldType::FaceA));
        assert!((m.normal - Vec2::new(0.0, 1.0)).magnitude() < EPSILON);
        assert_eq!(m.points[0].id.type_a, FeatureType::Face);
    }
}
