use super::broadphase::PairKey;
use super::detection;
use crate::common::Material;
use crate::math::{Mat2, Rotation, Transform, Vec2};
use crate::objects::RigidBody;

/// Position correction gain.
const BAUMGARTE: f64 = 0.2;
/// Allowed penetration left alone by position correction.
pub const LINEAR_SLOP: f64 = 0.005;
/// Largest position step a single correction may take.
const MAX_CORRECTION: f64 = 0.2;
/// Closing speed under which restitution is ignored.
const VELOCITY_THRESHOLD: f64 = 1.0;
/// Two-point manifolds whose mass matrix is worse conditioned than this drop a point.
const MAX_CONDITION: f64 = 1000.0;

/// Frame the stored local contact data is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldType {
    /// `local_point` is circle A's center, each point's `local_point` circle B's center.
    Circles,
    /// Reference face on shape A, points stored in B's frame.
    FaceA,
    /// Reference face on shape B, points stored in A's frame.
    FaceB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Face,
    Vertex,
}

/// Which features of the two shapes produced a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactId {
    pub index_a: usize,
    pub index_b: usize,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactId {
    pub fn new(index_a: usize, index_b: usize, type_a: FeatureType, type_b: FeatureType) -> Self {
        Self {
            index_a,
            index_b,
            type_a,
            type_b,
        }
    }

    pub fn flip(&mut self) {
        std::mem::swap(&mut self.index_a, &mut self.index_b);
        std::mem::swap(&mut self.type_a, &mut self.type_b);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    /// World position when the narrowphase ran.
    pub point: Vec2,
    /// Position in the frame of the incident shape's body.
    pub local_point: Vec2,
    pub id: ContactId,
    pub bias: f64,
    pub normal_impulse: f64,
    pub tangent_impulse: f64,
    pub normal_mass: f64,
    pub tangent_mass: f64,
}

impl ManifoldPoint {
    pub fn new(point: Vec2, local_point: Vec2, id: ContactId) -> Self {
        Self {
            point,
            local_point,
            id,
            bias: 0.0,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            normal_mass: 0.0,
            tangent_mass: 0.0,
        }
    }

    /// Takes over the accumulated impulses of a matching point from the previous step.
    pub fn absorb(&mut self, other: &ManifoldPoint) {
        self.normal_impulse = other.normal_impulse;
        self.tangent_impulse = other.tangent_impulse;
    }
}

/// Persistent contact state of one shape pair.
///
/// `normal` points from shape A to shape B. Body A owns `key.0`, body B owns `key.1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    pub key: PairKey,
    pub kind: Option<ManifoldType>,
    pub points: Vec<ManifoldPoint>,
    pub normal: Vec2,
    pub tangent: Vec2,
    pub local_point: Vec2,
    pub local_normal: Vec2,
    pub local_tangent: Vec2,
    pub restitution: f64,
    pub friction: f64,
    pub sensor: bool,
    k: Mat2,
    normal_mass: Mat2,
}

impl Manifold {
    pub fn new(key: PairKey, a: &RigidBody, b: &RigidBody) -> Self {
        Self {
            key,
            kind: None,
            points: Vec::with_capacity(2),
            normal: Vec2::ZERO,
            tangent: Vec2::ZERO,
            local_point: Vec2::ZERO,
            local_normal: Vec2::ZERO,
            local_tangent: Vec2::ZERO,
            restitution: Material::mix_restitution(&a.material, &b.material),
            friction: Material::mix_friction(&a.material, &b.material),
            sensor: a.sensor || b.sensor,
            k: Mat2::ZERO,
            normal_mass: Mat2::ZERO,
        }
    }

    /// Has contact points this step, sensor or not.
    pub fn is_touching(&self) -> bool {
        !self.points.is_empty()
    }

    /// Touching and subject to impulse and position solving.
    pub fn is_collided(&self) -> bool {
        !self.sensor && self.is_touching()
    }

    /// Reruns the narrowphase for the pair.
    ///
    /// With `update_feature_ids` new points inherit the impulses of previous points with the
    /// same feature ids. Without it every point starts cold.
    pub fn solve(&mut self, update_feature_ids: bool, a: &RigidBody, b: &RigidBody) {
        self.solve_within(update_feature_ids, a, b, 0.0);
    }

    /// [`Manifold::solve`] that also keeps points up to `margin` apart. Used to confirm a
    /// time-of-impact pose, where the shapes sit just short of touching.
    pub(crate) fn solve_within(
        &mut self,
        update_feature_ids: bool,
        a: &RigidBody,
        b: &RigidBody,
        margin: f64,
    ) {
        let old_points = std::mem::take(&mut self.points);

        let ia = self.key.0.index as usize;
        let ib = self.key.1.index as usize;
        let (Some(shape_a), Some(shape_b)) = (a.shapes.get(ia), b.shapes.get(ib)) else {
            return;
        };
        let overlapping = match (a.aabbs.get(ia), b.aabbs.get(ib)) {
            (Some(box_a), Some(box_b)) => box_a.fatten(margin).overlaps(box_b),
            _ => false,
        };
        if !overlapping {
            return;
        }

        detection::collide_within(self, shape_a, &a.transform(), shape_b, &b.transform(), margin);

        if update_feature_ids {
            for point in self.points.iter_mut() {
                if let Some(old) = old_points.iter().find(|old| old.id == point.id) {
                    point.absorb(old);
                }
            }
        }
    }

    /// Effective masses and restitution bias for the coming velocity iterations.
    pub fn initialize(&mut self, a: &RigidBody, b: &RigidBody) {
        if !self.is_collided() {
            return;
        }

        let (ma, ia, mb, ib) = (a.inv_mass, a.inv_inertia, b.inv_mass, b.inv_inertia);
        let normal = self.normal;
        let tangent = self.tangent;

        for point in self.points.iter_mut() {
            let ra = point.point - a.position;
            let rb = point.point - b.position;

            let rna = ra.cross(normal);
            let rnb = rb.cross(normal);
            let kn = ma + mb + ia * rna * rna + ib * rnb * rnb;
            point.normal_mass = if kn > 0.0 { 1.0 / kn } else { 0.0 };

            let rta = ra.cross(tangent);
            let rtb = rb.cross(tangent);
            let kt = ma + mb + ia * rta * rta + ib * rtb * rtb;
            point.tangent_mass = if kt > 0.0 { 1.0 / kt } else { 0.0 };

            let dv = b.velocity + Vec2::scalar_cross(b.angular_velocity, rb)
                - a.velocity
                - Vec2::scalar_cross(a.angular_velocity, ra);
            let v_rel = normal.dot(dv);
            point.bias = if v_rel < -VELOCITY_THRESHOLD {
                -self.restitution * v_rel
            } else {
                0.0
            };
        }

        if self.points.len() == 2 {
            let ra0 = self.points[0].point - a.position;
            let rb0 = self.points[0].point - b.position;
            let ra1 = self.points[1].point - a.position;
            let rb1 = self.points[1].point - b.position;

            let rn0a = ra0.cross(normal);
            let rn0b = rb0.cross(normal);
            let rn1a = ra1.cross(normal);
            let rn1b = rb1.cross(normal);

            let k11 = ma + mb + ia * rn0a * rn0a + ib * rn0b * rn0b;
            let k22 = ma + mb + ia * rn1a * rn1a + ib * rn1b * rn1b;
            let k12 = ma + mb + ia * rn0a * rn1a + ib * rn0b * rn1b;

            if k11 * k11 < MAX_CONDITION * (k11 * k22 - k12 * k12) {
                self.k = Mat2::new(k11, k12, k12, k22);
                self.normal_mass = self.k.inverse();
            } else {
                // Nearly redundant points: keep the first.
                self.points.truncate(1);
            }
        }
    }

    /// Applies last step's accumulated impulses.
    pub fn warm_start(&self, a: &mut RigidBody, b: &mut RigidBody) {
        if !self.is_collided() {
            return;
        }
        for point in &self.points {
            let p = self.normal * point.normal_impulse + self.tangent * point.tangent_impulse;
            a.apply_impulse(-p, point.point - a.position);
            b.apply_impulse(p, point.point - b.position);
        }
    }

    /// One sequential-impulse pass: friction first, then the normal constraint.
    pub fn apply_impulse(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        if !self.is_collided() {
            return;
        }

        let normal = self.normal;
        let tangent = self.tangent;

        for point in self.points.iter_mut() {
            let ra = point.point - a.position;
            let rb = point.point - b.position;
            let dv = relative_velocity(a, b, ra, rb);

            let vt = dv.dot(tangent);
            let max_friction = self.friction * point.normal_impulse;
            let new_impulse = (point.tangent_impulse - point.tangent_mass * vt)
                .clamp(-max_friction, max_friction);
            let lambda = new_impulse - point.tangent_impulse;
            point.tangent_impulse = new_impulse;

            let p = tangent * lambda;
            a.apply_impulse(-p, ra);
            b.apply_impulse(p, rb);
        }

        if self.points.len() == 1 {
            let point = &mut self.points[0];
            let ra = point.point - a.position;
            let rb = point.point - b.position;
            let vn = relative_velocity(a, b, ra, rb).dot(normal);

            let new_impulse = (point.normal_impulse - point.normal_mass * (vn - point.bias)).max(0.0);
            let lambda = new_impulse - point.normal_impulse;
            point.normal_impulse = new_impulse;

            let p = normal * lambda;
            a.apply_impulse(-p, ra);
            b.apply_impulse(p, rb);
        } else if self.points.len() == 2 {
            self.solve_block(a, b);
        }
    }

    /// Two-point normal solve as a linear complementarity problem, trying the four
    /// active-set cases in turn.
    fn solve_block(&mut self, a: &mut RigidBody, b: &mut RigidBody) {
        let normal = self.normal;
        let (p0, p1) = (self.points[0], self.points[1]);
        let ra0 = p0.point - a.position;
        let rb0 = p0.point - b.position;
        let ra1 = p1.point - a.position;
        let rb1 = p1.point - b.position;

        let old = Vec2::new(p0.normal_impulse, p1.normal_impulse);
        let vn0 = relative_velocity(a, b, ra0, rb0).dot(normal);
        let vn1 = relative_velocity(a, b, ra1, rb1).dot(normal);
        let rhs = Vec2::new(vn0 - p0.bias, vn1 - p1.bias) - self.k.mul_vec(old);

        let solution = {
            // Both points active.
            let x = -self.normal_mass.mul_vec(rhs);
            if x.x >= 0.0 && x.y >= 0.0 {
                Some(x)
            } else {
                None
            }
        }
        .or_else(|| {
            // Only the first point active.
            let x = Vec2::new(-p0.normal_mass * rhs.x, 0.0);
            let vn1 = self.k.m10 * x.x + rhs.y;
            (x.x >= 0.0 && vn1 >= 0.0).then_some(x)
        })
        .or_else(|| {
            // Only the second point active.
            let x = Vec2::new(0.0, -p1.normal_mass * rhs.y);
            let vn0 = self.k.m01 * x.y + rhs.x;
            (x.y >= 0.0 && vn0 >= 0.0).then_some(x)
        })
        .or_else(|| (rhs.x >= 0.0 && rhs.y >= 0.0).then_some(Vec2::ZERO));

        let Some(x) = solution else { return };

        let d = x - old;
        let i0 = normal * d.x;
        let i1 = normal * d.y;
        a.velocity -= (i0 + i1) * a.inv_mass;
        a.angular_velocity -= a.inv_inertia * (ra0.cross(i0) + ra1.cross(i1));
        b.velocity += (i0 + i1) * b.inv_mass;
        b.angular_velocity += b.inv_inertia * (rb0.cross(i0) + rb1.cross(i1));

        self.points[0].normal_impulse = x.x;
        self.points[1].normal_impulse = x.y;
    }

    /// Pushes the bodies apart along the contact normal.
    ///
    /// A body whose flag is false is treated as immovable for this call.
    pub fn positional_correction(
        &self,
        a: &mut RigidBody,
        b: &mut RigidBody,
        move_a: bool,
        move_b: bool,
    ) {
        let Some(kind) = self.kind else { return };
        if !self.is_collided() {
            return;
        }

        let (ma, ia) = if move_a { (a.inv_mass, a.inv_inertia) } else { (0.0, 0.0) };
        let (mb, ib) = if move_b { (b.inv_mass, b.inv_inertia) } else { (0.0, 0.0) };

        let mut ca = a.position;
        let mut cb = b.position;
        let mut aa = a.angle();
        let mut ab = b.angle();

        let radius = detection::shape_radius(a, self.key.0.index)
            + detection::shape_radius(b, self.key.1.index);

        for point in &self.points {
            let xf_a = Transform { position: ca, rotation: Rotation::new(aa) };
            let xf_b = Transform { position: cb, rotation: Rotation::new(ab) };

            let (normal, world_point, separation) = match kind {
                ManifoldType::Circles => {
                    let pa = xf_a.apply(self.local_point);
                    let pb = xf_b.apply(point.local_point);
                    let normal = (pb - pa).normalize();
                    (normal, (pa + pb) * 0.5, (pb - pa).dot(normal) - radius)
                }
                ManifoldType::FaceA => {
                    let normal = xf_a.rotation.apply(self.local_normal);
                    let plane = xf_a.apply(self.local_point);
                    let clip = xf_b.apply(point.local_point);
                    (normal, clip, (clip - plane).dot(normal) - radius)
                }
                ManifoldType::FaceB => {
                    let normal = xf_b.rotation.apply(self.local_normal);
                    let plane = xf_b.apply(self.local_point);
                    let clip = xf_a.apply(point.local_point);
                    (-normal, clip, (clip - plane).dot(normal) - radius)
                }
            };

            let ra = world_point - ca;
            let rb = world_point - cb;
            let c = (BAUMGARTE * (separation + LINEAR_SLOP)).clamp(-MAX_CORRECTION, 0.0);
            let rna = ra.cross(normal);
            let rnb = rb.cross(normal);
            let k = ma + mb + ia * rna * rna + ib * rnb * rnb;
            let impulse = if k > 0.0 { -c / k } else { 0.0 };

            let p = normal * impulse;
            ca -= p * ma;
            aa -= ia * ra.cross(p);
            cb += p * mb;
            ab += ib * rb.cross(p);
        }

        if move_a && a.is_dynamic() {
            a.position = ca;
            a.rotation = Rotation::new(aa);
        }
        if move_b && b.is_dynamic() {
            b.position = cb;
            b.rotation = Rotation::new(ab);
        }
    }

    /// Deepest penetration among the current points, positive when separated.
    pub fn min_separation(&self, a: &RigidBody, b: &RigidBody) -> Option<f64> {
        let kind = self.kind?;
        let xf_a = a.transform();
        let xf_b = b.transform();
        let radius = detection::shape_radius(a, self.key.0.index)
            + detection::shape_radius(b, self.key.1.index);
        self.points
            .iter()
            .map(|point| match kind {
                ManifoldType::Circles => {
                    xf_b.apply(point.local_point).distance(xf_a.apply(self.local_point)) - radius
                }
                ManifoldType::FaceA => {
                    (xf_b.apply(point.local_point) - xf_a.apply(self.local_point))
                        .dot(xf_a.rotation.apply(self.local_normal))
                        - radius
                }
                ManifoldType::FaceB => {
                    (xf_a.apply(point.local_point) - xf_b.apply(self.local_point))
                        .dot(xf_b.rotation.apply(self.local_normal))
                        - radius
                }
            })
            .reduce(f64::min)
    }
}

fn relative_velocity(a: &RigidBody, b: &RigidBody, ra: Vec2, rb: Vec2) -> Vec2 {
    b.velocity + Vec2::scalar_cross(b.angular_velocity, rb)
        - a.velocity
        - Vec2::scalar_cross(a.angular_velocity, ra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{BodyDef, BodyId, ShapeId};
    use crate::shapes::{Circle, Polygon};

    const EPSILON: f64 = 1e-6;

    fn key() -> PairKey {
        PairKey::new(ShapeId::new(BodyId(0), 0), ShapeId::new(BodyId(1), 0))
    }

    fn ground() -> RigidBody {
        BodyDef::new(Vec2::ZERO)
            .with_shape(Polygon::new_box(5.0, 0.5))
            .fixed()
            .build()
            .unwrap()
    }

    fn crate_at(y: f64) -> RigidBody {
        BodyDef::new(Vec2::new(0.0, y))
            .with_shape(Polygon::new_box(0.5, 0.5))
            .build()
            .unwrap()
    }

    #[test]
    fn test_material_mixing_and_flags() {
        let a = BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(1.0))
            .with_material(0.1, 0.4)
            .build()
            .unwrap();
        let b = BodyDef::new(Vec2::ZERO)
            .with_shape(Circle::new(1.0))
            .with_material(0.7, 0.9)
            .sensor()
            .build()
            .unwrap();
        let m = Manifold::new(key(), &a, &b);
        assert!((m.restitution - 0.7).abs() < EPSILON);
        assert!((m.friction - 0.6).abs() < EPSILON);
        assert!(m.sensor);
        assert!(!m.is_touching());
    }

    #[test]
    fn test_box_on_ground_has_two_points() {
        let a = ground();
        let b = crate_at(0.95);
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        assert_eq!(m.points.len(), 2);
        assert!((m.normal - Vec2::new(0.0, 1.0)).magnitude() < EPSILON);
        assert!((m.normal.magnitude() - 1.0).abs() < EPSILON);
        let sep = m.min_separation(&a, &b).unwrap();
        assert!((sep - -0.05).abs() < EPSILON);
    }

    #[test]
    fn test_feature_ids_carry_impulses() {
        let a = ground();
        let b = crate_at(0.95);
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        for (i, p) in m.points.iter_mut().enumerate() {
            p.normal_impulse = 1.0 + i as f64;
            p.tangent_impulse = 0.5;
        }
        let before: Vec<(ContactId, f64)> =
            m.points.iter().map(|p| (p.id, p.normal_impulse)).collect();

        m.solve(true, &a, &b);
        for (id, impulse) in before {
            let p = m.points.iter().find(|p| p.id == id).unwrap();
            assert_eq!(p.normal_impulse, impulse);
            assert_eq!(p.tangent_impulse, 0.5);
        }

        m.solve(false, &a, &b);
        assert!(m.points.iter().all(|p| p.normal_impulse == 0.0));
    }

    #[test]
    fn test_aabb_reject_clears_points_but_keeps_manifold() {
        let a = ground();
        let mut b = crate_at(0.95);
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        assert!(m.is_touching());

        b.set_transform(Vec2::new(0.0, 3.0), 0.0);
        m.solve(true, &a, &b);
        assert!(!m.is_touching());
        assert_eq!(m.key, key());
    }

    #[test]
    fn test_resting_contact_needs_no_impulse_delta() {
        let a = ground();
        let b = crate_at(1.0 - LINEAR_SLOP);
        let mut m = Manifold::new(key(), &a, &b);
        let (mut a, mut b) = (a, b);
        m.solve(true, &a, &b);
        m.initialize(&a, &b);
        m.warm_start(&mut a, &mut b);
        let before: Vec<f64> = m.points.iter().map(|p| p.normal_impulse).collect();
        m.apply_impulse(&mut a, &mut b);
        for (p, old) in m.points.iter().zip(before) {
            assert!((p.normal_impulse - old).abs() < EPSILON);
        }
        assert!(b.velocity.magnitude() < EPSILON);
        assert!(b.angular_velocity.abs() < EPSILON);
    }

    #[test]
    fn test_impulse_stops_approach() {
        let a = ground();
        let mut b = crate_at(0.95);
        b.velocity = Vec2::new(0.0, -0.5);
        let mut a = a;
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        m.initialize(&a, &b);
        for _ in 0..8 {
            m.apply_impulse(&mut a, &mut b);
        }
        assert!(b.velocity.y.abs() < 1e-3, "vy = {}", b.velocity.y);
        assert!(m.points.iter().all(|p| p.normal_impulse >= 0.0));
        // Static side never moves.
        assert_eq!(a.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_nearly_coincident_points_fall_back_to_single_point() {
        let mut a = ground();
        let mut b = crate_at(0.95);
        b.velocity = Vec2::new(0.0, -0.5);
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        m.initialize(&a, &b);
        assert_eq!(m.points.len(), 2);

        m.solve(true, &a, &b);
        m.points[1].point = m.points[0].point + Vec2::new(1e-5, 0.0);
        m.initialize(&a, &b);
        assert_eq!(m.points.len(), 1);

        for _ in 0..8 {
            m.apply_impulse(&mut a, &mut b);
        }
        let point = m.points[0];
        let ra = point.point - a.position;
        let rb = point.point - b.position;
        let vn = relative_velocity(&a, &b, ra, rb).dot(m.normal);
        assert!(vn.abs() < EPSILON, "vn = {}", vn);
        assert!(point.normal_impulse > 0.0);
    }

    #[test]
    fn test_restitution_bias_only_above_threshold() {
        let a = ground();
        let mut slow = crate_at(0.95);
        slow.velocity = Vec2::new(0.0, -0.5);
        let mut m = Manifold::new(key(), &a, &slow);
        m.solve(true, &a, &slow);
        m.initialize(&a, &slow);
        assert!(m.points.iter().all(|p| p.bias == 0.0));

        slow.velocity = Vec2::new(0.0, -5.0);
        m.initialize(&a, &slow);
        assert!(m.points.iter().all(|p| (p.bias - 0.2 * 5.0).abs() < EPSILON));
    }

    #[test]
    fn test_positional_correction_reduces_penetration() {
        let mut a = ground();
        let mut b = crate_at(0.8);
        let mut m = Manifold::new(key(), &a, &b);
        m.solve(true, &a, &b);
        let before = m.min_separation(&a, &b).unwrap();
        m.positional_correction(&mut a, &mut b, true, true);
        let after = m.min_separation(&a, &b).unwrap();
        assert!(after > before);
        assert_eq!(a.position, Vec2::ZERO);

        // Frozen body stays put.
        let y = b.position.y;
        m.positional_correction(&mut a, &mut b, true, false);
        assert_eq!(b.position.y, y);
    }
}
