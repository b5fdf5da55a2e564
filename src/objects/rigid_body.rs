use std::fmt;

use crate::collision::contact_data::CollisionCallback;
use crate::collision::AABB;
use crate::common::Material;
use crate::error::{PhysicsError, Result};
use crate::math::{clean_angle, Rotation, Sweep, Transform, Vec2};
use crate::shapes::{MassData, Shape};

/// Handle to a body inside a [`PhysicsWorld`](crate::world::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    /// Handle for slot `index`. Only meaningful for the world or broadphase that issued it.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A shape is addressed by its owning body and its position in the body's shape list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId {
    pub body: BodyId,
    pub index: u32,
}

impl ShapeId {
    pub fn new(body: BodyId, index: usize) -> Self {
        Self {
            body,
            index: index as u32,
        }
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.body, self.index)
    }
}

/// Group bit plus exclusion mask.
///
/// Two bodies may collide when each one's group bit survives the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    pub group: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self { group: 1, mask: !0 }
    }
}

impl CollisionFilter {
    /// `group` 0 collides with nothing; 1 to 32 select a bit. Exclusions name groups 2 to 32.
    pub fn new(group: u32, exclusions: &[u32]) -> Result<Self> {
        if group > 32 {
            return Err(PhysicsError::FilterGroupOutOfRange(group));
        }
        let group = if group == 0 { 0 } else { 1 << (group - 1) };

        let mut excluded = 0u32;
        for &e in exclusions {
            if !(2..=32).contains(&e) {
                return Err(PhysicsError::ExclusionGroupOutOfRange(e));
            }
            excluded |= 1 << (e - 1);
        }

        Ok(Self {
            group,
            mask: !excluded,
        })
    }

    pub fn allows(&self, other: &CollisionFilter) -> bool {
        self.group & other.mask != 0 && other.group & self.mask != 0
    }
}

/// Everything needed to build a [`RigidBody`].
#[derive(Debug, Clone)]
pub struct BodyDef {
    /// World position of the shapes' common origin.
    pub position: Vec2,
    pub angle: f64,
    pub velocity: Vec2,
    pub angular_velocity: f64,
    pub shapes: Vec<Shape>,
    pub friction: f64,
    pub restitution: f64,
    pub density: f64,
    pub sensor: bool,
    pub is_static: bool,
    pub filter_group: u32,
    pub exclusion_list: Vec<u32>,
    /// Whether the body takes part in time-of-impact sub-stepping.
    pub continuous: bool,
    pub can_sleep: bool,
    pub on_collide: Option<CollisionCallback>,
}

impl Default for BodyDef {
    fn default() -> Self {
        let material = Material::default();
        Self {
            position: Vec2::ZERO,
            angle: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            shapes: Vec::new(),
            friction: material.friction,
            restitution: material.restitution,
            density: 1.0,
            sensor: false,
            is_static: false,
            filter_group: 1,
            exclusion_list: Vec::new(),
            continuous: true,
            can_sleep: true,
            on_collide: None,
        }
    }
}

impl BodyDef {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, shape: impl Into<Shape>) -> Self {
        self.shapes.push(shape.into());
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f64) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    pub fn with_material(mut self, restitution: f64, friction: f64) -> Self {
        self.restitution = restitution;
        self.friction = friction;
        self
    }

    pub fn with_filter(mut self, group: u32, exclusions: &[u32]) -> Self {
        self.filter_group = group;
        self.exclusion_list = exclusions.to_vec();
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    pub fn with_callback(mut self, callback: CollisionCallback) -> Self {
        self.on_collide = Some(callback);
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn build(self) -> Result<RigidBody> {
        RigidBody::new(self)
    }
}

/// A rigid body made of one or more shapes.
///
/// `position` is the world position of the center of mass. Shapes are stored relative to it.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub shapes: Vec<Shape>,
    /// World AABB of each shape, refreshed once per step while awake.
    pub aabbs: Vec<AABB>,

    pub position: Vec2,
    pub rotation: Rotation,
    pub velocity: Vec2,
    pub angular_velocity: f64,
    pub force: Vec2,
    pub torque: f64,

    /// Pose at the start of the last integration, for interpolation and sweeps.
    pub prev_position: Vec2,
    pub prev_angle: f64,
    /// Step fraction the body has already been advanced to by sub-stepping.
    pub alpha0: f64,

    pub mass: f64,
    pub inv_mass: f64,
    pub inertia: f64,
    pub inv_inertia: f64,
    /// Offset from the definition origin to the center of mass, in body space.
    pub local_center: Vec2,

    pub material: Material,
    pub sensor: bool,
    pub is_static: bool,
    pub filter: CollisionFilter,
    pub continuous: bool,

    pub can_sleep: bool,
    pub asleep: bool,
    pub sleep_time: f64,

    pub on_collide: Option<CollisionCallback>,
}

impl RigidBody {
    pub fn new(def: BodyDef) -> Result<Self> {
        let filter = CollisionFilter::new(def.filter_group, &def.exclusion_list)?;
        let mut shapes = def.shapes;

        // Aggregate mass about the definition origin, then move the origin to the centroid.
        let mut total = MassData::default();
        let mut weighted_center = Vec2::ZERO;
        for shape in &shapes {
            let m = shape.compute_mass(def.density);
            total.mass += m.mass;
            weighted_center += m.center * m.mass;
            total.inertia += m.inertia;
        }
        let inv_mass = total.inv_mass();
        let center = weighted_center * inv_mass;
        let inertia = (total.inertia - total.mass * center.magnitude_squared()).max(0.0);

        for shape in shapes.iter_mut() {
            shape.recenter(center);
        }

        let rotation = Rotation::new(def.angle);
        let position = def.position + rotation.apply(center);

        let mut body = Self {
            aabbs: Vec::with_capacity(shapes.len()),
            shapes,
            position,
            rotation,
            velocity: def.velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            prev_position: position,
            prev_angle: rotation.angle(),
            alpha0: 0.0,
            mass: total.mass,
            inv_mass,
            inertia,
            inv_inertia: if inertia > 0.0 { 1.0 / inertia } else { 0.0 },
            local_center: center,
            material: Material::new(def.restitution, def.friction),
            sensor: def.sensor,
            is_static: false,
            filter,
            continuous: def.continuous,
            can_sleep: def.can_sleep,
            asleep: false,
            sleep_time: 0.0,
            on_collide: def.on_collide,
        };
        if def.is_static {
            body.set_static();
        }
        body.update_aabbs();
        Ok(body)
    }

    /// Zeroes every mass term. Static bodies are never integrated or moved by the solver.
    pub fn set_static(&mut self) {
        self.is_static = true;
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static
    }

    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
        }
    }

    /// Transform of the definition origin, the frame the caller built the shapes in.
    pub fn origin_transform(&self) -> Transform {
        Transform {
            position: self.position - self.rotation.apply(self.local_center),
            rotation: self.rotation,
        }
    }

    /// Pose between the previous and current step, `alpha` in [0, 1].
    pub fn interpolated_transform(&self, alpha: f64) -> Transform {
        let delta = clean_angle(self.angle() - self.prev_angle);
        Transform::new(
            self.prev_position.lerp(self.position, alpha),
            self.prev_angle + delta * alpha,
        )
    }

    /// Motion from the last recorded pose to the current one.
    pub fn sweep(&self) -> Sweep {
        Sweep {
            c0: self.prev_position,
            c: self.position,
            a0: self.prev_angle,
            a: self.prev_angle + clean_angle(self.angle() - self.prev_angle),
            alpha0: self.alpha0,
        }
    }

    /// Teleports the center of mass. Clears the recorded motion.
    pub fn set_transform(&mut self, position: Vec2, angle: f64) {
        self.position = position;
        self.rotation = Rotation::new(angle);
        self.prev_position = position;
        self.prev_angle = self.rotation.angle();
        self.alpha0 = 0.0;
        self.update_aabbs();
    }

    pub fn update_aabbs(&mut self) {
        let xf = self.transform();
        self.aabbs.clear();
        self.aabbs
            .extend(self.shapes.iter().map(|shape| shape.compute_aabb(&xf)));
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.transform().apply(local)
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.transform().apply_inverse(world)
    }

    pub fn apply_force(&mut self, force: Vec2) {
        self.force += force;
        self.wake();
    }

    pub fn apply_force_at_point(&mut self, force: Vec2, point_world: Vec2) {
        self.force += force;
        self.torque += (point_world - self.position).cross(force);
        self.wake();
    }

    pub fn apply_torque(&mut self, torque: f64) {
        self.torque += torque;
        self.wake();
    }

    /// Instant velocity change from `impulse` applied at lever arm `arm`.
    pub fn apply_impulse(&mut self, impulse: Vec2, arm: Vec2) {
        self.velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * arm.cross(impulse);
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    pub fn wake(&mut self) {
        self.asleep = false;
        self.sleep_time = 0.0;
    }

    pub fn sleep(&mut self) {
        self.asleep = true;
        self.velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.clear_forces();
    }

    /// Awake and dynamic: the bodies a step integrates.
    pub fn is_active(&self) -> bool {
        !self.is_static && !self.asleep
    }
}
