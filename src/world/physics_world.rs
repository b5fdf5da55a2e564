use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::collision::raycast::RayCastInput;
use crate::collision::{BroadPhase, ContactData, DebugNode, Manifold, PairKey, AABB};
use crate::common::{Arena, WorldConfig};
use crate::constraints::{get_mutable_body_pair, Joint, JointId};
use crate::error::{PhysicsError, Result};
use crate::math::Vec2;
use crate::objects::{BodyDef, BodyId, CollisionFilter, RigidBody, ShapeId};

/// External force hook, run at the start of every step on all awake dynamic bodies.
#[derive(Clone)]
pub struct ForceHook(Rc<dyn Fn(&mut [&mut RigidBody])>);

impl ForceHook {
    pub fn new(f: impl Fn(&mut [&mut RigidBody]) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, bodies: &mut [&mut RigidBody]) {
        (self.0)(bodies)
    }
}

impl fmt::Debug for ForceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForceHook")
    }
}

/// A ray hit reported to [`PhysicsWorld::raycast`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    pub shape: ShapeId,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along `p1 -> p2`.
    pub fraction: f64,
}

/// Owns every body, joint and contact and advances them by fixed steps.
///
/// Bodies and joints are addressed by the ids handed out on insertion. Ids of removed
/// entries are reused by later insertions.
#[derive(Debug, Clone)]
pub struct PhysicsWorld {
    pub(super) config: WorldConfig,
    pub(super) bodies: Arena<RigidBody>,
    pub(super) joints: Arena<Box<dyn Joint>>,
    pub(super) broadphase: BroadPhase,
    pub(super) manifolds: BTreeMap<PairKey, Manifold>,
    force_hook: Option<ForceHook>,
    step_count: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            bodies: Arena::new(),
            joints: Arena::new(),
            broadphase: BroadPhase::new(),
            manifolds: BTreeMap::new(),
            force_hook: None,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorldConfig {
        &mut self.config
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn set_force_hook(&mut self, hook: Option<ForceHook>) {
        self.force_hook = hook;
    }

    // --- Bodies ---

    /// Builds a body from `def` and adds it.
    pub fn add_body(&mut self, def: BodyDef) -> Result<BodyId> {
        let body = def.build()?;
        Ok(self.insert_body(body))
    }

    /// Adds an already built body, for instance one returned by [`PhysicsWorld::flush`].
    pub fn insert_body(&mut self, mut body: RigidBody) -> BodyId {
        body.wake();
        body.update_aabbs();
        let filter = body.filter;
        let aabbs = body.aabbs.clone();
        let is_static = body.is_static;
        let id = BodyId(self.bodies.insert(body));

        let mut pairs = Vec::new();
        for (index, aabb) in aabbs.iter().enumerate() {
            self.broadphase
                .insert(ShapeId::new(id, index), aabb, filter, &mut pairs);
        }
        self.add_pairs(pairs);

        debug!(body = %id, shapes = aabbs.len(), is_static, "body added");
        id
    }

    /// Removes a body together with its contacts and joints, waking whatever touched it.
    pub fn remove_body(&mut self, id: BodyId) -> Result<RigidBody> {
        let body = self
            .bodies
            .remove(id.0)
            .ok_or_else(|| PhysicsError::body_not_found(id))?;

        for index in 0..body.shapes.len() {
            self.broadphase.remove(ShapeId::new(id, index));
        }

        let mut touched = Vec::new();
        self.manifolds.retain(|key, _| {
            if key.0.body == id {
                touched.push(key.1.body);
                false
            } else if key.1.body == id {
                touched.push(key.0.body);
                false
            } else {
                true
            }
        });

        let attached: Vec<usize> = self
            .joints
            .iter()
            .filter(|(_, joint)| joint.body_a() == id || joint.body_b() == id)
            .map(|(index, _)| index)
            .collect();
        for index in &attached {
            if let Some(joint) = self.joints.remove(*index) {
                touched.push(joint.body_a());
                touched.push(joint.body_b());
            }
        }

        for other in touched {
            if let Some(body) = self.bodies.get_mut(other.0) {
                body.wake();
            }
        }

        debug!(body = %id, joints = attached.len(), "body removed");
        Ok(body)
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.0)
    }

    /// Direct access to a body's state. Use [`PhysicsWorld::set_transform`] to teleport and
    /// [`PhysicsWorld::set_filter`] to change filtering, so the broadphase follows.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.0)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies.iter().map(|(index, body)| (BodyId(index), body))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body's center of mass and wakes it.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f64) -> Result<()> {
        let body = self
            .bodies
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::body_not_found(id))?;
        body.set_transform(position, angle);
        body.wake();

        let aabbs = body.aabbs.clone();
        let mut pairs = Vec::new();
        for (index, aabb) in aabbs.iter().enumerate() {
            let shape = ShapeId::new(id, index);
            if self.broadphase.move_proxy(shape, aabb, Vec2::ZERO) {
                self.broadphase.find_pairs(shape, &mut pairs);
            }
        }
        self.add_pairs(pairs);
        Ok(())
    }

    /// Replaces a body's filter group and exclusions. Contacts the new filter forbids are dropped.
    pub fn set_filter(&mut self, id: BodyId, group: u32, exclusions: &[u32]) -> Result<()> {
        let filter = CollisionFilter::new(group, exclusions)?;
        let body = self
            .bodies
            .get_mut(id.0)
            .ok_or_else(|| PhysicsError::body_not_found(id))?;
        body.filter = filter;
        body.wake();

        let shapes: Vec<ShapeId> = (0..body.shapes.len())
            .map(|index| ShapeId::new(id, index))
            .collect();
        self.broadphase.set_filter(&shapes, filter);

        let bodies = &self.bodies;
        self.manifolds.retain(|key, _| {
            if key.0.body != id && key.1.body != id {
                return true;
            }
            match (bodies.get(key.0.body.0), bodies.get(key.1.body.0)) {
                (Some(a), Some(b)) => a.filter.allows(&b.filter),
                _ => false,
            }
        });

        let mut pairs = Vec::new();
        for shape in shapes {
            self.broadphase.find_pairs(shape, &mut pairs);
        }
        self.add_pairs(pairs);
        Ok(())
    }

    // --- Joints ---

    /// Adds a joint and wakes both of its bodies.
    pub fn add_joint(&mut self, joint: impl Joint + 'static) -> Result<JointId> {
        self.add_boxed_joint(Box::new(joint))
    }

    pub fn add_boxed_joint(&mut self, mut joint: Box<dyn Joint>) -> Result<JointId> {
        let (a, b) = (joint.body_a(), joint.body_b());
        if a == b {
            return Err(PhysicsError::SelfJoint(a.to_string()));
        }
        for id in [a, b] {
            if !self.bodies.contains(id.0) {
                return Err(PhysicsError::body_not_found(id));
            }
        }
        let (body_a, body_b) = get_mutable_body_pair(&mut self.bodies, a, b)
            .ok_or_else(|| PhysicsError::body_not_found(a))?;

        joint.attach(body_a, body_b);
        body_a.wake();
        body_b.wake();

        let id = JointId(self.joints.insert(joint));
        debug!(joint = %id, body_a = %a, body_b = %b, "joint added");
        Ok(id)
    }

    /// Removes a joint and wakes both of its bodies.
    pub fn remove_joint(&mut self, id: JointId) -> Result<Box<dyn Joint>> {
        let joint = self
            .joints
            .remove(id.0)
            .ok_or_else(|| PhysicsError::joint_not_found(id))?;
        for body in [joint.body_a(), joint.body_b()] {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.wake();
            }
        }
        debug!(joint = %id, "joint removed");
        Ok(joint)
    }

    pub fn joint(&self, id: JointId) -> Option<&dyn Joint> {
        self.joints.get(id.0).map(|joint| joint.as_ref())
    }

    /// The joint as its concrete type.
    pub fn joint_as<T: Joint + 'static>(&self, id: JointId) -> Option<&T> {
        self.joints.get(id.0)?.as_any().downcast_ref::<T>()
    }

    /// Mutable access to a joint as its concrete type. Wakes both bodies, since changing a
    /// motor or spring should take effect on a resting pair.
    pub fn joint_as_mut<T: Joint + 'static>(&mut self, id: JointId) -> Option<&mut T> {
        let joint = self.joints.get(id.0)?;
        for body in [joint.body_a(), joint.body_b()] {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.wake();
            }
        }
        self.joints.get_mut(id.0)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &dyn Joint)> {
        self.joints
            .iter()
            .map(|(index, joint)| (JointId(index), joint.as_ref()))
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // --- Contacts ---

    /// Every tracked shape pair, touching or not, in key order.
    pub fn manifolds(&self) -> impl Iterator<Item = &Manifold> {
        self.manifolds.values()
    }

    pub fn manifold(&self, a: ShapeId, b: ShapeId) -> Option<&Manifold> {
        self.manifolds.get(&PairKey::new(a, b))
    }

    /// Whether any shape of `a` currently has contact points with any shape of `b`.
    pub fn is_touching(&self, a: BodyId, b: BodyId) -> bool {
        self.manifolds.values().any(|m| {
            m.is_touching()
                && ((m.key.0.body == a && m.key.1.body == b)
                    || (m.key.0.body == b && m.key.1.body == a))
        })
    }

    // --- Queries ---

    /// Calls `callback` with every shape whose fat box overlaps `aabb` until it returns false.
    pub fn query<F: FnMut(ShapeId) -> bool>(&self, aabb: &AABB, callback: F) {
        self.broadphase.query(aabb, callback);
    }

    /// Casts the segment `p1 -> p2` against every shape.
    ///
    /// The callback may return a fraction to clip the ray to, `Some(0.0)` to stop, or a
    /// negative value to ignore the hit. `None` clips to the hit itself, which makes the
    /// last reported hit the closest one.
    pub fn raycast<F>(&self, p1: Vec2, p2: Vec2, callback: F)
    where
        F: FnMut(&RayCastHit) -> Option<f64>,
    {
        self.raycast_filtered(p1, p2, |_| true, callback);
    }

    /// [`PhysicsWorld::raycast`] that skips shapes for which `should_check` returns false.
    pub fn raycast_filtered<S, F>(&self, p1: Vec2, p2: Vec2, mut should_check: S, mut callback: F)
    where
        S: FnMut(ShapeId) -> bool,
        F: FnMut(&RayCastHit) -> Option<f64>,
    {
        let input = RayCastInput::new(p1, p2);
        self.broadphase.raycast(&input, |ray, shape_id| {
            if !should_check(shape_id) {
                return -1.0;
            }
            let Some(body) = self.bodies.get(shape_id.body.0) else {
                return -1.0;
            };
            let Some(shape) = body.shapes.get(shape_id.index as usize) else {
                return -1.0;
            };
            match shape.raycast(ray, &body.transform()) {
                Some(output) => {
                    let hit = RayCastHit {
                        shape: shape_id,
                        point: ray.point_at(output.fraction),
                        normal: output.normal,
                        fraction: output.fraction,
                    };
                    callback(&hit).unwrap_or(output.fraction)
                }
                None => -1.0,
            }
        });
    }

    /// The first shape hit along `p1 -> p2`.
    pub fn raycast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        let mut closest: Option<RayCastHit> = None;
        self.raycast(p1, p2, |hit| {
            if closest.map_or(true, |c| hit.fraction < c.fraction) {
                closest = Some(*hit);
            }
            None
        });
        closest
    }

    /// Snapshot of the broadphase tree for drawing.
    pub fn debug_nodes(&self) -> Vec<DebugNode<ShapeId>> {
        self.broadphase.debug_nodes()
    }

    // --- Whole-world operations ---

    /// Removes everything and returns the bodies that were in the world.
    pub fn flush(&mut self) -> Vec<RigidBody> {
        let bodies = self.bodies.drain();
        self.joints = Arena::new();
        self.manifolds.clear();
        self.broadphase.clear();
        debug!(bodies = bodies.len(), "world flushed");
        bodies
    }

    /// Deep copy of the simulation. Ids stay valid in the copy. Collision callbacks and the
    /// force hook are shared with the original.
    pub fn fork(&self) -> Self {
        debug!(
            bodies = self.bodies.len(),
            joints = self.joints.len(),
            manifolds = self.manifolds.len(),
            "world forked"
        );
        self.clone()
    }

    // --- Stepping ---

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 || !dt.is_finite() {
            trace!(dt, "ignoring step");
            return;
        }

        self.apply_force_hook();
        self.update_broadphase();
        self.update_narrowphase();

        let islands = self.build_islands();
        for island in &islands {
            self.solve_island(island, dt);
        }

        let toi_events = if self.config.continuous_collision {
            self.solve_toi(dt)
        } else {
            0
        };

        self.dispatch_callbacks(dt);
        self.step_count += 1;

        trace!(
            step = self.step_count,
            islands = islands.len(),
            manifolds = self.manifolds.len(),
            toi_events,
            "step complete"
        );
    }

    fn apply_force_hook(&mut self) {
        let Some(hook) = self.force_hook.clone() else {
            return;
        };
        let mut awake: Vec<&mut RigidBody> = self
            .bodies
            .iter_mut()
            .map(|(_, body)| body)
            .filter(|body| body.is_active())
            .collect();
        hook.call(&mut awake);
    }

    /// Refits awake shapes, opens manifolds for new pairs and closes those whose fat boxes
    /// separated.
    fn update_broadphase(&mut self) {
        let mut moved = Vec::new();
        for (index, body) in self.bodies.iter_mut() {
            if !body.is_active() {
                continue;
            }
            body.update_aabbs();
            let id = BodyId(index);
            let displacement = body.position - body.prev_position;
            for (i, aabb) in body.aabbs.iter().enumerate() {
                moved.push((ShapeId::new(id, i), *aabb, displacement));
            }
        }

        let pairs = self.broadphase.update(moved);
        self.add_pairs(pairs);

        let broadphase = &self.broadphase;
        self.manifolds
            .retain(|key, _| broadphase.test_overlap(key.0, key.1));
    }

    /// Recomputes the contact points of every pair with an awake body.
    fn update_narrowphase(&mut self) {
        let bodies = &self.bodies;
        for (key, manifold) in self.manifolds.iter_mut() {
            let (Some(a), Some(b)) = (bodies.get(key.0.body.0), bodies.get(key.1.body.0)) else {
                continue;
            };
            if !a.is_active() && !b.is_active() {
                continue;
            }
            manifold.solve(true, a, b);
        }
    }

    /// Tracks new candidate pairs. Pairs of two static bodies are never tracked.
    pub(super) fn add_pairs(&mut self, pairs: Vec<PairKey>) {
        for key in pairs {
            if self.manifolds.contains_key(&key) {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.bodies.get(key.0.body.0),
                self.bodies.get(key.1.body.0),
            ) else {
                continue;
            };
            if a.is_static && b.is_static {
                continue;
            }
            self.manifolds.insert(key, Manifold::new(key, a, b));
        }
    }

    /// Reports every touching manifold to both bodies' callbacks, sleeping pairs included.
    fn dispatch_callbacks(&self, dt: f64) {
        let mut reports = Vec::new();
        for manifold in self.manifolds.values() {
            if !manifold.is_touching() {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.bodies.get(manifold.key.0.body.0),
                self.bodies.get(manifold.key.1.body.0),
            ) else {
                continue;
            };
            if let Some(callback) = &a.on_collide {
                reports.push((callback.clone(), ContactData::new(manifold, false, dt)));
            }
            if let Some(callback) = &b.on_collide {
                reports.push((callback.clone(), ContactData::new(manifold, true, dt)));
            }
        }
        for (callback, data) in reports {
            callback.call(&data);
        }
    }
}
