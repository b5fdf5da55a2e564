//! Island partitioning and the per-island sequential impulse solve.

use std::collections::BTreeSet;

use tracing::debug;

use super::PhysicsWorld;
use crate::collision::PairKey;
use crate::common::Arena;
use crate::constraints::{get_mutable_body_pair, JointId};
use crate::integration::{integrate_position, integrate_velocity};
use crate::objects::{BodyId, RigidBody};

/// Awake bodies connected through touching contacts or joints, with the constraints
/// between them. Rebuilt every step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<PairKey>,
    pub joints: Vec<JointId>,
}

/// Pushes `index` onto the flood-fill stack unless it is static or already visited.
/// Sleeping bodies reached from an awake one are woken.
fn visit(bodies: &mut Arena<RigidBody>, visited: &mut [bool], stack: &mut Vec<usize>, index: usize) {
    if visited[index] {
        return;
    }
    let Some(body) = bodies.get_mut(index) else {
        return;
    };
    if body.is_static {
        return;
    }
    if body.asleep {
        body.wake();
    }
    visited[index] = true;
    stack.push(index);
}

impl PhysicsWorld {
    /// Flood-fills islands from every awake dynamic body. Static bodies join no island and
    /// do not connect islands.
    pub(super) fn build_islands(&mut self) -> Vec<Island> {
        let capacity = self.bodies.capacity();

        let mut contact_edges: Vec<Vec<PairKey>> = vec![Vec::new(); capacity];
        for (key, manifold) in &self.manifolds {
            if manifold.is_collided() {
                contact_edges[key.0.body.0].push(*key);
                contact_edges[key.1.body.0].push(*key);
            }
        }

        let mut joint_edges: Vec<Vec<JointId>> = vec![Vec::new(); capacity];
        for (index, joint) in self.joints.iter() {
            let (a, b) = (joint.body_a().0, joint.body_b().0);
            if a < capacity && b < capacity {
                joint_edges[a].push(JointId(index));
                joint_edges[b].push(JointId(index));
            }
        }

        let mut visited = vec![false; capacity];
        let mut contact_seen: BTreeSet<PairKey> = BTreeSet::new();
        let mut joint_seen = vec![false; self.joints.capacity()];
        let mut islands = Vec::new();
        let mut stack = Vec::new();

        for seed in 0..capacity {
            if visited[seed] || !self.bodies.get(seed).map_or(false, RigidBody::is_active) {
                continue;
            }

            let mut island = Island::default();
            visited[seed] = true;
            stack.push(seed);

            while let Some(index) = stack.pop() {
                island.bodies.push(BodyId(index));

                for key in &contact_edges[index] {
                    if !contact_seen.insert(*key) {
                        continue;
                    }
                    island.contacts.push(*key);
                    let other = if key.0.body.0 == index { key.1.body.0 } else { key.0.body.0 };
                    visit(&mut self.bodies, &mut visited, &mut stack, other);
                }

                for joint_id in &joint_edges[index] {
                    if joint_seen[joint_id.0] {
                        continue;
                    }
                    joint_seen[joint_id.0] = true;
                    island.joints.push(*joint_id);
                    let Some(joint) = self.joints.get(joint_id.0) else {
                        continue;
                    };
                    let other = if joint.body_a().0 == index { joint.body_b().0 } else { joint.body_a().0 };
                    visit(&mut self.bodies, &mut visited, &mut stack, other);
                }
            }

            islands.push(island);
        }

        islands
    }

    /// Integrates and solves one island, then puts it to sleep if every member has rested
    /// long enough.
    pub(super) fn solve_island(&mut self, island: &Island, dt: f64) {
        let gravity = self.config.gravity;

        for id in &island.bodies {
            if let Some(body) = self.bodies.get_mut(id.0) {
                integrate_velocity(body, gravity, dt);
            }
        }

        for key in &island.contacts {
            let (Some(manifold), Some((a, b))) = (
                self.manifolds.get_mut(key),
                get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
            ) else {
                continue;
            };
            manifold.initialize(a, b);
        }
        for key in &island.contacts {
            let (Some(manifold), Some((a, b))) = (
                self.manifolds.get(key),
                get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
            ) else {
                continue;
            };
            manifold.warm_start(a, b);
        }
        for id in &island.joints {
            let Some(joint) = self.joints.get_mut(id.0) else {
                continue;
            };
            if let Some((a, b)) = get_mutable_body_pair(&mut self.bodies, joint.body_a(), joint.body_b()) {
                joint.initialize(a, b, dt);
            }
        }

        for _ in 0..self.config.velocity_iterations {
            for id in &island.joints {
                let Some(joint) = self.joints.get_mut(id.0) else {
                    continue;
                };
                if let Some((a, b)) = get_mutable_body_pair(&mut self.bodies, joint.body_a(), joint.body_b()) {
                    joint.apply_impulse(a, b, dt);
                }
            }
            for key in &island.contacts {
                let (Some(manifold), Some((a, b))) = (
                    self.manifolds.get_mut(key),
                    get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
                ) else {
                    continue;
                };
                manifold.apply_impulse(a, b);
            }
        }

        for id in &island.bodies {
            if let Some(body) = self.bodies.get_mut(id.0) {
                integrate_position(body, dt);
            }
        }

        for _ in 0..self.config.position_iterations {
            for key in &island.contacts {
                let (Some(manifold), Some((a, b))) = (
                    self.manifolds.get(key),
                    get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
                ) else {
                    continue;
                };
                manifold.positional_correction(a, b, true, true);
            }
            for id in &island.joints {
                let Some(joint) = self.joints.get_mut(id.0) else {
                    continue;
                };
                if let Some((a, b)) = get_mutable_body_pair(&mut self.bodies, joint.body_a(), joint.body_b()) {
                    joint.positional_correction(a, b);
                }
            }
        }

        for id in &island.bodies {
            if let Some(body) = self.bodies.get_mut(id.0) {
                body.clear_forces();
            }
        }

        self.update_sleep(island, dt);
    }

    fn update_sleep(&mut self, island: &Island, dt: f64) {
        let linear_tolerance = self.config.linear_sleep_tolerance.powi(2);
        let angular_tolerance = self.config.angular_sleep_tolerance.powi(2);

        let mut min_sleep_time = f64::INFINITY;
        for id in &island.bodies {
            let Some(body) = self.bodies.get_mut(id.0) else {
                continue;
            };
            if !body.can_sleep
                || body.velocity.magnitude_squared() > linear_tolerance
                || body.angular_velocity * body.angular_velocity > angular_tolerance
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += dt;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if !self.config.allow_sleep || min_sleep_time < self.config.time_to_sleep {
            return;
        }

        for id in &island.bodies {
            if let Some(body) = self.bodies.get_mut(id.0) {
                body.sleep();
                body.prev_position = body.position;
                body.prev_angle = body.angle();
                body.update_aabbs();
            }
        }
        debug!(bodies = island.bodies.len(), "island fell asleep");
    }
}
