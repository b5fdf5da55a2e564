//! Continuous collision: time-of-impact sub-stepping after the discrete solve.
//!
//! Each event moves the two bodies of the earliest impact back to the moment of contact,
//! resolves that contact with a small local solve and integrates the rest of the step.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::PhysicsWorld;
use crate::collision::toi::{time_of_impact, TOI_TOLERANCE};
use crate::collision::{Manifold, PairKey, AABB};
use crate::common::Arena;
use crate::constraints::get_mutable_body_pair;
use crate::integration::{advance, integrate_remaining};
use crate::math::{Rotation, Vec2};
use crate::objects::{BodyId, RigidBody, ShapeId};

/// The part of a body a time-of-impact event may roll back.
#[derive(Debug, Clone, Copy)]
struct SavedPose {
    id: BodyId,
    position: Vec2,
    rotation: Rotation,
    prev_position: Vec2,
    prev_angle: f64,
    alpha0: f64,
}

impl SavedPose {
    fn capture(id: BodyId, body: &RigidBody) -> Self {
        Self {
            id,
            position: body.position,
            rotation: body.rotation,
            prev_position: body.prev_position,
            prev_angle: body.prev_angle,
            alpha0: body.alpha0,
        }
    }

    fn restore(&self, bodies: &mut Arena<RigidBody>) {
        if let Some(body) = bodies.get_mut(self.id.0) {
            body.position = self.position;
            body.rotation = self.rotation;
            body.prev_position = self.prev_position;
            body.prev_angle = self.prev_angle;
            body.alpha0 = self.alpha0;
            body.update_aabbs();
        }
    }
}

/// Box covering a shape over the body's whole recorded motion.
fn swept_aabb(body: &RigidBody, index: usize) -> Option<AABB> {
    let shape = body.shapes.get(index)?;
    let start = shape.compute_aabb(&body.sweep().transform_at(0.0));
    let end = shape.compute_aabb(&body.transform());
    Some(start.combine(&end))
}

impl PhysicsWorld {
    /// Handles impacts in time order until none is left or the event budget runs out.
    /// Returns the number of events handled.
    pub(super) fn solve_toi(&mut self, dt: f64) -> usize {
        self.refit_swept_proxies();

        let mut failed: BTreeSet<PairKey> = BTreeSet::new();
        let mut per_pair: BTreeMap<PairKey, usize> = BTreeMap::new();
        let mut events = 0;

        while events < self.config.max_toi_events {
            let Some((key, alpha)) = self.find_earliest_impact(&failed) else {
                break;
            };
            events += 1;

            let count = per_pair.entry(key).or_insert(0);
            *count += 1;
            if *count >= self.config.max_toi_per_pair {
                failed.insert(key);
            }

            if !self.resolve_impact(key, alpha, dt) {
                trace!(shape_a = %key.0, shape_b = %key.1, alpha, "impact not confirmed, skipping pair");
                failed.insert(key);
            }
        }

        if events == self.config.max_toi_events && events > 0 {
            debug!(events, "time of impact budget exhausted");
        }
        events
    }

    /// Grows the proxy of every awake body to cover its motion over the step, so the
    /// swept query also sees dynamic bodies that moved since the broadphase update.
    fn refit_swept_proxies(&mut self) {
        let mut pairs = Vec::new();
        for (index, body) in self.bodies.iter() {
            if !body.is_active() {
                continue;
            }
            let id = BodyId(index);
            let displacement = body.position - body.prev_position;
            for shape_index in 0..body.shapes.len() {
                let Some(swept) = swept_aabb(body, shape_index) else {
                    continue;
                };
                let shape = ShapeId::new(id, shape_index);
                if self.broadphase.move_proxy(shape, &swept, displacement) {
                    self.broadphase.find_pairs(shape, &mut pairs);
                }
            }
        }
        self.add_pairs(pairs);
    }

    /// Pairs a fast continuous body may hit this step, found with its swept box.
    fn toi_candidates(&self) -> BTreeSet<PairKey> {
        let mut candidates = BTreeSet::new();
        for (index, body) in self.bodies.iter() {
            if !body.continuous || !body.is_active() || body.sensor {
                continue;
            }
            let id = BodyId(index);
            for shape_index in 0..body.shapes.len() {
                let Some(swept) = swept_aabb(body, shape_index) else {
                    continue;
                };
                let shape = ShapeId::new(id, shape_index);
                self.broadphase.query(&swept, |other| {
                    if other.body != id {
                        candidates.insert(PairKey::new(shape, other));
                    }
                    true
                });
            }
        }
        candidates
    }

    /// The earliest impact among candidate pairs as `(pair, step fraction)`.
    fn find_earliest_impact(&self, failed: &BTreeSet<PairKey>) -> Option<(PairKey, f64)> {
        let mut earliest: Option<(PairKey, f64)> = None;

        for key in self.toi_candidates() {
            if failed.contains(&key) {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.bodies.get(key.0.body.0),
                self.bodies.get(key.1.body.0),
            ) else {
                continue;
            };
            if a.sensor || b.sensor || !a.filter.allows(&b.filter) {
                continue;
            }
            // Sleeping bodies are not swept against.
            if (a.asleep && !a.is_static) || (b.asleep && !b.is_static) {
                continue;
            }
            if (b.velocity - a.velocity).magnitude() < self.config.toi_min_relative_speed {
                continue;
            }

            let (Some(shape_a), Some(shape_b)) = (
                a.shapes.get(key.0.index as usize),
                b.shapes.get(key.1.index as usize),
            ) else {
                continue;
            };

            let mut sweep_a = a.sweep();
            let mut sweep_b = b.sweep();
            let alpha0 = sweep_a.alpha0.max(sweep_b.alpha0);
            if alpha0 >= 1.0 {
                continue;
            }
            if sweep_a.alpha0 < alpha0 {
                sweep_a.advance(alpha0);
            }
            if sweep_b.alpha0 < alpha0 {
                sweep_b.advance(alpha0);
            }

            let Some(t) = time_of_impact(shape_a, &sweep_a, shape_b, &sweep_b) else {
                continue;
            };
            let alpha = alpha0 + (1.0 - alpha0) * t;
            if earliest.map_or(true, |(_, best)| alpha < best) {
                earliest = Some((key, alpha));
            }
        }

        earliest
    }

    /// Moves a body to `alpha` of the step unless it is static or already past it.
    fn advance_body(&mut self, id: BodyId, alpha: f64) {
        if let Some(body) = self.bodies.get_mut(id.0) {
            if body.is_active() && body.alpha0 < alpha {
                advance(body, alpha);
                body.update_aabbs();
            }
        }
    }

    /// Re-solves a manifold at the current poses with the impact tolerance as margin.
    /// Returns whether it has contact points.
    fn confirm_contact(&mut self, key: PairKey) -> bool {
        let (Some(a), Some(b)) = (
            self.bodies.get(key.0.body.0),
            self.bodies.get(key.1.body.0),
        ) else {
            return false;
        };
        let manifold = self
            .manifolds
            .entry(key)
            .or_insert_with(|| Manifold::new(key, a, b));
        manifold.solve_within(false, a, b, TOI_TOLERANCE);
        manifold.is_collided()
    }

    fn restore_manifold(&mut self, key: PairKey, saved: Option<Manifold>) {
        match saved {
            Some(manifold) => {
                self.manifolds.insert(key, manifold);
            }
            None => {
                self.manifolds.remove(&key);
            }
        }
    }

    /// Handles one impact. Returns false, with everything rolled back, when the shapes do
    /// not actually touch at the impact pose.
    fn resolve_impact(&mut self, key: PairKey, alpha: f64, dt: f64) -> bool {
        let pair = [key.0.body, key.1.body];
        let saved: Vec<SavedPose> = pair
            .iter()
            .filter_map(|id| self.bodies.get(id.0).map(|body| SavedPose::capture(*id, body)))
            .collect();
        let saved_manifold = self.manifolds.get(&key).cloned();

        for id in pair {
            self.advance_body(id, alpha);
        }
        if !self.confirm_contact(key) {
            for pose in &saved {
                pose.restore(&mut self.bodies);
            }
            self.restore_manifold(key, saved_manifold);
            return false;
        }

        let mut members: Vec<BodyId> = pair
            .iter()
            .copied()
            .filter(|id| self.bodies.get(id.0).map_or(false, RigidBody::is_active))
            .collect();
        let mut contacts = vec![key];

        // One hop out: neighbors of the pair that touch it once moved to the impact time.
        let neighbors: Vec<PairKey> = self
            .manifolds
            .keys()
            .copied()
            .filter(|k| *k != key && (pair.contains(&k.0.body) || pair.contains(&k.1.body)))
            .collect();
        for neighbor_key in neighbors {
            let other = if pair.contains(&neighbor_key.0.body) {
                neighbor_key.1.body
            } else {
                neighbor_key.0.body
            };
            let Some(other_body) = self.bodies.get(other.0) else {
                continue;
            };
            if other_body.sensor || (other_body.asleep && !other_body.is_static) {
                continue;
            }

            let saved_neighbor_manifold = self.manifolds.get(&neighbor_key).cloned();
            let joins = other_body.is_active() && !members.contains(&other);
            let saved_other = SavedPose::capture(other, other_body);
            if joins {
                self.advance_body(other, alpha);
            }

            if self.confirm_contact(neighbor_key) {
                contacts.push(neighbor_key);
                if joins {
                    members.push(other);
                }
            } else {
                if joins {
                    saved_other.restore(&mut self.bodies);
                }
                self.restore_manifold(neighbor_key, saved_neighbor_manifold);
            }
        }

        self.solve_impact(&pair, &members, &contacts, alpha, dt);
        trace!(
            shape_a = %key.0,
            shape_b = %key.1,
            alpha,
            bodies = members.len(),
            contacts = contacts.len(),
            "impact resolved"
        );
        true
    }

    /// Local solve at the impact pose: position correction that only moves the impact
    /// pair, a cold velocity solve, then integration over the rest of the step.
    fn solve_impact(
        &mut self,
        pair: &[BodyId; 2],
        members: &[BodyId],
        contacts: &[PairKey],
        alpha: f64,
        dt: f64,
    ) {
        for _ in 0..self.config.position_iterations {
            for key in contacts {
                let (Some(manifold), Some((a, b))) = (
                    self.manifolds.get(key),
                    get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
                ) else {
                    continue;
                };
                let move_a = pair.contains(&key.0.body);
                let move_b = pair.contains(&key.1.body);
                manifold.positional_correction(a, b, move_a, move_b);
            }
        }

        for key in contacts {
            let (Some(manifold), Some((a, b))) = (
                self.manifolds.get_mut(key),
                get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
            ) else {
                continue;
            };
            manifold.initialize(a, b);
        }
        for _ in 0..self.config.velocity_iterations {
            for key in contacts {
                let (Some(manifold), Some((a, b))) = (
                    self.manifolds.get_mut(key),
                    get_mutable_body_pair(&mut self.bodies, key.0.body, key.1.body),
                ) else {
                    continue;
                };
                manifold.apply_impulse(a, b);
            }
        }

        let mut pairs = Vec::new();
        for id in members {
            let Some(body) = self.bodies.get_mut(id.0) else {
                continue;
            };
            if body.alpha0 < alpha {
                advance(body, alpha);
            }
            integrate_remaining(body, dt);
            body.update_aabbs();

            let displacement = body.position - body.prev_position;
            let aabbs = body.aabbs.clone();
            for (index, aabb) in aabbs.iter().enumerate() {
                let shape = ShapeId::new(*id, index);
                if self.broadphase.move_proxy(shape, aabb, displacement) {
                    self.broadphase.find_pairs(shape, &mut pairs);
                }
            }
        }
        self.add_pairs(pairs);
    }
}
