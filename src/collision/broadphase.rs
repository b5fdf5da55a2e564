//! Pair discovery over the dynamic tree.
//!
//! The broadphase only proposes pairs. The world keeps the persistent pair set (its
//! manifolds) and drops entries whose fat boxes separate.

use std::collections::BTreeMap;

use super::dynamic_tree::{DebugNode, DynamicTree};
use super::raycast::RayCastInput;
use super::AABB;
use crate::math::Vec2;
use crate::objects::{CollisionFilter, ShapeId};

/// Order-independent identity of a shape pair. The smaller id always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey(pub ShapeId, pub ShapeId);

impl PairKey {
    pub fn new(a: ShapeId, b: ShapeId) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }

    pub fn contains(&self, shape: ShapeId) -> bool {
        self.0 == shape || self.1 == shape
    }
}

#[derive(Debug, Clone, Copy)]
struct Proxy {
    node: usize,
    filter: CollisionFilter,
}

#[derive(Debug, Clone, Default)]
pub struct BroadPhase {
    tree: DynamicTree<ShapeId>,
    proxies: BTreeMap<ShapeId, Proxy>,
}

impl BroadPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shape and pushes every pair it now forms onto `pairs`.
    pub fn insert(
        &mut self,
        shape: ShapeId,
        aabb: &AABB,
        filter: CollisionFilter,
        pairs: &mut Vec<PairKey>,
    ) {
        if self.proxies.contains_key(&shape) {
            self.remove(shape);
        }
        let node = self.tree.insert(*aabb, shape);
        self.proxies.insert(shape, Proxy { node, filter });
        self.find_pairs(shape, pairs);
    }

    pub fn remove(&mut self, shape: ShapeId) -> bool {
        match self.proxies.remove(&shape) {
            Some(proxy) => {
                self.tree.remove(proxy.node);
                true
            }
            None => false,
        }
    }

    /// Refits a shape that moved by `displacement`. Returns true when its fat box changed,
    /// in which case the caller should look for new pairs.
    pub fn move_proxy(&mut self, shape: ShapeId, aabb: &AABB, displacement: Vec2) -> bool {
        match self.proxies.get(&shape) {
            Some(proxy) => self.tree.check_move(proxy.node, aabb, displacement),
            None => false,
        }
    }

    /// Refits every `(shape, aabb, displacement)` and returns candidate pairs of the
    /// shapes whose fat boxes changed.
    pub fn update<I>(&mut self, moved: I) -> Vec<PairKey>
    where
        I: IntoIterator<Item = (ShapeId, AABB, Vec2)>,
    {
        let reinserted: Vec<ShapeId> = moved
            .into_iter()
            .filter(|(shape, aabb, displacement)| self.move_proxy(*shape, aabb, *displacement))
            .map(|(shape, _, _)| shape)
            .collect();

        let mut pairs = Vec::new();
        for shape in reinserted {
            self.find_pairs(shape, &mut pairs);
        }
        pairs
    }

    /// Candidate pairs between `shape` and everything its fat box overlaps.
    pub fn find_pairs(&self, shape: ShapeId, pairs: &mut Vec<PairKey>) {
        let Some(proxy) = self.proxies.get(&shape) else {
            return;
        };
        let Some(fat) = self.tree.fat_aabb(proxy.node) else {
            return;
        };
        let filter = proxy.filter;
        self.tree.query(fat, |other| {
            if other.body == shape.body {
                return true;
            }
            let allowed = self
                .proxies
                .get(&other)
                .map_or(false, |p| filter.allows(&p.filter));
            if allowed {
                pairs.push(PairKey::new(shape, other));
            }
            true
        });
    }

    /// Whether the fat boxes of two shapes overlap.
    pub fn test_overlap(&self, a: ShapeId, b: ShapeId) -> bool {
        match (self.fat_aabb(a), self.fat_aabb(b)) {
            (Some(fa), Some(fb)) => fa.overlaps(fb),
            _ => false,
        }
    }

    pub fn fat_aabb(&self, shape: ShapeId) -> Option<&AABB> {
        self.proxies
            .get(&shape)
            .and_then(|p| self.tree.fat_aabb(p.node))
    }

    pub fn set_filter(&mut self, body_shapes: &[ShapeId], filter: CollisionFilter) {
        for shape in body_shapes {
            if let Some(proxy) = self.proxies.get_mut(shape) {
                proxy.filter = filter;
            }
        }
    }

    pub fn contains(&self, shape: ShapeId) -> bool {
        self.proxies.contains_key(&shape)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.proxies.clear();
    }

    pub fn query<F: FnMut(ShapeId) -> bool>(&self, aabb: &AABB, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn raycast<F: FnMut(&RayCastInput, ShapeId) -> f64>(&self, input: &RayCastInput, callback: F) {
        self.tree.raycast(input, callback);
    }

    pub fn debug_nodes(&self) -> Vec<DebugNode<ShapeId>> {
        self.tree.debug_nodes()
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::BodyId;

    fn shape(body: usize) -> ShapeId {
        ShapeId::new(BodyId(body), 0)
    }

    fn square(x: f64, y: f64) -> AABB {
        AABB::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    #[test]
    fn test_pair_key_is_canonical() {
        let a = shape(3);
        let b = shape(1);
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(a, b).0, b);
        assert!(PairKey::new(a, b).contains(a));
    }

    #[test]
    fn test_insert_reports_overlapping_pairs() {
        let mut bp = BroadPhase::new();
        let mut pairs = Vec::new();
        bp.insert(shape(0), &square(0.0, 0.0), CollisionFilter::default(), &mut pairs);
        assert!(pairs.is_empty());
        bp.insert(shape(1), &square(0.8, 0.0), CollisionFilter::default(), &mut pairs);
        bp.insert(shape(2), &square(10.0, 0.0), CollisionFilter::default(), &mut pairs);
        assert_eq!(pairs, vec![PairKey::new(shape(0), shape(1))]);
        assert!(bp.test_overlap(shape(0), shape(1)));
        assert!(!bp.test_overlap(shape(0), shape(2)));
    }

    #[test]
    fn test_same_body_and_filtered_pairs_are_skipped() {
        let mut bp = BroadPhase::new();
        let mut pairs = Vec::new();
        let a0 = ShapeId::new(BodyId(0), 0);
        let a1 = ShapeId::new(BodyId(0), 1);
        bp.insert(a0, &square(0.0, 0.0), CollisionFilter::default(), &mut pairs);
        bp.insert(a1, &square(0.2, 0.0), CollisionFilter::default(), &mut pairs);
        assert!(pairs.is_empty());

        let excluded = CollisionFilter::new(2, &[]).unwrap();
        let excluder = CollisionFilter::new(3, &[2]).unwrap();
        bp.insert(shape(5), &square(20.0, 0.0), excluded, &mut pairs);
        bp.insert(shape(6), &square(20.0, 0.1), excluder, &mut pairs);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_update_finds_new_pairs_after_motion() {
        let mut bp = BroadPhase::new();
        let mut pairs = Vec::new();
        bp.insert(shape(0), &square(0.0, 0.0), CollisionFilter::default(), &mut pairs);
        bp.insert(shape(1), &square(5.0, 0.0), CollisionFilter::default(), &mut pairs);
        assert!(pairs.is_empty());

        let found = bp.update([(shape(1), square(1.0, 0.0), Vec2::new(-4.0, 0.0))]);
        assert_eq!(found, vec![PairKey::new(shape(0), shape(1))]);

        // Small motion inside the fat box proposes nothing.
        let found = bp.update([(shape(0), square(0.01, 0.0), Vec2::new(0.01, 0.0))]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_remove_and_query() {
        let mut bp = BroadPhase::new();
        let mut pairs = Vec::new();
        for i in 0..5 {
            bp.insert(shape(i), &square(i as f64 * 3.0, 0.0), CollisionFilter::default(), &mut pairs);
        }
        assert!(bp.remove(shape(2)));
        assert!(!bp.remove(shape(2)));
        assert_eq!(bp.len(), 4);

        let mut hits = Vec::new();
        bp.query(&AABB::new(Vec2::new(-1.0, -1.0), Vec2::new(100.0, 1.0)), |s| {
            hits.push(s);
            true
        });
        hits.sort();
        assert_eq!(hits, vec![shape(0), shape(1), shape(3), shape(4)]);
    }
}
