//! Dynamic AABB tree.
//!
//! Leaves hold fattened AABBs so small motions do not touch the tree. Internal nodes hold
//! the union of their children and the tree is kept height-balanced by rotations.

use super::raycast::RayCastInput;
use super::AABB;
use crate::math::Vec2;

/// Null node sentinel.
pub const NULL_NODE: usize = usize::MAX;

/// Margin added on every side of a leaf's true AABB.
pub const AABB_MARGIN: f64 = 0.2;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    aabb: AABB,
    parent: usize,
    children: [usize; 2],
    /// 0 for leaves, -1 for free nodes.
    height: i32,
    data: Option<T>,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL_NODE
    }
}

/// Snapshot of one node for visualization.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugNode<T> {
    pub aabb: AABB,
    pub height: i32,
    /// Set on leaves only.
    pub data: Option<T>,
}

#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    free_list: Vec<usize>,
    root: usize,
    leaf_count: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            leaf_count: 0,
        }
    }

    /// Adds a leaf for `aabb` and returns its node id.
    pub fn insert(&mut self, aabb: AABB, data: T) -> usize {
        let leaf = self.alloc_node();
        let node = &mut self.nodes[leaf];
        node.aabb = aabb.fatten(AABB_MARGIN);
        node.data = Some(data);
        node.height = 0;
        self.insert_leaf(leaf);
        leaf
    }

    pub fn remove(&mut self, leaf: usize) {
        if !self.is_live_leaf(leaf) {
            return;
        }
        self.remove_leaf(leaf);
        self.free_node(leaf);
    }

    /// Refits a leaf after its shape moved by `displacement`.
    ///
    /// Returns true when the leaf had to be reinserted.
    pub fn check_move(&mut self, leaf: usize, aabb: &AABB, displacement: Vec2) -> bool {
        if !self.is_live_leaf(leaf) {
            return false;
        }
        if self.nodes[leaf].aabb.contains(&aabb.extrude(displacement)) {
            return false;
        }

        self.remove_leaf(leaf);
        self.nodes[leaf].aabb = aabb.fatten(AABB_MARGIN).extrude(displacement * 2.0);
        self.insert_leaf(leaf);
        true
    }

    pub fn fat_aabb(&self, leaf: usize) -> Option<&AABB> {
        self.nodes.get(leaf).filter(|n| n.height >= 0).map(|n| &n.aabb)
    }

    pub fn data(&self, leaf: usize) -> Option<T> {
        self.nodes.get(leaf).and_then(|n| n.data)
    }

    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = NULL_NODE;
        self.leaf_count = 0;
    }

    /// Calls `callback` for every leaf overlapping `aabb`. Returning false stops the search.
    pub fn query<F: FnMut(T) -> bool>(&self, aabb: &AABB, mut callback: F) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(data) = node.data {
                    if !callback(data) {
                        return;
                    }
                }
            } else {
                stack.push(node.children[0]);
                stack.push(node.children[1]);
            }
        }
    }

    /// Walks the leaves a segment may hit.
    ///
    /// The callback gets the current segment and returns 0 to stop, a positive value to
    /// clip the segment to that fraction, or a negative value to ignore the leaf.
    pub fn raycast<F: FnMut(&RayCastInput, T) -> f64>(&self, input: &RayCastInput, mut callback: F) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        let v = Vec2::scalar_cross(1.0, r);
        let abs_v = v.abs();

        let mut segment = *input;
        let mut segment_aabb = AABB::new(p1, segment.point_at(segment.max_fraction));

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // Separating axis perpendicular to the segment.
            let separation =
                v.dot(p1 - node.aabb.center()).abs() - abs_v.dot(node.aabb.half_extents());
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let Some(data) = node.data else { continue };
                let value = callback(&segment, data);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    segment.max_fraction = value;
                    segment_aabb = AABB::new(p1, segment.point_at(value));
                }
            } else {
                stack.push(node.children[0]);
                stack.push(node.children[1]);
            }
        }
    }

    /// Every live node, internal ones included, in storage order.
    pub fn debug_nodes(&self) -> Vec<DebugNode<T>> {
        self.nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| DebugNode {
                aabb: n.aabb,
                height: n.height,
                data: n.data,
            })
            .collect()
    }

    fn is_live_leaf(&self, id: usize) -> bool {
        self.nodes
            .get(id)
            .map_or(false, |n| n.height == 0 && n.data.is_some())
    }

    fn alloc_node(&mut self) -> usize {
        let fresh = TreeNode {
            aabb: AABB::default(),
            parent: NULL_NODE,
            children: [NULL_NODE, NULL_NODE],
            height: 0,
            data: None,
        };
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = fresh;
            id
        } else {
            self.nodes.push(fresh);
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        node.height = -1;
        node.data = None;
        node.parent = NULL_NODE;
        node.children = [NULL_NODE, NULL_NODE];
        self.free_list.push(id);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        self.leaf_count += 1;
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        let leaf_aabb = self.nodes[leaf].aabb;
        let mut walk = self.root;
        while !self.nodes[walk].is_leaf() {
            let perimeter = self.nodes[walk].aabb.perimeter();
            let combined = leaf_aabb.combine(&self.nodes[walk].aabb).perimeter();
            let cost = 2.0 * combined;
            let inheritance = 2.0 * (combined - perimeter);

            let [c0, c1] = self.nodes[walk].children;
            let cost0 = self.descend_cost(c0, &leaf_aabb, inheritance);
            let cost1 = self.descend_cost(c1, &leaf_aabb, inheritance);

            if cost < cost0 && cost < cost1 {
                break;
            }
            walk = if cost0 < cost1 { c0 } else { c1 };
        }

        let old_parent = self.nodes[walk].parent;
        let new_parent = self.alloc_node();
        {
            let combined = leaf_aabb.combine(&self.nodes[walk].aabb);
            let height = self.nodes[walk].height + 1;
            let node = &mut self.nodes[new_parent];
            node.aabb = combined;
            node.parent = old_parent;
            node.height = height;
            node.children = [walk, leaf];
        }
        self.nodes[walk].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, walk, new_parent);
        }

        self.refit_upwards(new_parent);
    }

    fn descend_cost(&self, child: usize, leaf_aabb: &AABB, inheritance: f64) -> f64 {
        let node = &self.nodes[child];
        let combined = leaf_aabb.combine(&node.aabb).perimeter();
        if node.is_leaf() {
            combined + inheritance
        } else {
            combined - node.aabb.perimeter() + inheritance
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        self.leaf_count -= 1;
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let [c0, c1] = self.nodes[parent].children;
        let sibling = if c0 == leaf { c1 } else { c0 };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        } else {
            self.replace_child(grand_parent, parent, sibling);
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_upwards(grand_parent);
        }
        self.nodes[leaf].parent = NULL_NODE;
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        let children = &mut self.nodes[parent].children;
        if children[0] == old {
            children[0] = new;
        } else {
            children[1] = new;
        }
    }

    fn refit_upwards(&mut self, start: usize) {
        let mut walk = start;
        while walk != NULL_NODE {
            walk = self.balance(walk);
            let [c0, c1] = self.nodes[walk].children;
            let aabb = self.nodes[c0].aabb.combine(&self.nodes[c1].aabb);
            let height = self.nodes[c0].height.max(self.nodes[c1].height) + 1;
            let node = &mut self.nodes[walk];
            node.aabb = aabb;
            node.height = height;
            walk = node.parent;
        }
    }

    /// Rotates the taller child of `a` above it when the children's heights differ by more
    /// than one. Returns the node now occupying `a`'s slot.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let [b, c] = self.nodes[a].children;
        let diff = self.nodes[c].height - self.nodes[b].height;
        if diff > 1 {
            self.rotate_up(a, c, 1)
        } else if diff < -1 {
            self.rotate_up(a, b, 0)
        } else {
            a
        }
    }

    /// Promotes `child` (in slot `slot` of `a`) above `a`. Of the child's two children the
    /// taller stays with it and the other moves under `a`. Equal heights keep whichever
    /// split gives `a` the smaller box.
    fn rotate_up(&mut self, a: usize, child: usize, slot: usize) -> usize {
        let other = self.nodes[a].children[1 - slot];
        let [f, g] = self.nodes[child].children;

        let a_parent = self.nodes[a].parent;
        self.nodes[child].children[0] = a;
        self.nodes[child].parent = a_parent;
        self.nodes[a].parent = child;
        if a_parent == NULL_NODE {
            self.root = child;
        } else {
            self.replace_child(a_parent, a, child);
        }

        let (hf, hg) = (self.nodes[f].height, self.nodes[g].height);
        let keep_f = if hf != hg {
            hf > hg
        } else {
            let other_aabb = self.nodes[other].aabb;
            other_aabb.combine(&self.nodes[g].aabb).perimeter()
                <= other_aabb.combine(&self.nodes[f].aabb).perimeter()
        };
        let (kept, moved) = if keep_f { (f, g) } else { (g, f) };

        self.nodes[child].children[1] = kept;
        self.nodes[a].children[slot] = moved;
        self.nodes[moved].parent = a;

        let a_aabb = self.nodes[other].aabb.combine(&self.nodes[moved].aabb);
        let a_height = self.nodes[other].height.max(self.nodes[moved].height) + 1;
        self.nodes[a].aabb = a_aabb;
        self.nodes[a].height = a_height;

        self.nodes[child].aabb = a_aabb.combine(&self.nodes[kept].aabb);
        self.nodes[child].height = a_height.max(self.nodes[kept].height) + 1;
        child
    }

    /// Checks parent links, heights and boxes of the whole tree.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        if self.root == NULL_NODE {
            assert_eq!(self.leaf_count, 0);
            return;
        }
        assert_eq!(self.nodes[self.root].parent, NULL_NODE);
        let mut leaves = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                assert_eq!(node.height, 0);
                assert!(node.data.is_some());
                leaves += 1;
                continue;
            }
            let [c0, c1] = node.children;
            assert_eq!(self.nodes[c0].parent, id);
            assert_eq!(self.nodes[c1].parent, id);
            let (h0, h1) = (self.nodes[c0].height, self.nodes[c1].height);
            assert_eq!(node.height, h0.max(h1) + 1);
            assert_eq!(node.aabb, self.nodes[c0].aabb.combine(&self.nodes[c1].aabb));
            stack.push(c0);
            stack.push(c1);
        }
        assert_eq!(leaves, self.leaf_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, half: f64) -> AABB {
        AABB::new(Vec2::new(x - half, y - half), Vec2::new(x + half, y + half))
    }

    fn collect(tree: &DynamicTree<u32>, aabb: &AABB) -> Vec<u32> {
        let mut found = Vec::new();
        tree.query(aabb, |d| {
            found.push(d);
            true
        });
        found.sort_unstable();
        found
    }

    #[test]
    fn test_insert_fattens_and_queries() {
        let mut tree = DynamicTree::new();
        let id = tree.insert(square(0.0, 0.0, 0.5), 7u32);
        let fat = tree.fat_aabb(id).unwrap();
        assert!((fat.min.x - -0.7).abs() < 1e-12);
        assert_eq!(tree.data(id), Some(7));
        assert_eq!(collect(&tree, &square(0.6, 0.0, 0.05)), vec![7]);
        assert!(collect(&tree, &square(5.0, 0.0, 0.5)).is_empty());
    }

    #[test]
    fn test_tree_stays_balanced() {
        let mut tree = DynamicTree::new();
        for i in 0..64u32 {
            tree.insert(square(i as f64 * 2.0, 0.0, 0.5), i);
            tree.validate();
        }
        assert_eq!(tree.len(), 64);
        // A balanced tree of 64 leaves is far shallower than a list.
        assert!(tree.height() <= 16, "height {}", tree.height());
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut tree = DynamicTree::new();
        let mut boxes = Vec::new();
        for i in 0..40u32 {
            let x = ((i * 37) % 23) as f64 * 0.9;
            let y = ((i * 11) % 17) as f64 * 0.7;
            let b = square(x, y, 0.3 + (i % 3) as f64 * 0.2);
            let id = tree.insert(b, i);
            boxes.push((id, i));
        }
        tree.validate();

        let region = square(8.0, 5.0, 3.0);
        let mut expected: Vec<u32> = boxes
            .iter()
            .filter(|(id, _)| tree.fat_aabb(*id).unwrap().overlaps(&region))
            .map(|(_, d)| *d)
            .collect();
        expected.sort_unstable();
        assert_eq!(collect(&tree, &region), expected);
    }

    #[test]
    fn test_insert_remove_round_trip() {
        let mut tree = DynamicTree::new();
        let ids: Vec<usize> = (0..10u32)
            .map(|i| tree.insert(square(i as f64, 0.0, 0.4), i))
            .collect();
        let everything = square(5.0, 0.0, 20.0);
        let before = collect(&tree, &everything);

        let extra = tree.insert(square(3.0, 0.0, 0.4), 99);
        tree.validate();
        tree.remove(extra);
        tree.validate();

        assert_eq!(tree.len(), ids.len());
        assert_eq!(collect(&tree, &everything), before);

        for id in ids {
            tree.remove(id);
            tree.validate();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn test_query_stops_when_callback_returns_false() {
        let mut tree = DynamicTree::new();
        for i in 0..8u32 {
            tree.insert(square(0.0, 0.0, 1.0), i);
        }
        let mut calls = 0;
        tree.query(&square(0.0, 0.0, 1.0), |_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_check_move_small_motion_is_noop() {
        let mut tree = DynamicTree::new();
        let id = tree.insert(square(0.0, 0.0, 0.5), 1u32);
        let before = *tree.fat_aabb(id).unwrap();
        assert!(!tree.check_move(id, &square(0.05, 0.0, 0.5), Vec2::new(0.05, 0.0)));
        assert_eq!(*tree.fat_aabb(id).unwrap(), before);
    }

    #[test]
    fn test_check_move_extrudes_along_displacement() {
        let mut tree = DynamicTree::new();
        let id = tree.insert(square(0.0, 0.0, 0.5), 1u32);
        tree.insert(square(10.0, 0.0, 0.5), 2u32);
        assert!(tree.check_move(id, &square(1.0, 0.0, 0.5), Vec2::new(1.0, 0.0)));
        tree.validate();
        let fat = tree.fat_aabb(id).unwrap();
        assert!((fat.max.x - (1.5 + 0.2 + 2.0)).abs() < 1e-12);
        assert!((fat.min.x - (0.5 - 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_raycast_finds_closest_with_clipping() {
        let mut tree = DynamicTree::new();
        for i in 1..=5u32 {
            tree.insert(square(i as f64 * 2.0, 0.0, 0.5), i);
        }
        tree.insert(square(4.0, 5.0, 0.5), 100);

        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(20.0, 0.0));
        let mut best: Option<(u32, f64)> = None;
        tree.raycast(&input, |segment, data| {
            // Pretend every leaf is hit where its fat box starts.
            let fraction = (data as f64 * 2.0 - 0.7) / 20.0;
            if fraction > segment.max_fraction {
                return -1.0;
            }
            best = Some((data, fraction));
            fraction
        });
        assert_eq!(best.map(|b| b.0), Some(1));
    }

    #[test]
    fn test_raycast_skips_boxes_off_the_line() {
        let mut tree = DynamicTree::new();
        tree.insert(square(5.0, 5.0, 0.5), 1u32);
        tree.insert(square(5.0, 0.0, 0.5), 2u32);
        let mut seen = Vec::new();
        tree.raycast(&RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0)), |_, d| {
            seen.push(d);
            -1.0
        });
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn test_debug_nodes_lists_internal_and_leaves() {
        let mut tree = DynamicTree::new();
        tree.insert(square(0.0, 0.0, 0.5), 1u32);
        tree.insert(square(3.0, 0.0, 0.5), 2u32);
        let nodes = tree.debug_nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes.iter().filter(|n| n.data.is_some()).count(), 2);
        assert_eq!(nodes.iter().map(|n| n.height).max(), Some(1));
    }
}
