//! Compact Random Cut Tree.
//!
//! Column-oriented node arena: internal nodes occupy handles `[0, cap)`
//! (`cap = sample_size - 1`), leaves are encoded as `cap + leaf_slot` so
//! `is_leaf(h) = h >= cap`. Parent pointers are not persisted -- every
//! operation that needs the path to a node re-descends from the root
//! using the node's own point instead, which costs at most
//! `O(log sample_size)`.

mod node_store;

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::bounding_box::BoundingBox;
use crate::cut::Cut;
use crate::errors::{check_invariant, RCFError, Result};
use crate::point_store::PointStore;
use crate::types::{NodeIndex, PointIndex, SequenceIndex, NULL};
use crate::visitor::{MultiVisitor, NodeView, Visitor};

use node_store::NodeStore;

pub struct CompactRandomCutTree {
    dimensions: usize,
    sample_size: usize,
    cap_internal: usize,
    store_sequence_indexes_enabled: bool,
    bounding_box_cache_fraction: f64,
    center_of_mass_enabled: bool,

    nodes: NodeStore,
    root: NodeIndex,
    tree_mass: usize,
    box_cache: HashMap<NodeIndex, BoundingBox>,
    point_index_to_leaf: HashMap<PointIndex, NodeIndex>,

    rng: ChaCha20Rng,
}

impl CompactRandomCutTree {
    pub fn new(
        dimensions: usize,
        sample_size: usize,
        bounding_box_cache_fraction: f64,
        store_sequence_indexes_enabled: bool,
        center_of_mass_enabled: bool,
        seed: u64,
    ) -> Self {
        let cap_internal = sample_size.saturating_sub(1);
        CompactRandomCutTree {
            dimensions,
            sample_size,
            cap_internal,
            store_sequence_indexes_enabled,
            bounding_box_cache_fraction,
            center_of_mass_enabled,
            nodes: NodeStore::new(cap_internal, sample_size),
            root: NULL,
            tree_mass: 0,
            box_cache: HashMap::new(),
            point_index_to_leaf: HashMap::new(),
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn mass(&self) -> usize {
        self.tree_mass
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.leaf_count()
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL
    }

    /// True if the tree currently has a single leaf at the root.
    pub fn root_is_leaf(&self) -> bool {
        !self.is_empty() && self.is_leaf(self.root)
    }

    fn is_leaf(&self, h: NodeIndex) -> bool {
        h as usize >= self.cap_internal
    }

    fn leaf_slot(&self, h: NodeIndex) -> usize {
        h as usize - self.cap_internal
    }

    fn leaf_handle(&self, slot: usize) -> NodeIndex {
        (self.cap_internal + slot) as NodeIndex
    }

    fn sibling_of(&self, parent: NodeIndex, child: NodeIndex) -> NodeIndex {
        if self.nodes.left[parent as usize] == child {
            self.nodes.right[parent as usize]
        } else {
            self.nodes.left[parent as usize]
        }
    }

    /// Root-to-leaf path `q` would take if inserted right now, following
    /// existing cuts.
    fn descend_path(&self, point: &[f32]) -> Vec<NodeIndex> {
        let mut path = Vec::new();
        let mut cur = self.root;
        while !self.is_leaf(cur) {
            path.push(cur);
            let idx = cur as usize;
            let go_left = point[self.nodes.cut_dimension[idx] as usize] <= self.nodes.cut_value[idx];
            cur = if go_left {
                self.nodes.left[idx]
            } else {
                self.nodes.right[idx]
            };
        }
        path.push(cur);
        path
    }

    fn box_of(&self, node: NodeIndex, point_store: &PointStore) -> Result<BoundingBox> {
        if let Some(b) = self.box_cache.get(&node) {
            return Ok(b.clone());
        }
        if self.is_leaf(node) {
            let slot = self.leaf_slot(node);
            let p = point_store.get(self.nodes.leaf_point_index[slot])?;
            Ok(BoundingBox::of_point(&p))
        } else {
            let idx = node as usize;
            let l = self.box_of(self.nodes.left[idx], point_store)?;
            let r = self.box_of(self.nodes.right[idx], point_store)?;
            Ok(l.merge(&r))
        }
    }

    /// Sum of stored points under `node`, for center-of-mass queries.
    /// Computed fresh each call (no persistent cache) -- see DESIGN.md.
    pub fn center_of_mass(&self, node: NodeIndex, point_store: &PointStore) -> Result<Vec<f64>> {
        if !self.center_of_mass_enabled {
            return Err(RCFError::ConfigurationError {
                msg: "center_of_mass_enabled is false".into(),
            });
        }
        self.point_sum(node, point_store)
    }

    fn point_sum(&self, node: NodeIndex, point_store: &PointStore) -> Result<Vec<f64>> {
        if self.is_leaf(node) {
            let slot = self.leaf_slot(node);
            let mass = self.nodes.mass[node as usize] as f64;
            let p = point_store.get(self.nodes.leaf_point_index[slot])?;
            Ok(p.iter().map(|&v| v as f64 * mass).collect())
        } else {
            let idx = node as usize;
            let mut l = self.point_sum(self.nodes.left[idx], point_store)?;
            let r = self.point_sum(self.nodes.right[idx], point_store)?;
            for (a, b) in l.iter_mut().zip(&r) {
                *a += b;
            }
            Ok(l)
        }
    }

    fn new_leaf(&mut self, point_index: PointIndex, seq: SequenceIndex) -> Result<NodeIndex> {
        let slot = self.nodes.allocate_leaf().ok_or_else(|| RCFError::CapacityExhausted {
            msg: "tree leaf arena full".into(),
        })?;
        self.nodes.leaf_point_index[slot] = point_index;
        self.nodes.leaf_duplicates[slot].clear();
        self.nodes.leaf_duplicates[slot].push(point_index);
        let handle = self.leaf_handle(slot);
        self.nodes.mass[handle as usize] = 1;
        if self.store_sequence_indexes_enabled {
            self.nodes.leaf_sequences[slot].clear();
            self.nodes.leaf_sequences[slot].push(seq);
        }
        Ok(handle)
    }

    /// Insert `point_index` (first seen at sequence `seq`) into the tree.
    pub fn insert(
        &mut self,
        point_index: PointIndex,
        seq: SequenceIndex,
        point_store: &PointStore,
    ) -> Result<()> {
        let point = point_store.get(point_index)?;
        check_invariant(point.len() == self.dimensions, "point dimension mismatch")?;

        if self.root == NULL {
            let leaf = self.new_leaf(point_index, seq)?;
            self.root = leaf;
            self.tree_mass = 1;
            self.point_index_to_leaf.insert(point_index, leaf);
            return Ok(());
        }

        let path = self.descend_path(&point);
        let leaf = *path.last().unwrap();
        let leaf_slot = self.leaf_slot(leaf);
        let existing_point = point_store.get(self.nodes.leaf_point_index[leaf_slot])?;

        if existing_point == point {
            self.nodes.mass[leaf as usize] += 1;
            self.nodes.leaf_duplicates[leaf_slot].push(point_index);
            if self.store_sequence_indexes_enabled {
                self.nodes.leaf_sequences[leaf_slot].push(seq);
            }
            for &anc in &path[..path.len() - 1] {
                self.nodes.mass[anc as usize] += 1;
                if let Some(b) = self.box_cache.get_mut(&anc) {
                    *b = b.merge_point(&point);
                }
            }
            self.tree_mass += 1;
            self.point_index_to_leaf.insert(point_index, leaf);
            return Ok(());
        }

        // Climb from the leaf to the root, keeping the outermost point at
        // which a random cut actually separates `point` from the existing
        // structure.
        let mut current_box = BoundingBox::of_point(&existing_point);
        let mut best: Option<(usize, Cut, BoundingBox)> = None;
        for i in (0..path.len()).rev() {
            let factor: f64 = self.rng.gen();
            let (cut, separates) = Cut::random_cut_and_separation(&current_box, factor, &point);
            if separates {
                best = Some((i, cut, current_box.clone()));
            }
            if i == 0 {
                break;
            }
            let parent = path[i - 1];
            let sibling = self.sibling_of(parent, path[i]);
            let sibling_box = self.box_of(sibling, point_store)?;
            current_box = current_box.merge(&sibling_box);
        }
        let (split_at, cut, split_box) =
            best.expect("a separating cut always exists for a non-duplicate point");
        let split_node = path[split_at];

        let new_leaf = self.new_leaf(point_index, seq)?;
        let new_internal = self.nodes.allocate_internal().ok_or_else(|| RCFError::CapacityExhausted {
            msg: "tree internal arena full".into(),
        })?;

        let point_is_left = cut.is_left(&point);
        let (left, right) = if point_is_left {
            (new_leaf, split_node)
        } else {
            (split_node, new_leaf)
        };
        self.nodes.left[new_internal as usize] = left;
        self.nodes.right[new_internal as usize] = right;
        self.nodes.cut_dimension[new_internal as usize] = cut.dimension as u32;
        self.nodes.cut_value[new_internal as usize] = cut.value;
        self.nodes.mass[new_internal as usize] = self.nodes.mass[split_node as usize] + 1;

        if split_at > 0 {
            let parent = path[split_at - 1];
            if self.nodes.left[parent as usize] == split_node {
                self.nodes.left[parent as usize] = new_internal;
            } else {
                self.nodes.right[parent as usize] = new_internal;
            }
        } else {
            self.root = new_internal;
        }

        let new_box = split_box.merge_point(&point);
        if self.rng.gen::<f64>() < self.bounding_box_cache_fraction {
            self.box_cache.insert(new_internal, new_box);
        }
        for &anc in &path[..split_at] {
            self.nodes.mass[anc as usize] += 1;
            if let Some(b) = self.box_cache.get_mut(&anc) {
                *b = b.merge_point(&point);
            }
        }

        self.tree_mass += 1;
        self.point_index_to_leaf.insert(point_index, new_leaf);
        Ok(())
    }

    /// Remove `point_index` (accepted at sequence `seq`) from the tree.
    pub fn delete(
        &mut self,
        point_index: PointIndex,
        seq: SequenceIndex,
        point_store: &PointStore,
    ) -> Result<()> {
        let leaf = self
            .point_index_to_leaf
            .remove(&point_index)
            .ok_or_else(|| RCFError::InvalidHandle {
                msg: format!("point index {point_index} not present in tree"),
            })?;
        let slot = self.leaf_slot(leaf);
        check_invariant(self.nodes.mass[leaf as usize] > 0, "delete on empty leaf")?;

        let point = point_store.get(self.nodes.leaf_point_index[slot])?;
        let path = self.descend_path(&point);
        check_invariant(*path.last().unwrap() == leaf, "delete path did not reach target leaf")?;

        self.nodes.mass[leaf as usize] -= 1;
        if self.store_sequence_indexes_enabled {
            if let Some(pos) = self.nodes.leaf_sequences[slot].iter().position(|&s| s == seq) {
                self.nodes.leaf_sequences[slot].remove(pos);
            }
        }
        if let Some(pos) = self.nodes.leaf_duplicates[slot].iter().position(|&idx| idx == point_index) {
            self.nodes.leaf_duplicates[slot].remove(pos);
        }
        for &anc in &path[..path.len() - 1] {
            self.nodes.mass[anc as usize] -= 1;
        }
        self.tree_mass -= 1;

        if self.nodes.mass[leaf as usize] > 0 {
            if self.nodes.leaf_point_index[slot] == point_index {
                self.nodes.leaf_point_index[slot] = *self.nodes.leaf_duplicates[slot]
                    .first()
                    .expect("positive leaf mass implies a live duplicate index remains");
            }
            return Ok(());
        }

        if path.len() == 1 {
            self.nodes.release_leaf(slot);
            self.root = NULL;
            return Ok(());
        }

        let parent = path[path.len() - 2];
        let sibling = self.sibling_of(parent, leaf);
        if path.len() >= 3 {
            let grandparent = path[path.len() - 3];
            if self.nodes.left[grandparent as usize] == parent {
                self.nodes.left[grandparent as usize] = sibling;
            } else {
                self.nodes.right[grandparent as usize] = sibling;
            }
        } else {
            self.root = sibling;
        }
        for &anc in &path[..path.len() - 2] {
            self.box_cache.remove(&anc);
        }
        self.nodes.release_internal(parent as usize);
        self.nodes.release_leaf(slot);
        Ok(())
    }

    fn leaf_view(&self, leaf: NodeIndex, depth: usize, query: &[f32], point_store: &PointStore) -> Result<NodeView> {
        let slot = self.leaf_slot(leaf);
        let stored = point_store.get(self.nodes.leaf_point_index[slot])?;
        let equals = stored.len() == query.len() && stored.iter().zip(query).all(|(a, b)| a == b);
        Ok(NodeView {
            depth,
            node_mass: self.nodes.mass[leaf as usize] as usize,
            sibling_mass: 0,
            tree_mass: self.tree_mass,
            is_leaf: true,
            leaf_point: Some(stored),
            leaf_equals_query: equals,
            bounding_box: None,
            cut_dimension: 0,
            cut_value: 0.0,
        })
    }

    fn internal_view(
        &self,
        node: NodeIndex,
        child_on_path: NodeIndex,
        depth: usize,
        point_store: &PointStore,
    ) -> Result<NodeView> {
        let idx = node as usize;
        let b = self.box_of(node, point_store)?;
        let sibling = self.sibling_of(node, child_on_path);
        Ok(NodeView {
            depth,
            node_mass: self.nodes.mass[idx] as usize,
            sibling_mass: self.nodes.mass[sibling as usize] as usize,
            tree_mass: self.tree_mass,
            is_leaf: false,
            leaf_point: None,
            leaf_equals_query: false,
            bounding_box: Some(b),
            cut_dimension: self.nodes.cut_dimension[idx] as usize,
            cut_value: self.nodes.cut_value[idx],
        })
    }

    /// Visit the leaf `query` would land at, then each ancestor in reverse
    /// (leaf-to-root) order until the visitor converges or the root is
    /// reached.
    pub fn traverse<V, R>(&self, query: &[f32], mut visitor: V, point_store: &PointStore) -> Result<R>
    where
        V: Visitor<R>,
    {
        if self.root == NULL {
            return Ok(visitor.result());
        }
        let path = self.descend_path(query);
        let leaf = *path.last().unwrap();
        let leaf_view = self.leaf_view(leaf, path.len() - 1, query, point_store)?;
        visitor.visit_leaf(query, &leaf_view);
        for i in (0..path.len() - 1).rev() {
            if visitor.converged() {
                break;
            }
            let view = self.internal_view(path[i], path[i + 1], i, point_store)?;
            visitor.visit(query, &view);
        }
        Ok(visitor.result())
    }

    /// Branching traversal: at each node the visitor may `trigger`, in
    /// which case a clone is sent down both children and the results are
    /// folded back in via `combine`.
    pub fn traverse_multi<V, R>(&self, query: &[f32], mut visitor: V, point_store: &PointStore) -> Result<R>
    where
        V: MultiVisitor<R>,
    {
        if self.root == NULL {
            return Ok(visitor.result());
        }
        self.traverse_multi_rec(self.root, query, &mut visitor, 0, point_store)?;
        Ok(visitor.result())
    }

    fn traverse_multi_rec<V, R>(
        &self,
        node: NodeIndex,
        query: &[f32],
        visitor: &mut V,
        depth: usize,
        point_store: &PointStore,
    ) -> Result<()>
    where
        V: MultiVisitor<R>,
    {
        if self.is_leaf(node) {
            let view = self.leaf_view(node, depth, query, point_store)?;
            visitor.visit_leaf(query, &view);
            return Ok(());
        }
        let idx = node as usize;
        let cut_is_left = query[self.nodes.cut_dimension[idx] as usize] <= self.nodes.cut_value[idx];
        let child_on_path = if cut_is_left {
            self.nodes.left[idx]
        } else {
            self.nodes.right[idx]
        };
        let view = self.internal_view(node, child_on_path, depth, point_store)?;

        if visitor.trigger(&view) {
            let mut left_visitor = visitor.clone();
            let mut right_visitor = visitor.clone();
            self.traverse_multi_rec(
                self.nodes.left[idx],
                query,
                &mut left_visitor,
                depth + 1,
                point_store,
            )?;
            self.traverse_multi_rec(
                self.nodes.right[idx],
                query,
                &mut right_visitor,
                depth + 1,
                point_store,
            )?;
            visitor.visit(query, &view);
            visitor.combine(left_visitor.result());
            visitor.combine(right_visitor.result());
        } else {
            self.traverse_multi_rec(child_on_path, query, visitor, depth + 1, point_store)?;
            visitor.visit(query, &view);
        }
        Ok(())
    }
}
