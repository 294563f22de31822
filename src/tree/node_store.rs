//! Column-oriented node arena backing a single tree.
//!
//! Internal nodes and leaves are allocated from separate free lists but
//! share one `mass` array indexed by handle, since handles from both
//! ranges are interchangeable as child pointers.

use crate::point_store::index_manager::IndexManager;
use crate::types::{NodeIndex, PointIndex, SequenceIndex, NULL};

pub(crate) struct NodeStore {
    pub(crate) left: Vec<NodeIndex>,
    pub(crate) right: Vec<NodeIndex>,
    pub(crate) cut_dimension: Vec<u32>,
    pub(crate) cut_value: Vec<f32>,
    pub(crate) mass: Vec<u32>,

    pub(crate) leaf_point_index: Vec<PointIndex>,
    pub(crate) leaf_sequences: Vec<Vec<SequenceIndex>>,
    /// Every store index currently aliased to this leaf through
    /// duplicate-valued inserts, `leaf_point_index[slot]` included. Lets
    /// `leaf_point_index` be rebound to another still-live alias when the
    /// one it currently holds gets evicted from the sampler out from
    /// under it.
    pub(crate) leaf_duplicates: Vec<Vec<PointIndex>>,

    internal_free: IndexManager,
    leaf_free: IndexManager,
}

impl NodeStore {
    pub(crate) fn new(cap_internal: usize, sample_size: usize) -> Self {
        NodeStore {
            left: vec![NULL; cap_internal],
            right: vec![NULL; cap_internal],
            cut_dimension: vec![0; cap_internal],
            cut_value: vec![0.0; cap_internal],
            mass: vec![0; cap_internal + sample_size],
            leaf_point_index: vec![NULL; sample_size],
            leaf_sequences: (0..sample_size).map(|_| Vec::new()).collect(),
            leaf_duplicates: (0..sample_size).map(|_| Vec::new()).collect(),
            internal_free: IndexManager::new(cap_internal),
            leaf_free: IndexManager::new(sample_size),
        }
    }

    pub(crate) fn leaf_count(&self) -> usize {
        self.leaf_free.live_count()
    }

    pub(crate) fn allocate_internal(&mut self) -> Option<NodeIndex> {
        self.internal_free.allocate()
    }

    pub(crate) fn allocate_leaf(&mut self) -> Option<usize> {
        self.leaf_free.allocate().map(|h| h as usize)
    }

    pub(crate) fn allocated_internal(&self, handle: usize) -> bool {
        self.internal_free.is_occupied(handle as NodeIndex)
    }

    pub(crate) fn release_internal(&mut self, handle: usize) {
        self.left[handle] = NULL;
        self.right[handle] = NULL;
        self.mass[handle] = 0;
        self.internal_free.release(handle as NodeIndex);
    }

    pub(crate) fn release_leaf(&mut self, slot: usize) {
        self.leaf_point_index[slot] = NULL;
        self.leaf_sequences[slot].clear();
        self.leaf_duplicates[slot].clear();
        self.leaf_free.release(slot as NodeIndex);
    }
}
