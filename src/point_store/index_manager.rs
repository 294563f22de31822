//! Bitset + free-list index manager.
//!
//! Invariants maintained: `free_ptr == (index_cap - live_count) - 1` is
//! implicit in `free.len()`; every index in `free` has its `occupied` bit
//! clear; every cleared bit appears in `free` exactly once.

use crate::types::NodeIndex;

pub(crate) struct IndexManager {
    occupied: Vec<bool>,
    free: Vec<NodeIndex>,
}

impl IndexManager {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut free: Vec<NodeIndex> = (0..capacity as u32).collect();
        free.reverse();
        IndexManager {
            occupied: vec![false; capacity],
            free,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.occupied.len()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.occupied.len() - self.free.len()
    }

    /// Grow the manager's addressable range to `new_capacity`, adding the
    /// new indices to the free list. No-op if `new_capacity <= capacity()`.
    pub(crate) fn grow_to(&mut self, new_capacity: usize) {
        let old = self.occupied.len();
        if new_capacity <= old {
            return;
        }
        self.occupied.resize(new_capacity, false);
        let mut new_free: Vec<NodeIndex> = (old as u32..new_capacity as u32).collect();
        new_free.reverse();
        new_free.extend(std::mem::take(&mut self.free));
        self.free = new_free;
    }

    /// Allocate a fresh index, marking it occupied. Returns `None` if the
    /// manager has no free indices (caller decides whether to grow/compact
    /// and retry, or surface `CapacityExhausted`).
    pub(crate) fn allocate(&mut self) -> Option<NodeIndex> {
        let idx = self.free.pop()?;
        self.occupied[idx as usize] = true;
        Some(idx)
    }

    pub(crate) fn is_occupied(&self, index: NodeIndex) -> bool {
        self.occupied[index as usize]
    }

    /// Release `index` back to the free list. `index` must currently be
    /// occupied; releasing a free index would duplicate it in the free
    /// list and violate the one-appearance invariant.
    pub(crate) fn release(&mut self, index: NodeIndex) {
        debug_assert!(self.occupied[index as usize], "double release of index");
        self.occupied[index as usize] = false;
        self.free.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_round_trips() {
        let mut mgr = IndexManager::new(4);
        let a = mgr.allocate().unwrap();
        let b = mgr.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(mgr.live_count(), 2);
        mgr.release(a);
        assert_eq!(mgr.live_count(), 1);
        let c = mgr.allocate().unwrap();
        assert_eq!(c, a, "freed index should be reused");
    }

    #[test]
    fn exhausts_when_full() {
        let mut mgr = IndexManager::new(2);
        mgr.allocate().unwrap();
        mgr.allocate().unwrap();
        assert!(mgr.allocate().is_none());
    }

    #[test]
    fn grow_adds_fresh_indices() {
        let mut mgr = IndexManager::new(2);
        mgr.allocate().unwrap();
        mgr.allocate().unwrap();
        assert!(mgr.allocate().is_none());
        mgr.grow_to(4);
        assert!(mgr.allocate().is_some());
        assert!(mgr.allocate().is_some());
        assert!(mgr.allocate().is_none());
    }
}
