//! Reference-counted, compacting point arena.
//!
//! Stores deduplicated shingled points for every tree in the ensemble in
//! one flat `f32` buffer. Ingest is O(base_dim) amortized when consecutive
//! shingles overlap (the common sliding-window case); compaction keeps the
//! live region contiguous so the buffer never grows unbounded while the
//! stream runs.

pub(crate) mod index_manager;

use crate::errors::{RCFError, Result};
use crate::types::{PointIndex, SequenceIndex, NULL};
use index_manager::IndexManager;

pub struct PointStore {
    dimensions: usize,
    base_dim: usize,
    shingle_size: usize,
    internal_shingling: bool,
    internal_rotation: bool,
    dynamic_resizing: bool,
    capacity: usize,

    store: Vec<f32>,
    location: Vec<u32>,
    rotation_offset: Vec<u32>,
    ref_count: Vec<u32>,
    index_manager: IndexManager,
    start_of_free_segment: usize,

    last_known_shingle: Vec<f32>,
    shingle_fill: usize,
    next_tuple_position: usize,
    entries_seen: u64,
}

impl PointStore {
    pub fn new(
        dimensions: usize,
        shingle_size: usize,
        capacity: usize,
        initial_capacity: usize,
        internal_shingling: bool,
        internal_rotation: bool,
        dynamic_resizing: bool,
    ) -> Result<Self> {
        if internal_shingling {
            if dimensions % shingle_size != 0 {
                return Err(RCFError::ConfigurationError {
                    msg: "shingle_size must divide dimensions".into(),
                });
            }
        } else if internal_rotation {
            return Err(RCFError::ConfigurationError {
                msg: "internal rotation requires internal shingling".into(),
            });
        }
        let base_dim = if internal_shingling {
            dimensions / shingle_size
        } else {
            dimensions
        };
        let initial_capacity = initial_capacity.max(1);
        Ok(PointStore {
            dimensions,
            base_dim,
            shingle_size,
            internal_shingling,
            internal_rotation,
            dynamic_resizing,
            capacity,
            store: vec![0.0; initial_capacity * dimensions],
            location: vec![NULL; initial_capacity],
            rotation_offset: vec![0; initial_capacity],
            ref_count: vec![0; initial_capacity],
            index_manager: IndexManager::new(initial_capacity),
            start_of_free_segment: 0,
            last_known_shingle: vec![0.0; dimensions],
            shingle_fill: 0,
            next_tuple_position: 0,
            entries_seen: 0,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    pub fn size(&self) -> usize {
        self.index_manager.live_count()
    }

    pub fn start_of_free_segment(&self) -> usize {
        self.start_of_free_segment
    }

    /// The write granularity `compact()`/`add()` use: `base_dim` scalars
    /// when consecutive shingles can share a suffix, `dimensions`
    /// otherwise.
    pub fn step_dim(&self) -> usize {
        if self.overlap_eligible() {
            self.base_dim
        } else {
            self.dimensions
        }
    }

    /// Whether consecutive shingles share a `dimensions - base_dim` suffix
    /// and can use the O(base_dim) overlap-write path.
    fn overlap_eligible(&self) -> bool {
        self.internal_shingling && !self.internal_rotation && self.shingle_size > 1
    }

    /// Ingest a tuple (internal shingling) or a full D-vector (external),
    /// returning a fresh index, or `None` while the internal shingle is
    /// still filling up (fewer than `shingle_size` tuples seen).
    pub fn add(&mut self, tuple: &[f32], seq: SequenceIndex) -> Result<Option<PointIndex>> {
        let _ = seq;
        self.entries_seen += 1;
        let (point, rotation_offset): (Vec<f32>, u32) = if self.internal_shingling {
            if tuple.len() != self.base_dim {
                return Err(RCFError::DimensionMismatch {
                    expected: self.base_dim,
                    actual: tuple.len(),
                });
            }
            if self.internal_rotation {
                let pos = self.next_tuple_position;
                self.last_known_shingle[pos..pos + self.base_dim].copy_from_slice(tuple);
                self.next_tuple_position = (pos + self.base_dim) % self.dimensions;
            } else {
                self.last_known_shingle.copy_within(self.base_dim.., 0);
                let tail = self.dimensions - self.base_dim;
                self.last_known_shingle[tail..].copy_from_slice(tuple);
            }
            self.shingle_fill = (self.shingle_fill + 1).min(self.shingle_size);
            if self.shingle_fill < self.shingle_size {
                return Ok(None);
            }
            (
                self.last_known_shingle.clone(),
                self.next_tuple_position as u32,
            )
        } else {
            if tuple.len() != self.dimensions {
                return Err(RCFError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: tuple.len(),
                });
            }
            (tuple.to_vec(), 0)
        };

        let overlap = self.overlap_eligible()
            && self.start_of_free_segment >= self.dimensions - self.base_dim
            && {
                let tail_start = self.start_of_free_segment - (self.dimensions - self.base_dim);
                let tail = &self.store[tail_start..self.start_of_free_segment];
                tail == &point[0..self.dimensions - self.base_dim]
            };
        let needed = if overlap { self.base_dim } else { self.dimensions };

        self.ensure_room(needed)?;

        let write_offset = if overlap {
            self.start_of_free_segment - (self.dimensions - self.base_dim)
        } else {
            self.start_of_free_segment
        };
        let tail_values = &point[self.dimensions - needed..];
        self.store[self.start_of_free_segment..self.start_of_free_segment + needed]
            .copy_from_slice(tail_values);
        self.start_of_free_segment += needed;

        let idx = self.allocate_index()?;
        self.location[idx as usize] = write_offset as u32;
        self.rotation_offset[idx as usize] = rotation_offset;
        self.ref_count[idx as usize] = 1;
        Ok(Some(idx))
    }

    fn allocate_index(&mut self) -> Result<PointIndex> {
        loop {
            if let Some(idx) = self.index_manager.allocate() {
                if idx as usize >= self.location.len() {
                    self.location.resize(idx as usize + 1, NULL);
                    self.rotation_offset.resize(idx as usize + 1, 0);
                    self.ref_count.resize(idx as usize + 1, 0);
                }
                return Ok(idx);
            }
            if !self.dynamic_resizing || self.index_manager.capacity() >= self.capacity {
                return Err(RCFError::CapacityExhausted {
                    msg: "point store index capacity reached".into(),
                });
            }
            let grown = (self.index_manager.capacity() * 2).min(self.capacity);
            self.index_manager.grow_to(grown);
        }
    }

    /// Ensure the writable tail can hold `needed` more scalars, compacting
    /// and (if enabled) doubling capacity as required.
    fn ensure_room(&mut self, needed: usize) -> Result<()> {
        if self.start_of_free_segment + needed <= self.store.len() {
            return Ok(());
        }
        self.compact();
        if self.start_of_free_segment + needed <= self.store.len() {
            return Ok(());
        }
        if !self.dynamic_resizing {
            return Err(RCFError::CapacityExhausted {
                msg: "point store scalar buffer full".into(),
            });
        }
        let hard_max = self.capacity * self.dimensions;
        let mut new_len = self.store.len().max(self.dimensions);
        while new_len < self.start_of_free_segment + needed && new_len < hard_max {
            new_len = (new_len * 2).min(hard_max);
        }
        if new_len < self.start_of_free_segment + needed {
            return Err(RCFError::CapacityExhausted {
                msg: "point store reached hard capacity".into(),
            });
        }
        self.store.resize(new_len, 0.0);
        Ok(())
    }

    pub fn inc(&mut self, index: PointIndex) -> Result<u32> {
        self.check_live(index)?;
        self.ref_count[index as usize] += 1;
        Ok(self.ref_count[index as usize])
    }

    pub fn dec(&mut self, index: PointIndex) -> Result<u32> {
        self.check_live(index)?;
        let rc = &mut self.ref_count[index as usize];
        *rc -= 1;
        let new_rc = *rc;
        if new_rc == 0 {
            self.location[index as usize] = NULL;
            self.index_manager.release(index);
        }
        Ok(new_rc)
    }

    fn check_live(&self, index: PointIndex) -> Result<()> {
        let live = (index as usize) < self.location.len()
            && self.index_manager.is_occupied(index)
            && self.location[index as usize] != NULL;
        if live {
            Ok(())
        } else {
            Err(RCFError::InvalidHandle {
                msg: format!("point index {index} is not live"),
            })
        }
    }

    /// Copy the point out, de-rotating if rotation is enabled.
    pub fn get(&self, index: PointIndex) -> Result<Vec<f32>> {
        self.check_live(index)?;
        let start = self.location[index as usize] as usize;
        let raw = &self.store[start..start + self.dimensions];
        if self.internal_rotation {
            let rot = self.rotation_offset[index as usize] as usize;
            let mut out = Vec::with_capacity(self.dimensions);
            out.extend_from_slice(&raw[rot..]);
            out.extend_from_slice(&raw[..rot]);
            Ok(out)
        } else {
            Ok(raw.to_vec())
        }
    }

    /// Elementwise bitwise equality against a full D-length point.
    pub fn equals(&self, index: PointIndex, point: &[f32]) -> Result<bool> {
        let stored = self.get(index)?;
        Ok(stored.len() == point.len() && stored.iter().zip(point).all(|(a, b)| a == b))
    }

    /// Rewrite `store` so all live regions are packed contiguously from
    /// offset 0, preserving `get()` results and shared overlap suffixes.
    pub fn compact(&mut self) {
        let mut live: Vec<(u32, u32)> = Vec::with_capacity(self.index_manager.live_count());
        for idx in 0..self.location.len() as u32 {
            if self.index_manager.is_occupied(idx) && self.location[idx as usize] != NULL {
                live.push((self.location[idx as usize], idx));
            }
        }
        live.sort_unstable();

        let step = self.step_dim();
        let mut new_store: Vec<f32> = Vec::with_capacity(self.store.len());
        let mut prev_src: Option<usize> = None;
        for &(src_loc, idx) in &live {
            let src = src_loc as usize;
            // rotated points always take a full write, never a continuation.
            let continuation = !self.internal_rotation
                && step < self.dimensions
                && prev_src == Some(src.wrapping_sub(step));
            if continuation {
                let keep = self.dimensions - step;
                new_store.extend_from_slice(&self.store[src + keep..src + self.dimensions]);
            } else {
                new_store.extend_from_slice(&self.store[src..src + self.dimensions]);
            }
            let new_loc = new_store.len() - self.dimensions;
            self.location[idx as usize] = new_loc as u32;
            prev_src = Some(src);
        }
        self.start_of_free_segment = new_store.len();
        new_store.resize(self.store.len(), 0.0);
        self.store = new_store;
    }

    /// Map base_dim-space missing-coordinate indices (relative to the most
    /// recent tuple) into the current D-dimensional shingle coordinate
    /// system.
    pub fn transform_indices(&self, missing: &[usize]) -> Vec<usize> {
        if !self.internal_shingling {
            return missing.to_vec();
        }
        let base = if self.internal_rotation {
            self.next_tuple_position
        } else {
            self.dimensions - self.base_dim
        };
        missing.iter().map(|&i| (base + i) % self.dimensions).collect()
    }

    /// Project a base_dim-length tuple into a full D-length point using the
    /// current in-flight shingle as context for the remaining coordinates.
    pub fn transform_to_shingled(&self, tuple: &[f32]) -> Result<Vec<f32>> {
        if tuple.len() == self.dimensions {
            return Ok(tuple.to_vec());
        }
        if tuple.len() != self.base_dim || !self.internal_shingling {
            return Err(RCFError::DimensionMismatch {
                expected: self.dimensions,
                actual: tuple.len(),
            });
        }
        let mut shingle = self.last_known_shingle.clone();
        if self.internal_rotation {
            let pos = self.next_tuple_position;
            shingle[pos..pos + self.base_dim].copy_from_slice(tuple);
        } else {
            shingle.copy_within(self.base_dim.., 0);
            let tail = self.dimensions - self.base_dim;
            shingle[tail..].copy_from_slice(tuple);
        }
        Ok(shingle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(internal_shingling: bool, rotation: bool, shingle_size: usize) -> PointStore {
        PointStore::new(
            shingle_size * 2,
            shingle_size,
            256,
            4,
            internal_shingling,
            rotation,
            true,
        )
        .unwrap()
    }

    #[test]
    fn external_points_round_trip() {
        let mut ps = store(false, false, 1);
        let idx = ps.add(&[1.0, 2.0], 0).unwrap().unwrap();
        assert_eq!(ps.get(idx).unwrap(), vec![1.0, 2.0]);
        assert!(ps.equals(idx, &[1.0, 2.0]).unwrap());
        assert!(!ps.equals(idx, &[1.0, 3.0]).unwrap());
    }

    #[test]
    fn refcount_release_frees_index() {
        let mut ps = store(false, false, 1);
        let idx = ps.add(&[1.0, 2.0], 0).unwrap().unwrap();
        assert_eq!(ps.inc(idx).unwrap(), 2);
        assert_eq!(ps.dec(idx).unwrap(), 1);
        assert_eq!(ps.dec(idx).unwrap(), 0);
        assert!(ps.get(idx).is_err());
    }

    #[test]
    fn shingle_round_trip_sliding() {
        // shingle_size = 4, base_dim = 2 -> D = 8
        let mut ps = PointStore::new(8, 4, 256, 8, true, false, true).unwrap();
        let tuples: Vec<[f32; 2]> = (0..6).map(|i| [i as f32, (i * 10) as f32]).collect();
        let mut indices = Vec::new();
        for (seq, t) in tuples.iter().enumerate() {
            if let Some(idx) = ps.add(t, seq as u64).unwrap() {
                indices.push(idx);
            }
        }
        // K=6 tuples, shingle_size=4 -> 3 point indices.
        assert_eq!(indices.len(), 3);
        let expect0: Vec<f32> = vec![0.0, 0.0, 1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        assert_eq!(ps.get(indices[0]).unwrap(), expect0);
        let expect2: Vec<f32> = vec![2.0, 20.0, 3.0, 30.0, 4.0, 40.0, 5.0, 50.0];
        assert_eq!(ps.get(indices[2]).unwrap(), expect2);
    }

    #[test]
    fn overlap_write_uses_only_base_dim_scalars() {
        let mut ps = PointStore::new(8, 4, 256, 8, true, false, true).unwrap();
        for seq in 0..4u64 {
            let t = [seq as f32, seq as f32 + 100.0];
            ps.add(&t, seq).unwrap();
        }
        let before = ps.start_of_free_segment;
        let t5 = [4.0f32, 104.0];
        let idx5 = ps.add(&t5, 4).unwrap().unwrap();
        let after = ps.start_of_free_segment;
        assert_eq!(after - before, 2, "overlap write appends only base_dim scalars");
        assert_eq!(
            ps.get(idx5).unwrap(),
            vec![1.0, 101.0, 2.0, 102.0, 3.0, 103.0, 4.0, 104.0]
        );
    }

    #[test]
    fn compaction_preserves_values_and_updates_free_segment() {
        let mut ps = store(false, false, 1);
        let mut indices = Vec::new();
        for i in 0..6 {
            indices.push(ps.add(&[i as f32, i as f32], i as u64).unwrap().unwrap());
        }
        // release half of them, out of order
        ps.dec(indices[1]).unwrap();
        ps.dec(indices[3]).unwrap();
        ps.dec(indices[4]).unwrap();

        let mut expected = std::collections::HashMap::new();
        for &idx in &[indices[0], indices[2], indices[5]] {
            expected.insert(idx, ps.get(idx).unwrap());
        }

        ps.compact();

        for (idx, value) in &expected {
            assert_eq!(&ps.get(*idx).unwrap(), value);
        }
        assert_eq!(ps.start_of_free_segment, 3 * ps.dimensions);
    }

    #[test]
    fn rotated_shingle_derotates_on_get() {
        let mut ps = PointStore::new(6, 3, 256, 6, true, true, true).unwrap();
        let mut last = None;
        for seq in 0..5u64 {
            let t = [seq as f32, seq as f32 * 2.0];
            if let Some(idx) = ps.add(&t, seq).unwrap() {
                last = Some(idx);
            }
        }
        let idx = last.unwrap();
        // chronological order for the final 3 tuples (seq 2,3,4)
        let expect = vec![2.0, 4.0, 3.0, 6.0, 4.0, 8.0];
        assert_eq!(ps.get(idx).unwrap(), expect);
    }

    #[test]
    fn transform_to_shingled_fills_in_current_context() {
        let mut ps = PointStore::new(8, 4, 256, 8, true, false, true).unwrap();
        for seq in 0..3u64 {
            ps.add(&[seq as f32, seq as f32 * 10.0], seq).unwrap();
        }
        let shingled = ps.transform_to_shingled(&[3.0, 30.0]).unwrap();
        assert_eq!(
            shingled,
            vec![0.0, 0.0, 1.0, 10.0, 2.0, 20.0, 3.0, 30.0]
        );
        let full = vec![0.0; 8];
        assert_eq!(ps.transform_to_shingled(&full).unwrap(), full);
        assert!(ps.transform_to_shingled(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn transform_indices_maps_into_current_shingle_window() {
        let mut ps = PointStore::new(8, 4, 256, 8, true, false, true).unwrap();
        for seq in 0..4u64 {
            ps.add(&[seq as f32, seq as f32], seq).unwrap();
        }
        // base_dim=2, dimensions=8: the most recent tuple occupies [6, 8).
        assert_eq!(ps.transform_indices(&[0, 1]), vec![6, 7]);

        let ps_external = PointStore::new(4, 1, 256, 8, false, false, true).unwrap();
        assert_eq!(ps_external.transform_indices(&[0, 2]), vec![0, 2]);
    }
}
