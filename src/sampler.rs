//! Weighted reservoir sampler with time decay.
//!
//! Each tree owns one sampler. Entries form a max-heap on weight so the
//! highest-weight (least-preferred) entry is always at the root, ready to
//! be evicted in O(log sample_size).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;

use crate::types::{PointIndex, SequenceIndex, NULL};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcceptResult {
    Rejected,
    AcceptedNew(PointIndex),
    AcceptedReplacing {
        evicted_point_index: PointIndex,
        evicted_sequence_index: SequenceIndex,
    },
}

struct Entry {
    weight: f32,
    point_index: PointIndex,
    sequence_index: SequenceIndex,
}

pub struct Sampler {
    capacity: usize,
    time_decay: f64,
    initial_accept_fraction: f64,
    entries: Vec<Entry>,
    entries_seen: u64,
    rng: ChaCha20Rng,
}

impl Sampler {
    pub fn new(capacity: usize, time_decay: f64, initial_accept_fraction: f64, seed: u64) -> Self {
        Sampler {
            capacity,
            time_decay,
            initial_accept_fraction,
            entries: Vec::with_capacity(capacity),
            entries_seen: 0,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn fill_fraction(&self) -> f64 {
        self.entries.len() as f64 / self.capacity as f64
    }

    /// Total points presented to `update`, accepted or not -- distinct
    /// from `size()`, which only counts what's currently retained.
    pub fn entries_seen(&self) -> u64 {
        self.entries_seen
    }

    /// References currently held in the sample, in heap order.
    pub fn point_references(&self) -> Vec<PointIndex> {
        self.entries.iter().map(|e| e.point_index).collect()
    }

    fn weight(&mut self, seq: SequenceIndex) -> f32 {
        let u: f64 = self.rng.gen();
        (f64::ln(-f64::ln(u)) - (seq as f64) * self.time_decay) as f32
    }

    fn initial_accept_probability(&self, fill_fraction: f64) -> f64 {
        if fill_fraction < self.initial_accept_fraction {
            1.0
        } else if self.initial_accept_fraction >= 1.0 {
            0.0
        } else {
            1.0 - (fill_fraction - self.initial_accept_fraction) / (1.0 - self.initial_accept_fraction)
        }
    }

    /// Present `point_index` (first seen at sequence `seq`) to the
    /// reservoir, accepting, replacing, or rejecting it.
    pub fn update(&mut self, point_index: PointIndex, seq: SequenceIndex) -> AcceptResult {
        let weight = self.weight(seq);
        self.entries_seen += 1;

        if !self.is_full() {
            let cold_start_roll: f64 = self.rng.gen();
            let accept = cold_start_roll < self.initial_accept_probability(self.fill_fraction());
            if !accept {
                return AcceptResult::Rejected;
            }
            self.push(Entry {
                weight,
                point_index,
                sequence_index: seq,
            });
            return AcceptResult::AcceptedNew(point_index);
        }

        if weight < self.entries[0].weight {
            let evicted = self.replace_root(Entry {
                weight,
                point_index,
                sequence_index: seq,
            });
            AcceptResult::AcceptedReplacing {
                evicted_point_index: evicted.point_index,
                evicted_sequence_index: evicted.sequence_index,
            }
        } else {
            AcceptResult::Rejected
        }
    }

    fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
        let mut cur = self.entries.len() - 1;
        while cur > 0 {
            let parent = (cur - 1) / 2;
            if self.entries[parent].weight < self.entries[cur].weight {
                self.entries.swap(parent, cur);
                cur = parent;
            } else {
                break;
            }
        }
    }

    fn replace_root(&mut self, entry: Entry) -> Entry {
        let evicted = std::mem::replace(&mut self.entries[0], entry);
        self.sift_down(0);
        evicted
    }

    fn sift_down(&mut self, mut cur: usize) {
        loop {
            let left = 2 * cur + 1;
            let right = 2 * cur + 2;
            let mut largest = cur;
            if left < self.entries.len() && self.entries[left].weight > self.entries[largest].weight {
                largest = left;
            }
            if right < self.entries.len() && self.entries[right].weight > self.entries[largest].weight
            {
                largest = right;
            }
            if largest == cur {
                break;
            }
            self.entries.swap(cur, largest);
            cur = largest;
        }
    }

    /// Ties in weight are broken by sequence index, lowest first -- used
    /// only by tests asserting sampler-content determinism.
    #[cfg(test)]
    pub(crate) fn sorted_contents(&self) -> Vec<(f32, PointIndex, SequenceIndex)> {
        let mut v: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.weight, e.point_index, e.sequence_index))
            .collect();
        v.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.2.cmp(&b.2)));
        v
    }
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            weight: f32::MAX,
            point_index: NULL,
            sequence_index: 0,
        }
    }
}
