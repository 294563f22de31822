//! Forest Update/Query Coordinator.
//!
//! Owns the trees, their samplers, and the one shared Point Store.
//! Fan-out across trees uses `rayon`, gated behind
//! `parallel_execution_enabled`.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::divector::DiVector;
use crate::errors::{check_config, RCFError, Result};
use crate::point_store::PointStore;
use crate::sampler::{AcceptResult, Sampler};
use crate::tree::CompactRandomCutTree;
use crate::types::SequenceIndex;
use crate::visitor::{MultiVisitor, Visitor};
use crate::visitors::{AnomalyScoreVisitor, AttributionVisitor, ConvergingAccumulator, ImputeVisitor};

#[derive(Clone, Debug)]
pub struct ForestConfig {
    pub dimensions: usize,
    pub shingle_size: usize,
    pub number_of_trees: usize,
    pub sample_size: usize,
    pub time_decay: f64,
    pub output_after: usize,
    pub initial_accept_fraction: f64,
    pub bounding_box_cache_fraction: f64,
    pub center_of_mass_enabled: bool,
    pub store_sequence_indexes_enabled: bool,
    pub internal_shingling_enabled: bool,
    pub internal_rotation_enabled: bool,
    pub parallel_execution_enabled: bool,
    pub thread_pool_size: Option<usize>,
    pub random_seed: Option<u64>,
    pub point_store_capacity: usize,
}

pub struct ForestBuilder {
    dimensions: Option<usize>,
    shingle_size: usize,
    number_of_trees: usize,
    sample_size: usize,
    time_decay: f64,
    output_after: Option<usize>,
    initial_accept_fraction: f64,
    bounding_box_cache_fraction: f64,
    center_of_mass_enabled: bool,
    store_sequence_indexes_enabled: bool,
    internal_shingling_enabled: bool,
    internal_rotation_enabled: bool,
    parallel_execution_enabled: bool,
    thread_pool_size: Option<usize>,
    random_seed: Option<u64>,
    point_store_capacity: Option<usize>,
}

impl ForestBuilder {
    pub fn new() -> Self {
        ForestBuilder {
            dimensions: None,
            shingle_size: 1,
            number_of_trees: 50,
            sample_size: 256,
            time_decay: 1e-5,
            output_after: None,
            initial_accept_fraction: 1.0,
            bounding_box_cache_fraction: 1.0,
            center_of_mass_enabled: false,
            store_sequence_indexes_enabled: false,
            internal_shingling_enabled: false,
            internal_rotation_enabled: false,
            parallel_execution_enabled: false,
            thread_pool_size: None,
            random_seed: None,
            point_store_capacity: None,
        }
    }

    pub fn dimensions(mut self, v: usize) -> Self {
        self.dimensions = Some(v);
        self
    }
    pub fn shingle_size(mut self, v: usize) -> Self {
        self.shingle_size = v;
        self
    }
    pub fn number_of_trees(mut self, v: usize) -> Self {
        self.number_of_trees = v;
        self
    }
    pub fn sample_size(mut self, v: usize) -> Self {
        self.sample_size = v;
        self
    }
    pub fn time_decay(mut self, v: f64) -> Self {
        self.time_decay = v;
        self
    }
    pub fn output_after(mut self, v: usize) -> Self {
        self.output_after = Some(v);
        self
    }
    pub fn initial_accept_fraction(mut self, v: f64) -> Self {
        self.initial_accept_fraction = v;
        self
    }
    pub fn bounding_box_cache_fraction(mut self, v: f64) -> Self {
        self.bounding_box_cache_fraction = v;
        self
    }
    pub fn center_of_mass_enabled(mut self, v: bool) -> Self {
        self.center_of_mass_enabled = v;
        self
    }
    pub fn store_sequence_indexes_enabled(mut self, v: bool) -> Self {
        self.store_sequence_indexes_enabled = v;
        self
    }
    pub fn internal_shingling_enabled(mut self, v: bool) -> Self {
        self.internal_shingling_enabled = v;
        self
    }
    pub fn internal_rotation_enabled(mut self, v: bool) -> Self {
        self.internal_rotation_enabled = v;
        self
    }
    pub fn parallel_execution_enabled(mut self, v: bool) -> Self {
        self.parallel_execution_enabled = v;
        self
    }
    pub fn thread_pool_size(mut self, v: usize) -> Self {
        self.thread_pool_size = Some(v);
        self
    }
    pub fn random_seed(mut self, v: u64) -> Self {
        self.random_seed = Some(v);
        self
    }
    pub fn point_store_capacity(mut self, v: usize) -> Self {
        self.point_store_capacity = Some(v);
        self
    }

    pub fn build(self) -> Result<Forest> {
        let dimensions = self.dimensions.ok_or_else(|| RCFError::ConfigurationError {
            msg: "dimensions must be set".into(),
        })?;
        check_config(dimensions > 0, "dimensions must be positive")?;
        check_config(self.sample_size >= 2, "sample_size must be at least 2")?;
        check_config(self.number_of_trees > 0, "number_of_trees must be positive")?;
        check_config(self.time_decay >= 0.0, "time_decay must be non-negative")?;
        check_config(
            self.initial_accept_fraction > 0.0 && self.initial_accept_fraction <= 1.0,
            "initial_accept_fraction must be in (0, 1]",
        )?;
        check_config(
            (0.0..=1.0).contains(&self.bounding_box_cache_fraction),
            "bounding_box_cache_fraction must be in [0, 1]",
        )?;
        if self.internal_shingling_enabled {
            check_config(
                dimensions % self.shingle_size == 0,
                "shingle_size must divide dimensions",
            )?;
        } else {
            check_config(
                !self.internal_rotation_enabled,
                "internal rotation requires internal shingling",
            )?;
        }

        let output_after = self.output_after.unwrap_or(self.sample_size / 4);
        let point_store_capacity = self
            .point_store_capacity
            .unwrap_or(self.number_of_trees * self.sample_size * 2);

        let config = ForestConfig {
            dimensions,
            shingle_size: self.shingle_size,
            number_of_trees: self.number_of_trees,
            sample_size: self.sample_size,
            time_decay: self.time_decay,
            output_after,
            initial_accept_fraction: self.initial_accept_fraction,
            bounding_box_cache_fraction: self.bounding_box_cache_fraction,
            center_of_mass_enabled: self.center_of_mass_enabled,
            store_sequence_indexes_enabled: self.store_sequence_indexes_enabled,
            internal_shingling_enabled: self.internal_shingling_enabled,
            internal_rotation_enabled: self.internal_rotation_enabled,
            parallel_execution_enabled: self.parallel_execution_enabled,
            thread_pool_size: self.thread_pool_size,
            random_seed: self.random_seed,
            point_store_capacity,
        };

        Forest::from_config(config)
    }
}

impl Default for ForestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one tree's `AcceptResult` from the sampler fan-out: delete the
/// evicted leaf (if any) before inserting the new point.
fn apply_accept_result(
    tree: &mut CompactRandomCutTree,
    result: &AcceptResult,
    point_index: crate::types::PointIndex,
    seq: SequenceIndex,
    point_store: &PointStore,
) -> Result<()> {
    match *result {
        AcceptResult::AcceptedNew(_) => tree.insert(point_index, seq, point_store),
        AcceptResult::AcceptedReplacing {
            evicted_point_index,
            evicted_sequence_index,
        } => {
            tree.delete(evicted_point_index, evicted_sequence_index, point_store)?;
            tree.insert(point_index, seq, point_store)
        }
        AcceptResult::Rejected => Ok(()),
    }
}

pub struct Forest {
    config: ForestConfig,
    point_store: PointStore,
    trees: Vec<CompactRandomCutTree>,
    samplers: Vec<Sampler>,
    total_updates: u64,
    thread_pool: Option<rayon::ThreadPool>,
}

impl Forest {
    fn from_config(config: ForestConfig) -> Result<Self> {
        let mut seed_rng = ChaCha20Rng::seed_from_u64(config.random_seed.unwrap_or(42));

        let point_store = PointStore::new(
            config.dimensions,
            config.shingle_size,
            config.point_store_capacity,
            config.sample_size.max(16),
            config.internal_shingling_enabled,
            config.internal_rotation_enabled,
            true,
        )?;

        let mut trees = Vec::with_capacity(config.number_of_trees);
        let mut samplers = Vec::with_capacity(config.number_of_trees);
        for _ in 0..config.number_of_trees {
            let tree_seed = seed_rng.next_u64();
            let sampler_seed = seed_rng.next_u64();
            trees.push(CompactRandomCutTree::new(
                config.dimensions,
                config.sample_size,
                config.bounding_box_cache_fraction,
                config.store_sequence_indexes_enabled,
                config.center_of_mass_enabled,
                tree_seed,
            ));
            samplers.push(Sampler::new(
                config.sample_size,
                config.time_decay,
                config.initial_accept_fraction,
                sampler_seed,
            ));
        }

        let thread_pool = match config.thread_pool_size {
            Some(n) if config.parallel_execution_enabled => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| RCFError::ConfigurationError { msg: e.to_string() })?,
            ),
            _ => None,
        };

        Ok(Forest {
            config,
            point_store,
            trees,
            samplers,
            total_updates: 0,
            thread_pool,
        })
    }

    pub fn builder() -> ForestBuilder {
        ForestBuilder::new()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    pub fn is_output_ready(&self) -> bool {
        self.trees
            .iter()
            .filter(|t| t.leaf_count() >= self.config.output_after)
            .count()
            * 2
            > self.trees.len()
    }

    /// Run `f` once per tree index, fanning out across `rayon` when
    /// `parallel_execution_enabled` is set.
    fn run_fanout<T: Send>(&self, f: impl Fn(usize) -> T + Sync) -> Vec<T> {
        let n = self.trees.len();
        if !self.config.parallel_execution_enabled {
            return (0..n).map(f).collect();
        }
        let run = || (0..n).into_par_iter().map(&f).collect();
        match &self.thread_pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Ingest one input tuple.
    pub fn update(&mut self, tuple: &[f64], seq: SequenceIndex) -> Result<()> {
        self.total_updates += 1;
        let tuple_f32: Vec<f32> = tuple.iter().map(|&v| v as f32).collect();
        let point_index = match self.point_store.add(&tuple_f32, seq)? {
            Some(idx) => idx,
            None => return Ok(()),
        };

        let accept_results: Vec<AcceptResult> = if self.config.parallel_execution_enabled {
            let run = || {
                self.samplers
                    .par_iter_mut()
                    .map(|s| s.update(point_index, seq))
                    .collect()
            };
            match &self.thread_pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        } else {
            self.samplers
                .iter_mut()
                .map(|s| s.update(point_index, seq))
                .collect()
        };

        // Tree mutation only ever touches that tree's own arena, so this
        // pass can fan out freely; the shared Point Store is only read
        // here (`get`/`equals`) -- ref-count writes happen afterward,
        // serialized under a single writer.
        let point_store = &self.point_store;
        let insert_results: Vec<Result<()>> = if self.config.parallel_execution_enabled {
            let run = || {
                self.trees
                    .par_iter_mut()
                    .zip(&accept_results)
                    .map(|(tree, result)| {
                        apply_accept_result(tree, result, point_index, seq, point_store)
                    })
                    .collect()
            };
            match &self.thread_pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        } else {
            self.trees
                .iter_mut()
                .zip(&accept_results)
                .map(|(tree, result)| apply_accept_result(tree, result, point_index, seq, point_store))
                .collect()
        };
        for r in insert_results {
            r?;
        }

        let mut any_accept = false;
        for result in &accept_results {
            match *result {
                AcceptResult::AcceptedNew(idx) => {
                    self.point_store.inc(idx)?;
                    any_accept = true;
                }
                AcceptResult::AcceptedReplacing {
                    evicted_point_index,
                    ..
                } => {
                    self.point_store.dec(evicted_point_index)?;
                    self.point_store.inc(point_index)?;
                    any_accept = true;
                }
                AcceptResult::Rejected => {}
            }
        }
        if !any_accept {
            self.point_store.dec(point_index)?;
        }

        Ok(())
    }

    /// Single-path traversal, one visitor instance per tree, built from
    /// that tree by `factory`.
    pub fn traverse<V, R>(
        &self,
        query: &[f64],
        factory: impl Fn(&CompactRandomCutTree) -> V + Sync,
    ) -> Result<Vec<R>>
    where
        V: Visitor<R> + Send,
        R: Send,
    {
        let query_f32: Vec<f32> = query.iter().map(|&v| v as f32).collect();
        let results = self.run_fanout(|i| {
            self.trees[i].traverse(&query_f32, factory(&self.trees[i]), &self.point_store)
        });
        results.into_iter().collect()
    }

    /// Branching traversal, one visitor instance per tree, built from that
    /// tree by `factory`.
    pub fn traverse_multi<V, R>(
        &self,
        query: &[f64],
        factory: impl Fn(&CompactRandomCutTree) -> V + Sync,
    ) -> Result<Vec<R>>
    where
        V: MultiVisitor<R> + Send,
        R: Send,
    {
        let query_f32: Vec<f32> = query.iter().map(|&v| v as f32).collect();
        let results = self.run_fanout(|i| {
            self.trees[i].traverse_multi(&query_f32, factory(&self.trees[i]), &self.point_store)
        });
        results.into_iter().collect()
    }

    /// Aggregated anomaly score across all trees.
    pub fn score(&self, query: &[f64]) -> Result<f64> {
        let scores = self.traverse(query, |_tree| AnomalyScoreVisitor::new())?;
        let mut acc = ConvergingAccumulator::new(self.trees.len().max(1), 1.0);
        for s in scores {
            acc.combine(s);
        }
        Ok(acc.result())
    }

    /// Aggregated directional attribution across all trees.
    pub fn attribution(&self, query: &[f64]) -> Result<DiVector> {
        let dims = self.config.dimensions;
        let per_tree = self.traverse(query, |_tree| AttributionVisitor::new(dims))?;
        let mut total = DiVector::empty(dims);
        for v in &per_tree {
            v.add_to(&mut total);
        }
        if !per_tree.is_empty() {
            total.scale(1.0 / per_tree.len() as f64);
        }
        Ok(total)
    }

    /// Conditional imputation of `missing` coordinates in `query`, using
    /// the per-tree estimate closest (by ascent order) to the root.
    pub fn impute(&self, query: &[f64], missing: &[usize]) -> Result<Vec<f64>> {
        let query_f32: Vec<f32> = query.iter().map(|&v| v as f32).collect();
        let missing = missing.to_vec();
        let per_tree = self.traverse(query, move |_tree| ImputeVisitor::new(missing.clone()))?;

        let dims = self.config.dimensions;
        let mut sums = vec![0f64; dims];
        for point in &per_tree {
            for (s, &v) in sums.iter_mut().zip(point) {
                *s += v as f64;
            }
        }
        let n = per_tree.len().max(1) as f64;
        let mut out: Vec<f64> = query_f32.iter().map(|&v| v as f64).collect();
        for &i in &missing {
            if i < dims {
                out[i] = sums[i] / n;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_shingle_configuration() {
        let result = Forest::builder()
            .dimensions(5)
            .shingle_size(2)
            .internal_shingling_enabled(true)
            .build();
        assert!(matches!(result, Err(RCFError::ConfigurationError { .. })));
    }

    #[test]
    fn identical_inputs_collapse_to_mass() {
        let mut forest = Forest::builder()
            .dimensions(2)
            .number_of_trees(10)
            .sample_size(16)
            .random_seed(5)
            .build()
            .unwrap();
        for seq in 0..100u64 {
            forest.update(&[0.0, 0.0], seq).unwrap();
        }
        for tree in &forest.trees {
            if tree.mass() > 0 {
                assert!(tree.root_is_leaf());
            }
        }
    }

    #[test]
    fn is_output_ready_flips_after_warmup() {
        let mut forest = Forest::builder()
            .dimensions(2)
            .number_of_trees(5)
            .sample_size(16)
            .output_after(4)
            .random_seed(9)
            .build()
            .unwrap();
        assert!(!forest.is_output_ready());
        for seq in 0..200u64 {
            let p = [(seq % 7) as f64, (seq % 3) as f64];
            forest.update(&p, seq).unwrap();
        }
        assert!(forest.is_output_ready());
        assert_eq!(forest.total_updates(), 200);
    }

    #[test]
    fn anomaly_score_sanity() {
        let mut forest = Forest::builder()
            .dimensions(5)
            .number_of_trees(30)
            .sample_size(256)
            .random_seed(3)
            .build()
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(123);
        for seq in 0..3000u64 {
            let p: Vec<f64> = (0..5)
                .map(|_| {
                    let u: f64 = rng.next_u32() as f64 / u32::MAX as f64;
                    (u - 0.5) * 2.0
                })
                .collect();
            forest.update(&p, seq).unwrap();
        }
        let normal_score = forest.score(&[0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let anomaly_score = forest.score(&[50.0, 50.0, 50.0, 50.0, 50.0]).unwrap();
        assert!(anomaly_score > normal_score);
    }

    #[test]
    fn traversal_is_deterministic_given_same_seed() {
        let run = || {
            let mut forest = Forest::builder()
                .dimensions(3)
                .number_of_trees(8)
                .sample_size(64)
                .random_seed(77)
                .build()
                .unwrap();
            for seq in 0..500u64 {
                let p = [
                    (seq % 11) as f64,
                    (seq % 5) as f64 - 2.0,
                    ((seq * 7) % 13) as f64,
                ];
                forest.update(&p, seq).unwrap();
            }
            forest.score(&[1.0, -1.0, 4.0]).unwrap()
        };
        assert_eq!(run(), run());
    }
}
