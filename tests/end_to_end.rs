//! End-to-end scenarios exercising the forest and point store through
//! their public API.

use streaming_rcf::{BoundingBox, Forest, MultiVisitor, NodeView, PointStore, Visitor};

/// Small deterministic LCG so cluster generation doesn't need an extra
/// dependency; Box-Muller on top gives the two Gaussian clusters.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 11) as f64) / ((1u64 << 53) as f64)
    }

    fn gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Captures the bounding box of the subtree reached just below the root:
/// triggers only at the root (depth 0, visited exactly once per
/// traversal), then records the first node view seen on whichever side a
/// branch descends into.
#[derive(Clone, Default)]
struct RootChildBoxVisitor {
    captured: Option<BoundingBox>,
}

impl Visitor<Option<BoundingBox>> for RootChildBoxVisitor {
    fn visit_leaf(&mut self, _query: &[f32], view: &NodeView) {
        if self.captured.is_none() {
            if let Some(p) = &view.leaf_point {
                self.captured = Some(BoundingBox::of_point(p));
            }
        }
    }

    fn visit(&mut self, _query: &[f32], view: &NodeView) {
        if self.captured.is_none() {
            self.captured = view.bounding_box.clone();
        }
    }

    fn converged(&self) -> bool {
        self.captured.is_some()
    }

    fn result(&self) -> Option<BoundingBox> {
        self.captured.clone()
    }
}

impl MultiVisitor<Option<BoundingBox>> for RootChildBoxVisitor {
    fn trigger(&self, view: &NodeView) -> bool {
        view.depth == 0
    }

    fn combine(&mut self, branch_result: Option<BoundingBox>) {
        if self.captured.is_none() {
            self.captured = branch_result;
        }
    }
}

fn mid_point(b: &BoundingBox) -> Vec<f64> {
    b.min_values()
        .iter()
        .zip(b.max_values())
        .map(|(&lo, &hi)| ((lo + hi) as f64) / 2.0)
        .collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

#[test]
fn two_well_separated_clusters() {
    let mut forest = Forest::builder()
        .dimensions(2)
        .number_of_trees(10)
        .sample_size(256)
        .random_seed(13)
        .build()
        .unwrap();

    let mut rng = Lcg(424242);
    for seq in 0..1000u64 {
        let (cx, cy) = if seq % 2 == 0 { (0.0, 0.0) } else { (10.0, 10.0) };
        let p = [cx + rng.gaussian() * 0.1, cy + rng.gaussian() * 0.1];
        forest.update(&p, seq).unwrap();
    }

    let results = forest
        .traverse_multi(&[0.0, 0.0], |_tree| RootChildBoxVisitor::default())
        .unwrap();

    let mut separated = 0;
    for r in &results {
        if let Some(b) = r {
            let mid = mid_point(b);
            if distance(&mid, &[0.0, 0.0]) < 3.0 || distance(&mid, &[10.0, 10.0]) < 3.0 {
                separated += 1;
            }
        }
    }
    assert!(
        separated >= 9,
        "expected >= 9/10 trees to keep the root's two children tightly bounded around one cluster each, got {separated}"
    );
}

#[test]
fn capacity_and_compaction() {
    let dimensions = 8;
    let capacity = 256;
    let mut ps = PointStore::new(dimensions, 1, capacity, 8, false, false, true).unwrap();

    let mut live = std::collections::VecDeque::new();
    for seq in 0..1000u64 {
        let tuple: Vec<f32> = (0..dimensions).map(|d| ((seq as usize + d) % 23) as f32).collect();
        let idx = ps.add(&tuple, seq).unwrap().unwrap();
        live.push_back(idx);
        if live.len() > capacity {
            let evicted = live.pop_front().unwrap();
            ps.dec(evicted).unwrap();
        }
        if seq % 50 == 0 {
            ps.compact();
        }
    }

    assert!(ps.size() <= capacity);
    ps.compact();
    assert_eq!(ps.start_of_free_segment(), ps.size() * ps.step_dim());
}
