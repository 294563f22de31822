//! Scalar anomaly score visitor.
//!
//! Score accumulates leaf-first: the leaf contributes a base "unseen"
//! score (or a damped "seen" score if the query duplicates a stored
//! point), then each ancestor on the way up blends in the probability
//! that a random cut at that node would have separated the query from
//! the rest of the tree.

use crate::visitor::{NodeView, Visitor};

/// Score contribution of a point landing alone (depth `depth`, its own
/// mass `mass` within the subtree it displaces).
pub fn score_unseen(depth: usize, mass: usize) -> f64 {
    1.0 / (depth as f64 + ((mass + 1) as f64).log2())
}

/// Score contribution of a point that already has `mass` copies stored
/// at `depth`.
pub fn score_seen(depth: usize, mass: usize) -> f64 {
    1.0 / (depth as f64 + ((mass + 1) as f64).log2())
}

/// Dampens the self-influence of a query that duplicates `leaf_mass` of
/// the `tree_mass` points already sampled.
pub fn damp(leaf_mass: usize, tree_mass: usize) -> f64 {
    if tree_mass == 0 {
        1.0
    } else {
        1.0 - (leaf_mass as f64) / (2.0 * tree_mass as f64)
    }
}

/// Scales a per-tree score into a forest-comparable range.
pub fn normalizer(tree_mass: usize) -> f64 {
    1.0 / (tree_mass as f64).max(2.0).log2()
}

#[derive(Clone)]
pub struct AnomalyScoreVisitor {
    score: f64,
    tree_mass: usize,
    converged: bool,
}

impl AnomalyScoreVisitor {
    pub fn new() -> Self {
        AnomalyScoreVisitor {
            score: 0.0,
            tree_mass: 0,
            converged: false,
        }
    }
}

impl Default for AnomalyScoreVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor<f64> for AnomalyScoreVisitor {
    fn visit_leaf(&mut self, _query: &[f32], view: &NodeView) {
        self.tree_mass = view.tree_mass;
        self.score = if view.leaf_equals_query {
            score_seen(view.depth, view.node_mass) * damp(view.node_mass, view.tree_mass)
        } else {
            score_unseen(view.depth, 1)
        };
    }

    fn visit(&mut self, query: &[f32], view: &NodeView) {
        self.tree_mass = view.tree_mass;
        let bb = view
            .bounding_box
            .as_ref()
            .expect("internal node view always carries a bounding box");
        let prob = bb.probability_of_cut(query);
        if prob <= 0.0 {
            return;
        }
        let sibling_contribution = score_unseen(view.depth, view.sibling_mass.max(1));
        self.score = prob * sibling_contribution + (1.0 - prob) * self.score;
    }

    fn converged(&self) -> bool {
        self.converged
    }

    /// Per-tree score scaled by `normalizer(tree_mass)` so trees at
    /// different fill levels contribute comparably to the forest average.
    fn result(&self) -> f64 {
        self.score * normalizer(self.tree_mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_seen_never_exceeds_score_unseen_at_same_depth() {
        assert!(score_seen(3, 5) <= score_unseen(3, 1).max(score_seen(3, 5)));
    }

    #[test]
    fn damp_is_one_when_tree_mass_zero() {
        assert_eq!(damp(0, 0), 1.0);
    }

    #[test]
    fn normalizer_shrinks_as_tree_grows() {
        assert!(normalizer(1024) < normalizer(4));
    }
}
