//! Conditional imputation visitor.
//!
//! Ascends from the leaf the query would land at, tracking the leaf
//! point it last saw. Converges the first time an ancestor's bounding
//! box contains the query on its known coordinates -- at that point the
//! subtree below is consistent with what we know, and the last leaf
//! point seen is used as the estimate for the missing coordinates.

use crate::visitor::{NodeView, Visitor};

#[derive(Clone)]
pub struct ImputeVisitor {
    missing: Vec<usize>,
    best_point: Vec<f32>,
    converged: bool,
}

impl ImputeVisitor {
    pub fn new(missing: Vec<usize>) -> Self {
        ImputeVisitor {
            missing,
            best_point: Vec::new(),
            converged: false,
        }
    }

    fn missing_mask(&self, dimensions: usize) -> Vec<bool> {
        let mut mask = vec![false; dimensions];
        for &i in &self.missing {
            mask[i] = true;
        }
        mask
    }

    /// The query with its missing coordinates filled in from the best
    /// leaf point found so far.
    pub fn imputed_point(&self, query: &[f32]) -> Vec<f32> {
        let mut out = query.to_vec();
        for &i in &self.missing {
            if i < out.len() && i < self.best_point.len() {
                out[i] = self.best_point[i];
            }
        }
        out
    }
}

impl Visitor<Vec<f32>> for ImputeVisitor {
    fn visit_leaf(&mut self, _query: &[f32], view: &NodeView) {
        self.best_point = view
            .leaf_point
            .clone()
            .expect("leaf view always carries its stored point");
    }

    fn visit(&mut self, query: &[f32], view: &NodeView) {
        if self.converged {
            return;
        }
        let bb = view
            .bounding_box
            .as_ref()
            .expect("internal node view always carries a bounding box");
        let mask = self.missing_mask(query.len());
        let prob = bb.probability_of_cut_with_missing(query, Some(&mask));
        if prob == 0.0 {
            self.converged = true;
        }
    }

    fn converged(&self) -> bool {
        self.converged
    }

    fn result(&self) -> Vec<f32> {
        self.best_point.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding_box::BoundingBox;

    #[test]
    fn stops_once_box_contains_known_coordinates() {
        let mut v = ImputeVisitor::new(vec![1]);
        let leaf_view = NodeView {
            depth: 2,
            node_mass: 1,
            sibling_mass: 1,
            tree_mass: 4,
            is_leaf: true,
            leaf_point: Some(vec![3.0, 9.0]),
            leaf_equals_query: false,
            bounding_box: None,
            cut_dimension: 0,
            cut_value: 0.0,
        };
        v.visit_leaf(&[3.0, f32::NAN], &leaf_view);
        assert!(!v.converged());

        let bb = BoundingBox::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        let ancestor_view = NodeView {
            depth: 0,
            node_mass: 4,
            sibling_mass: 2,
            tree_mass: 4,
            is_leaf: false,
            leaf_point: None,
            leaf_equals_query: false,
            bounding_box: Some(bb),
            cut_dimension: 0,
            cut_value: 0.0,
        };
        v.visit(&[3.0, 0.0], &ancestor_view);
        assert!(v.converged());
        assert_eq!(v.result(), vec![3.0, 9.0]);
    }
}
