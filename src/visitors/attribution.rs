//! Per-dimension attribution visitor, producing a `DiVector` instead of a
//! scalar score using the same leaf-then-ancestor blending as
//! `AnomalyScoreVisitor`.

use crate::divector::DiVector;
use crate::visitor::{NodeView, Visitor};

use super::anomaly_score::score_unseen;

#[derive(Clone)]
pub struct AttributionVisitor {
    dimensions: usize,
    accumulated: DiVector,
}

impl AttributionVisitor {
    pub fn new(dimensions: usize) -> Self {
        AttributionVisitor {
            dimensions,
            accumulated: DiVector::empty(dimensions),
        }
    }
}

impl Visitor<DiVector> for AttributionVisitor {
    fn visit_leaf(&mut self, _query: &[f32], view: &NodeView) {
        self.accumulated = DiVector::empty(self.dimensions);
        if !view.leaf_equals_query {
            self.accumulated.normalize(score_unseen(view.depth, 1));
        }
    }

    fn visit(&mut self, query: &[f32], view: &NodeView) {
        let bb = view
            .bounding_box
            .as_ref()
            .expect("internal node view always carries a bounding box");
        let prob = bb.probability_of_cut(query);
        if prob <= 0.0 {
            return;
        }
        let mut cut_direction = DiVector::empty(self.dimensions);
        cut_direction.assign_as_probability_of_cut(bb, query);
        cut_direction.normalize(prob * score_unseen(view.depth, view.sibling_mass.max(1)));

        self.accumulated.scale(1.0 - prob);
        cut_direction.add_to(&mut self.accumulated);
    }

    fn converged(&self) -> bool {
        false
    }

    fn result(&self) -> DiVector {
        self.accumulated.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding_box::BoundingBox;

    #[test]
    fn leaf_duplicate_starts_at_zero_total() {
        let mut v = AttributionVisitor::new(2);
        let view = NodeView {
            depth: 2,
            node_mass: 3,
            sibling_mass: 0,
            tree_mass: 10,
            is_leaf: true,
            leaf_point: Some(vec![1.0, 1.0]),
            leaf_equals_query: true,
            bounding_box: None,
            cut_dimension: 0,
            cut_value: 0.0,
        };
        v.visit_leaf(&[1.0, 1.0], &view);
        assert_eq!(v.result().total(), 0.0);
    }

    #[test]
    fn ancestor_with_zero_cut_probability_does_not_change_total() {
        let mut v = AttributionVisitor::new(2);
        let leaf_view = NodeView {
            depth: 1,
            node_mass: 1,
            sibling_mass: 1,
            tree_mass: 4,
            is_leaf: true,
            leaf_point: Some(vec![0.0, 0.0]),
            leaf_equals_query: false,
            bounding_box: None,
            cut_dimension: 0,
            cut_value: 0.0,
        };
        v.visit_leaf(&[0.0, 0.0], &leaf_view);
        let before = v.result().total();
        let bb = BoundingBox::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
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
        v.visit(&[0.0, 0.0], &ancestor_view);
        assert_eq!(v.result().total(), before);
    }
}
