//! Visitor / MultiVisitor contracts.
//!
//! A `Visitor` is stateful, produced once per traversal, and not
//! thread-safe. It is invoked leaf-first then ancestor-upward; it may
//! short-circuit the ascent by reporting `converged() == true`.
//! `MultiVisitor` additionally supports branching traversal: at a node it
//! may `trigger`, at which point it is cloned and sent down both children,
//! and the two branch results are folded back in with `combine`.

use crate::bounding_box::BoundingBox;

/// What a traversal call saw at one node on the query's path.
#[derive(Clone, Debug)]
pub struct NodeView {
    pub depth: usize,
    /// mass of the subtree rooted at this node.
    pub node_mass: usize,
    /// mass of the sibling subtree not on the query's path (0 at a leaf).
    pub sibling_mass: usize,
    pub tree_mass: usize,
    pub is_leaf: bool,
    pub leaf_point: Option<Vec<f32>>,
    pub leaf_equals_query: bool,
    pub bounding_box: Option<BoundingBox>,
    pub cut_dimension: usize,
    pub cut_value: f32,
}

pub trait Visitor<R> {
    fn visit_leaf(&mut self, query: &[f32], view: &NodeView);
    fn visit(&mut self, query: &[f32], view: &NodeView);
    fn converged(&self) -> bool;
    fn result(&self) -> R;
}

pub trait MultiVisitor<R>: Visitor<R> + Clone {
    fn trigger(&self, view: &NodeView) -> bool;
    fn combine(&mut self, branch_result: R);
}
