//! Streaming Random Cut Forest core: Point Store, Weighted Reservoir
//! Sampler, Compact Random Cut Tree, and the Forest Update/Query
//! Coordinator that ties them together.
//!
//! ```ignore
//! let mut forest = Forest::builder()
//!     .dimensions(5)
//!     .number_of_trees(50)
//!     .sample_size(256)
//!     .random_seed(42)
//!     .build()?;
//! forest.update(&[0.1, 0.2, 0.3, 0.4, 0.5], 0)?;
//! let score = forest.score(&[0.1, 0.2, 0.3, 0.4, 0.5])?;
//! ```

pub mod bounding_box;
pub mod cut;
pub mod divector;
pub mod errors;
pub mod forest;
pub mod point_store;
pub mod sampler;
pub mod tree;
pub mod types;
pub mod visitor;
pub mod visitors;

pub use bounding_box::BoundingBox;
pub use divector::DiVector;
pub use errors::{RCFError, Result};
pub use forest::{Forest, ForestBuilder, ForestConfig};
pub use point_store::PointStore;
pub use sampler::{AcceptResult, Sampler};
pub use tree::CompactRandomCutTree;
pub use types::{NodeIndex, PointIndex, SequenceIndex};
pub use visitor::{MultiVisitor, NodeView, Visitor};
