//! Concrete Visitor/MultiVisitor implementations. None of these types are
//! needed by `tree`/`forest` to compile against the Visitor contract --
//! they are the reference implementations the forest's `score`,
//! `attribution`, and `impute` convenience methods call.

mod anomaly_score;
mod attribution;
mod converging_accumulator;
mod impute;

pub use anomaly_score::{damp, normalizer, score_seen, score_unseen, AnomalyScoreVisitor};
pub use attribution::AttributionVisitor;
pub use converging_accumulator::ConvergingAccumulator;
pub use impute::ImputeVisitor;
