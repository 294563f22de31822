//! Error taxonomy for the forest and its component subsystems.
//!
//! `ConfigurationError` and `DimensionMismatch` are caller-facing: the
//! caller passed something invalid and can retry with corrected input.
//! `CapacityExhausted` lets an outer wrapper drop a sample without
//! corrupting state. `InvalidHandle` and `InvariantViolation` indicate a
//! bug in the core (or in another core component feeding it bad handles)
//! and are fatal -- the forest should not be used after either occurs.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RCFError {
    ConfigurationError { msg: String },
    DimensionMismatch { expected: usize, actual: usize },
    CapacityExhausted { msg: String },
    InvalidHandle { msg: String },
    InvariantViolation { msg: String },
}

impl fmt::Display for RCFError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RCFError::ConfigurationError { msg } => write!(f, "configuration error: {msg}"),
            RCFError::DimensionMismatch { expected, actual } => write!(
                f,
                "dimension mismatch: expected {expected}, got {actual}"
            ),
            RCFError::CapacityExhausted { msg } => write!(f, "capacity exhausted: {msg}"),
            RCFError::InvalidHandle { msg } => write!(f, "invalid handle: {msg}"),
            RCFError::InvariantViolation { msg } => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for RCFError {}

pub type Result<T> = std::result::Result<T, RCFError>;

/// If `test` is false, return a `ConfigurationError` with `msg`.
pub(crate) fn check_config(test: bool, msg: impl Into<String>) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(RCFError::ConfigurationError { msg: msg.into() })
    }
}

/// If `test` is false, return an `InvariantViolation` with `msg`. Internal
/// invariants are bugs, not recoverable caller errors -- invariant
/// violations abort the operation and leave the forest unusable.
pub(crate) fn check_invariant(test: bool, msg: impl Into<String>) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(RCFError::InvariantViolation { msg: msg.into() })
    }
}
