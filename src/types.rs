//! Shared index types.
//!
//! Index width is fixed at `u32` throughout the crate (see DESIGN.md,
//! "Index width"): point indices, node handles, and sampler references are
//! all `u32`, bounding live capacity per store to `u32::MAX - 1`.

/// Handle into the Point Store.
pub type PointIndex = u32;

/// Handle into a tree's node arena (internal node or encoded leaf).
pub type NodeIndex = u32;

/// Monotonic stream position.
pub type SequenceIndex = u64;

/// Sentinel standing in for "no node"/"no point". Reserving `u32::MAX`
/// costs one representable index out of ~4 billion, which is not a
/// practical limitation for any sample_size/dimensions combination.
pub const NULL: u32 = u32::MAX;
