//! Statistics aggregation and hierarchical metrics export for a media relay.
//!
//! Lifecycle events mutate the accumulators in [`accounting`] through a
//! [`Statistics`] instance. On request, [`Statistics::gather_metrics`] reads
//! them into a flat [`MetricSequence`], which [`reconstruct_into`] turns into
//! a nested document.

pub mod accounting;
pub mod export;
pub mod stats;
pub mod time;

pub use export::{Collaborators, Dict, MetricSequence, TreeError, Value, reconstruct_into};
pub use stats::{CurrentStats, Statistics};
pub use time::Timestamp;
