//! Completeness tracker: per-entity ingestion progress and derived phase.

mod phase;
mod record;
mod tracker;

pub use phase::{derive, derive_phase, DerivedState, Phase, ProgressCounters, ReadinessFlags};
pub use record::{
    CompletenessRecord, Counter, CounterChange, Flag, ProgressUpdate, SyncTimestamps,
};
pub use tracker::{CompletenessTracker, ReconcileReport};
