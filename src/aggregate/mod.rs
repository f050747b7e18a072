//! Aggregate cache: per-entity, per-year decision counts.
//!
//! Replaces one fact-store query per entity with lookups against a
//! precomputed snapshot keyed by `(entity_id, year)`.

mod bucket;
mod cache;
mod snapshot;

pub use bucket::{period_of, AggregateBucket, BucketKey, EntitySummary};
pub use cache::{AggregateCache, RebuildReport, RebuildStatus, SnapshotInfo};
pub use snapshot::{trailing_window, BucketSnapshot};
