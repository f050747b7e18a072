//! Storage traits and backends for the three owned stores.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{InMemoryAnalyticsStore, InMemoryBucketStore, InMemoryCompletenessStore};
pub use traits::{AnalyticsStore, BucketStore, CompletenessStore, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_snapshot_dir, LoadReport, SnapshotConfig, SnapshotDir};
