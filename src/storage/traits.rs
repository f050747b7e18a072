//! Abstract storage traits for courtcache.
//!
//! These traits define the contract that storage backends must implement.
//! The three stores are independent: no foreign key ties them together, and
//! an entity deleted elsewhere may leave stale rows behind until the
//! privileged writer cleans them up.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::aggregate::BucketSnapshot;
use crate::analytics::{AnalyticsEntry, AnalyticsStats};
use crate::completeness::{CompletenessRecord, Phase};
use crate::entity::EntityId;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holder of the live aggregate snapshot.
///
/// Implementations must make `swap` atomic with respect to `current`:
/// a reader observes either the previous snapshot or the new one.
pub trait BucketStore: Send + Sync {
    /// The snapshot currently served to readers.
    fn current(&self) -> Result<Arc<BucketSnapshot>, StorageError>;

    /// Replace the live snapshot wholesale.
    fn swap(&self, snapshot: BucketSnapshot) -> Result<(), StorageError>;
}

/// Storage for completeness records, one per entity.
///
/// # Safety Considerations
/// - `modify` must run its read-modify-write atomically per entity
/// - Secondary indexes must reflect the stored derived fields
pub trait CompletenessStore: Send + Sync {
    /// Get a record by entity.
    fn get(&self, entity_id: EntityId) -> Result<Option<CompletenessRecord>, StorageError>;

    /// Atomically load (or create with `CompletenessRecord::new(entity_id, now)`),
    /// mutate, and persist one record. Returns the stored result.
    fn modify(
        &self,
        entity_id: EntityId,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(&mut CompletenessRecord),
    ) -> Result<CompletenessRecord, StorageError>;

    /// Store a record exactly as given, without re-deriving anything.
    /// Used for restores and out-of-band writes; `reconcile` repairs them.
    fn replace(&self, record: CompletenessRecord) -> Result<(), StorageError>;

    /// Entities whose stored phase equals `phase`, ascending.
    fn list_by_phase(&self, phase: Phase) -> Result<Vec<EntityId>, StorageError>;

    /// Entities whose stored `is_complete` equals `complete`, ascending.
    fn list_by_complete(&self, complete: bool) -> Result<Vec<EntityId>, StorageError>;

    /// Entities whose stored `is_analytics_ready` equals `ready`, ascending.
    fn list_by_analytics_ready(&self, ready: bool) -> Result<Vec<EntityId>, StorageError>;

    /// Number of records per stored phase.
    fn phase_counts(&self) -> Result<BTreeMap<Phase, usize>, StorageError>;

    /// Every entity with a record, ascending.
    fn entity_ids(&self) -> Result<Vec<EntityId>, StorageError>;

    /// Every record (for sweeps and snapshots).
    fn all(&self) -> Result<Vec<CompletenessRecord>, StorageError>;
}

/// Storage for analytics cache entries, one per entity.
pub trait AnalyticsStore: Send + Sync {
    /// Get an entry by entity.
    fn get(&self, entity_id: EntityId) -> Result<Option<AnalyticsEntry>, StorageError>;

    /// Replace or insert. `created_at` survives replacement.
    fn upsert(
        &self,
        entity_id: EntityId,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsEntry, StorageError>;

    /// Store an entry exactly as given (restores).
    fn restore(&self, entry: AnalyticsEntry) -> Result<(), StorageError>;

    /// Remove one entry. Returns true if it existed.
    fn remove(&self, entity_id: EntityId) -> Result<bool, StorageError>;

    /// Remove everything. Returns the number of entries removed.
    fn clear(&self) -> Result<usize, StorageError>;

    /// Statistics as of `now`.
    fn stats(&self, now: DateTime<Utc>) -> Result<AnalyticsStats, StorageError>;

    /// Every entry.
    fn all(&self) -> Result<Vec<AnalyticsEntry>, StorageError>;
}
