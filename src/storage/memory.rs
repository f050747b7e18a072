//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::aggregate::BucketSnapshot;
use crate::analytics::{AnalyticsEntry, AnalyticsStats};
use crate::completeness::{CompletenessRecord, Phase};
use crate::entity::EntityId;
use crate::storage::traits::{AnalyticsStore, BucketStore, CompletenessStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Live snapshot behind a lock that is only held long enough to clone or
/// replace an `Arc`.
#[derive(Debug)]
pub struct InMemoryBucketStore {
    live: RwLock<Arc<BucketSnapshot>>,
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self {
            live: RwLock::new(Arc::new(BucketSnapshot::empty())),
        }
    }
}

impl InMemoryBucketStore {
    /// Create a store serving the empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketStore for InMemoryBucketStore {
    fn current(&self) -> Result<Arc<BucketSnapshot>, StorageError> {
        let live = self.live.read().map_err(|_| lock_err("bucket.current"))?;
        Ok(Arc::clone(&live))
    }

    fn swap(&self, snapshot: BucketSnapshot) -> Result<(), StorageError> {
        let next = Arc::new(snapshot);
        let mut live = self.live.write().map_err(|_| lock_err("bucket.swap"))?;
        *live = next;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CompletenessState {
    by_id: HashMap<EntityId, CompletenessRecord>,
    by_phase: HashMap<Phase, BTreeSet<EntityId>>,
    by_complete: HashMap<bool, BTreeSet<EntityId>>,
    by_ready: HashMap<bool, BTreeSet<EntityId>>,
}

impl CompletenessState {
    fn unindex(&mut self, record: &CompletenessRecord) {
        let id = record.entity_id;
        if let Some(set) = self.by_phase.get_mut(&record.phase) {
            set.remove(&id);
        }
        if let Some(set) = self.by_complete.get_mut(&record.is_complete) {
            set.remove(&id);
        }
        if let Some(set) = self.by_ready.get_mut(&record.is_analytics_ready) {
            set.remove(&id);
        }
    }

    fn index(&mut self, record: &CompletenessRecord) {
        let id = record.entity_id;
        self.by_phase.entry(record.phase).or_default().insert(id);
        self.by_complete.entry(record.is_complete).or_default().insert(id);
        self.by_ready.entry(record.is_analytics_ready).or_default().insert(id);
    }

    fn store(&mut self, record: CompletenessRecord) {
        if let Some(prev) = self.by_id.remove(&record.entity_id) {
            self.unindex(&prev);
        }
        self.index(&record);
        self.by_id.insert(record.entity_id, record);
    }

    fn ids(set: Option<&BTreeSet<EntityId>>) -> Vec<EntityId> {
        set.map(|s| s.iter().copied().collect()).unwrap_or_default()
    }
}

/// Thread-safe in-memory completeness store with phase, completeness and
/// readiness indexes.
#[derive(Debug, Default)]
pub struct InMemoryCompletenessStore {
    state: RwLock<CompletenessState>,
}

impl InMemoryCompletenessStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletenessStore for InMemoryCompletenessStore {
    fn get(&self, entity_id: EntityId) -> Result<Option<CompletenessRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.get"))?;
        Ok(state.by_id.get(&entity_id).cloned())
    }

    fn modify(
        &self,
        entity_id: EntityId,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(&mut CompletenessRecord),
    ) -> Result<CompletenessRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("completeness.modify"))?;
        let mut record = state
            .by_id
            .get(&entity_id)
            .cloned()
            .unwrap_or_else(|| CompletenessRecord::new(entity_id, now));
        apply(&mut record);
        if record.entity_id != entity_id {
            return Err(StorageError::BackendError(format!(
                "completeness.modify changed the key: {entity_id} -> {}",
                record.entity_id
            )));
        }
        state.store(record.clone());
        Ok(record)
    }

    fn replace(&self, record: CompletenessRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("completeness.replace"))?;
        state.store(record);
        Ok(())
    }

    fn list_by_phase(&self, phase: Phase) -> Result<Vec<EntityId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.list_by_phase"))?;
        Ok(CompletenessState::ids(state.by_phase.get(&phase)))
    }

    fn list_by_complete(&self, complete: bool) -> Result<Vec<EntityId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.list_by_complete"))?;
        Ok(CompletenessState::ids(state.by_complete.get(&complete)))
    }

    fn list_by_analytics_ready(&self, ready: bool) -> Result<Vec<EntityId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.list_by_ready"))?;
        Ok(CompletenessState::ids(state.by_ready.get(&ready)))
    }

    fn phase_counts(&self) -> Result<BTreeMap<Phase, usize>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.phase_counts"))?;
        Ok(Phase::ALL
            .into_iter()
            .map(|p| (p, state.by_phase.get(&p).map_or(0, BTreeSet::len)))
            .collect())
    }

    fn entity_ids(&self) -> Result<Vec<EntityId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.entity_ids"))?;
        let mut ids: Vec<EntityId> = state.by_id.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn all(&self) -> Result<Vec<CompletenessRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("completeness.all"))?;
        let mut records: Vec<CompletenessRecord> = state.by_id.values().cloned().collect();
        records.sort_unstable_by_key(|r| r.entity_id);
        Ok(records)
    }
}

/// Thread-safe in-memory analytics cache.
#[derive(Debug, Default)]
pub struct InMemoryAnalyticsStore {
    entries: RwLock<HashMap<EntityId, AnalyticsEntry>>,
}

impl InMemoryAnalyticsStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalyticsStore for InMemoryAnalyticsStore {
    fn get(&self, entity_id: EntityId) -> Result<Option<AnalyticsEntry>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("analytics.get"))?;
        Ok(entries.get(&entity_id).cloned())
    }

    fn upsert(
        &self,
        entity_id: EntityId,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsEntry, StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("analytics.upsert"))?;
        let created_at = entries.get(&entity_id).map_or(now, |e| e.created_at);
        let entry = AnalyticsEntry {
            entity_id,
            payload,
            created_at,
            updated_at: now,
        };
        entries.insert(entity_id, entry.clone());
        Ok(entry)
    }

    fn restore(&self, entry: AnalyticsEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("analytics.restore"))?;
        entries.insert(entry.entity_id, entry);
        Ok(())
    }

    fn remove(&self, entity_id: EntityId) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("analytics.remove"))?;
        Ok(entries.remove(&entity_id).is_some())
    }

    fn clear(&self) -> Result<usize, StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("analytics.clear"))?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn stats(&self, now: DateTime<Utc>) -> Result<AnalyticsStats, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("analytics.stats"))?;
        Ok(AnalyticsStats::compute(entries.values(), now))
    }

    fn all(&self) -> Result<Vec<AnalyticsEntry>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("analytics.all"))?;
        let mut all: Vec<AnalyticsEntry> = entries.values().cloned().collect();
        all.sort_unstable_by_key(|e| e.entity_id);
        Ok(all)
    }
}
