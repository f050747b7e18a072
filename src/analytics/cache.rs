//! The analytics cache service.

use std::sync::Arc;

use chrono::Utc;

use crate::access::{AccessGate, Action, Caller, Resource};
use crate::analytics::entry::{AnalyticsEntry, AnalyticsStats, CacheLookup};
use crate::entity::EntityId;
use crate::error::{CacheResult, ValidationError};
use crate::storage::AnalyticsStore;

/// Single-row-per-entity cache of computed analytics.
///
/// Reads never compute anything: a missing entry is reported as
/// [`CacheLookup::Miss`]. Writes are full replacements.
pub struct AnalyticsCache {
    store: Arc<dyn AnalyticsStore>,
    gate: Arc<dyn AccessGate>,
}

impl AnalyticsCache {
    /// Create the cache over a store.
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>, gate: Arc<dyn AccessGate>) -> Self {
        Self { store, gate }
    }

    /// Cached payload for the entity, or a miss.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn get(&self, caller: &Caller, entity_id: EntityId) -> CacheResult<CacheLookup> {
        self.gate.authorize(caller, Resource::AnalyticsCache, Action::Read)?;
        Ok(self.store.get(entity_id)?.into())
    }

    /// Replace (or insert) the entity's payload.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` for non-service callers, `ValidationError` for a
    /// JSON `null` payload, or a storage error.
    pub fn put(
        &self,
        caller: &Caller,
        entity_id: EntityId,
        payload: serde_json::Value,
    ) -> CacheResult<AnalyticsEntry> {
        self.gate.authorize(caller, Resource::AnalyticsCache, Action::Update)?;
        if payload.is_null() {
            return Err(ValidationError::NullPayload { entity_id }.into());
        }
        let entry = self.store.upsert(entity_id, payload, Utc::now())?;
        tracing::debug!(entity = %entity_id, "analytics entry written");
        Ok(entry)
    }

    /// Drop the entity's entry. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn invalidate(&self, caller: &Caller, entity_id: EntityId) -> CacheResult<usize> {
        self.gate.authorize(caller, Resource::AnalyticsCache, Action::Delete)?;
        let removed = usize::from(self.store.remove(entity_id)?);
        tracing::debug!(entity = %entity_id, removed, "analytics entry invalidated");
        Ok(removed)
    }

    /// Drop every entry. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn invalidate_all(&self, caller: &Caller) -> CacheResult<usize> {
        self.gate.authorize(caller, Resource::AnalyticsCache, Action::Delete)?;
        let removed = self.store.clear()?;
        tracing::info!(removed, "analytics cache cleared");
        Ok(removed)
    }

    /// Entry count, oldest/newest write and average age.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn stats(&self, caller: &Caller) -> CacheResult<AnalyticsStats> {
        self.gate.authorize(caller, Resource::AnalyticsCache, Action::Read)?;
        Ok(self.store.stats(Utc::now())?)
    }
}
