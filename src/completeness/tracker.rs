//! The completeness tracker service.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::access::{AccessGate, Action, Caller, Resource};
use crate::completeness::phase::Phase;
use crate::completeness::record::{CompletenessRecord, ProgressUpdate};
use crate::entity::EntityId;
use crate::error::{CacheResult, ValidationError};
use crate::storage::CompletenessStore;

/// Result of a reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Records examined.
    pub scanned: usize,
    /// Records whose derived fields were stale and got rewritten.
    pub corrected: usize,
}

/// Tracks how complete each entity's dataset is.
pub struct CompletenessTracker {
    store: Arc<dyn CompletenessStore>,
    gate: Arc<dyn AccessGate>,
    ready_threshold: u64,
}

impl CompletenessTracker {
    /// Create a tracker. `ready_threshold` is the `total_cases_count` at
    /// which an entity becomes analytics-ready.
    #[must_use]
    pub fn new(store: Arc<dyn CompletenessStore>, gate: Arc<dyn AccessGate>, ready_threshold: u64) -> Self {
        Self {
            store,
            gate,
            ready_threshold,
        }
    }

    /// Threshold in effect.
    #[must_use]
    pub const fn ready_threshold(&self) -> u64 {
        self.ready_threshold
    }

    /// Merge `update` into the entity's record, creating it if needed.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` for non-service callers, `ValidationError` for
    /// empty or negative updates (nothing is written in either case), or a
    /// storage error.
    pub fn upsert_progress(
        &self,
        caller: &Caller,
        entity_id: EntityId,
        update: &ProgressUpdate,
    ) -> CacheResult<CompletenessRecord> {
        self.gate.authorize(caller, Resource::Completeness, Action::Update)?;
        update.validate(entity_id)?;

        let now = Utc::now();
        let threshold = self.ready_threshold;
        let mut merged = Ok(());
        let record = self.store.modify(entity_id, now, &mut |record| {
            merged = record.apply(update, now, threshold);
        })?;
        merged?;

        tracing::debug!(
            entity = %entity_id,
            phase = %record.phase,
            complete = record.is_complete,
            analytics_ready = record.is_analytics_ready,
            "completeness updated"
        );
        Ok(record)
    }

    /// Count an ingestion error against the entity. The phase is untouched.
    ///
    /// # Errors
    ///
    /// `AuthorizationError`, `ValidationError` for a blank message, or a
    /// storage error.
    pub fn record_error(
        &self,
        caller: &Caller,
        entity_id: EntityId,
        message: &str,
    ) -> CacheResult<CompletenessRecord> {
        self.gate.authorize(caller, Resource::Completeness, Action::Update)?;
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyErrorMessage.into());
        }

        let now = Utc::now();
        let record = self
            .store
            .modify(entity_id, now, &mut |record| record.note_error(message, now))?;
        tracing::warn!(entity = %entity_id, errors = record.error_count, error = message, "ingestion error recorded");
        Ok(record)
    }

    /// The entity's record; `None` if it was never seen.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn get(&self, caller: &Caller, entity_id: EntityId) -> CacheResult<Option<CompletenessRecord>> {
        self.gate.authorize(caller, Resource::Completeness, Action::Read)?;
        Ok(self.store.get(entity_id)?)
    }

    /// Entities currently in `phase`.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn list_by_phase(&self, caller: &Caller, phase: Phase) -> CacheResult<Vec<EntityId>> {
        self.gate.authorize(caller, Resource::Completeness, Action::Read)?;
        Ok(self.store.list_by_phase(phase)?)
    }

    /// Entities by `is_complete`.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn list_by_complete(&self, caller: &Caller, complete: bool) -> CacheResult<Vec<EntityId>> {
        self.gate.authorize(caller, Resource::Completeness, Action::Read)?;
        Ok(self.store.list_by_complete(complete)?)
    }

    /// Entities by `is_analytics_ready`.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn list_by_analytics_ready(&self, caller: &Caller, ready: bool) -> CacheResult<Vec<EntityId>> {
        self.gate.authorize(caller, Resource::Completeness, Action::Read)?;
        Ok(self.store.list_by_analytics_ready(ready)?)
    }

    /// How many entities sit in each phase.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn phase_counts(&self, caller: &Caller) -> CacheResult<BTreeMap<Phase, usize>> {
        self.gate.authorize(caller, Resource::Completeness, Action::Read)?;
        Ok(self.store.phase_counts()?)
    }

    /// Re-derive every record, rewriting the ones whose stored phase or
    /// booleans disagree with their flags and counters (flags written out
    /// of band, or a changed readiness threshold).
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn reconcile(&self, caller: &Caller) -> CacheResult<ReconcileReport> {
        self.gate.authorize(caller, Resource::Completeness, Action::Update)?;

        let threshold = self.ready_threshold;
        let mut report = ReconcileReport::default();
        for entity_id in self.store.entity_ids()? {
            report.scanned += 1;
            let mut corrected = false;
            // Re-derive under the store's lock so a concurrent upsert is
            // never overwritten with stale inputs.
            self.store.modify(entity_id, Utc::now(), &mut |record| {
                corrected = record.rederive(threshold);
            })?;
            if corrected {
                report.corrected += 1;
            }
        }

        tracing::info!(scanned = report.scanned, corrected = report.corrected, "completeness reconciliation finished");
        Ok(report)
    }
}
