//! The aggregate cache service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{AccessGate, Action, Caller, Resource};
use crate::aggregate::bucket::EntitySummary;
use crate::aggregate::snapshot::{trailing_window, BucketSnapshot};
use crate::entity::EntityId;
use crate::error::{CacheResult, ValidationError};
use crate::fact::FactSource;
use crate::storage::{BucketStore, StorageError};

/// Outcome of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RebuildStatus {
    Succeeded,
    /// The previous snapshot is still being served.
    Failed { message: String },
}

/// Report returned by every rebuild attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub status: RebuildStatus,
    pub reference_date: NaiveDate,
    pub bucket_count: usize,
    pub entity_count: usize,
    pub fact_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Fingerprint of the new snapshot; `None` on failure.
    pub fingerprint: Option<String>,
}

impl RebuildReport {
    /// Returns true if the new snapshot went live.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.status, RebuildStatus::Succeeded)
    }
}

/// Description of the snapshot currently being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub reference_date: Option<NaiveDate>,
    pub built_at: Option<DateTime<Utc>>,
    pub retained_years: u32,
    pub bucket_count: usize,
    pub entity_count: usize,
    pub fact_count: u64,
    pub fingerprint: String,
}

/// Precomputed per-entity, per-year decision counts.
///
/// Rebuilds recompute everything from the fact source and swap the result in
/// whole. Reads never wait on a rebuild.
pub struct AggregateCache {
    facts: Arc<dyn FactSource>,
    store: Arc<dyn BucketStore>,
    gate: Arc<dyn AccessGate>,
    retained_years: u32,
    history_limit: usize,
    rebuild_lock: Mutex<()>,
    history: RwLock<VecDeque<RebuildReport>>,
}

impl AggregateCache {
    /// Create the cache over a fact source and bucket store.
    #[must_use]
    pub fn new(
        facts: Arc<dyn FactSource>,
        store: Arc<dyn BucketStore>,
        gate: Arc<dyn AccessGate>,
        retained_years: u32,
        history_limit: usize,
    ) -> Self {
        Self {
            facts,
            store,
            gate,
            retained_years: retained_years.max(1),
            history_limit: history_limit.max(1),
            rebuild_lock: Mutex::new(()),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Rebuild as of today (UTC).
    ///
    /// # Errors
    ///
    /// Only `AuthorizationError`. Rebuild failures come back as a report.
    pub fn rebuild(&self, caller: &Caller) -> CacheResult<RebuildReport> {
        self.rebuild_as_of(caller, Utc::now().date_naive())
    }

    /// Rebuild every bucket from facts dated within the retained window
    /// ending at `reference_date`, then swap the new set in.
    ///
    /// # Errors
    ///
    /// Only `AuthorizationError`. Rebuild failures come back as a report.
    pub fn rebuild_as_of(&self, caller: &Caller, reference_date: NaiveDate) -> CacheResult<RebuildReport> {
        self.gate
            .authorize(caller, Resource::AggregateCache, Action::Rebuild)?;

        // Concurrent rebuilds serialise here; readers never take this lock.
        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(%reference_date, retained_years = self.retained_years, "aggregate rebuild started");

        let outcome = self.build_and_swap(reference_date, started_at);
        let finished_at = Utc::now();
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = match outcome {
            Ok(info) => {
                tracing::info!(
                    %reference_date,
                    buckets = info.bucket_count,
                    entities = info.entity_count,
                    facts = info.fact_count,
                    duration_ms,
                    "aggregate rebuild finished"
                );
                RebuildReport {
                    status: RebuildStatus::Succeeded,
                    reference_date,
                    bucket_count: info.bucket_count,
                    entity_count: info.entity_count,
                    fact_count: info.fact_count,
                    started_at,
                    finished_at,
                    duration_ms,
                    fingerprint: Some(info.fingerprint),
                }
            }
            Err(err) => {
                tracing::warn!(%reference_date, error = %err, duration_ms, "aggregate rebuild failed; keeping previous snapshot");
                RebuildReport {
                    status: RebuildStatus::Failed {
                        message: err.to_string(),
                    },
                    reference_date,
                    bucket_count: 0,
                    entity_count: 0,
                    fact_count: 0,
                    started_at,
                    finished_at,
                    duration_ms,
                    fingerprint: None,
                }
            }
        };

        self.record(report.clone());
        Ok(report)
    }

    fn build_and_swap(
        &self,
        reference_date: NaiveDate,
        built_at: DateTime<Utc>,
    ) -> Result<SnapshotInfo, StorageError> {
        let (from, to) = trailing_window(reference_date, self.retained_years).ok_or_else(|| {
            StorageError::BackendError(format!(
                "cannot represent a {}-year window ending {reference_date}",
                self.retained_years
            ))
        })?;
        let facts = self.facts.facts_between(from, to)?;
        let snapshot = BucketSnapshot::build(&facts, reference_date, self.retained_years, built_at)?;
        let info = describe(&snapshot);
        self.store.swap(snapshot)?;
        Ok(info)
    }

    fn record(&self, report: RebuildReport) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        if history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(report);
    }

    fn check_window(&self, snapshot: &BucketSnapshot, window_years: u32) -> Result<(), ValidationError> {
        let retained = if snapshot.reference_date().is_some() {
            snapshot.retained_years()
        } else {
            self.retained_years
        };
        if window_years == 0 || window_years > retained {
            return Err(ValidationError::WindowOutOfRange {
                requested: window_years,
                retained,
            });
        }
        Ok(())
    }

    /// Buckets, total and date bounds for one entity over the trailing
    /// `window_years`. Unknown entities yield an empty summary.
    ///
    /// # Errors
    ///
    /// `AuthorizationError`, `ValidationError` for a window outside
    /// `1..=retained`, or a storage error.
    pub fn get_summary(
        &self,
        caller: &Caller,
        entity_id: EntityId,
        window_years: u32,
    ) -> CacheResult<EntitySummary> {
        self.gate.authorize(caller, Resource::AggregateCache, Action::Read)?;
        let snapshot = self.store.current()?;
        self.check_window(&snapshot, window_years)?;
        Ok(snapshot.summary(entity_id, window_years))
    }

    /// Summaries for many entities from a single snapshot. Every requested
    /// id is present in the result.
    ///
    /// # Errors
    ///
    /// Same as [`AggregateCache::get_summary`].
    pub fn get_batch_summaries(
        &self,
        caller: &Caller,
        entity_ids: &[EntityId],
        window_years: u32,
    ) -> CacheResult<HashMap<EntityId, EntitySummary>> {
        self.gate.authorize(caller, Resource::AggregateCache, Action::Read)?;
        let snapshot = self.store.current()?;
        self.check_window(&snapshot, window_years)?;
        Ok(entity_ids
            .iter()
            .map(|&id| (id, snapshot.summary(id, window_years)))
            .collect())
    }

    /// Describe the live snapshot.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` or a storage error.
    pub fn snapshot_info(&self, caller: &Caller) -> CacheResult<SnapshotInfo> {
        self.gate.authorize(caller, Resource::AggregateCache, Action::Read)?;
        let snapshot = self.store.current()?;
        Ok(describe(&snapshot))
    }

    /// Most recent rebuild report, if any.
    #[must_use]
    pub fn last_report(&self) -> Option<RebuildReport> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Recent rebuild reports, oldest first.
    #[must_use]
    pub fn rebuild_history(&self) -> Vec<RebuildReport> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

fn describe(snapshot: &BucketSnapshot) -> SnapshotInfo {
    SnapshotInfo {
        reference_date: snapshot.reference_date(),
        built_at: snapshot.built_at(),
        retained_years: snapshot.retained_years(),
        bucket_count: snapshot.bucket_count(),
        entity_count: snapshot.entity_count(),
        fact_count: snapshot.fact_count(),
        fingerprint: snapshot.fingerprint().to_string(),
    }
}
