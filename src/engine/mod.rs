//! Engine facade over the three owned stores.
//!
//! `CacheEngine` wires the aggregate cache, completeness tracker and
//! analytics cache to their storage backends, a fact source and one shared
//! access gate. Scheduled work is described as [`Job`]s and executed either
//! inline with [`CacheEngine::run`] or on the background [`runtime`].

/// Background runtime for scheduled jobs.
pub mod runtime;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::access::{AccessGate, Caller, DefaultAccessGate};
use crate::aggregate::{AggregateCache, RebuildReport};
use crate::analytics::AnalyticsCache;
use crate::completeness::{CompletenessTracker, ReconcileReport};
use crate::config::CoreConfig;
use crate::error::CacheResult;
use crate::fact::FactSource;
use crate::storage::{
    AnalyticsStore, BucketStore, CompletenessStore, InMemoryAnalyticsStore, InMemoryBucketStore,
    InMemoryCompletenessStore,
};

/// Work triggered by the external scheduler.
///
/// Jobs carry no identity. The [`Caller`] is supplied by whoever submits the
/// job, so a payload received from the scheduler cannot claim a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "job")]
pub enum Job {
    /// Rebuild the aggregate cache, as of `as_of` or today.
    RebuildAggregates {
        /// Reference date of the new snapshot.
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },
    /// Re-derive every completeness record.
    ReconcileCompleteness,
}

impl Job {
    /// Short name used for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RebuildAggregates { .. } => "rebuild_aggregates",
            Self::ReconcileCompleteness => "reconcile_completeness",
        }
    }
}

/// Result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Report of a rebuild attempt.
    Rebuilt(RebuildReport),
    /// Report of a reconciliation sweep.
    Reconciled(ReconcileReport),
}

/// Storage backends used by the engine.
#[derive(Clone)]
pub struct EngineStores {
    /// Live aggregate snapshot.
    pub buckets: Arc<dyn BucketStore>,
    /// Completeness records.
    pub completeness: Arc<dyn CompletenessStore>,
    /// Analytics cache entries.
    pub analytics: Arc<dyn AnalyticsStore>,
}

impl EngineStores {
    /// Fresh in-memory backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            buckets: Arc::new(InMemoryBucketStore::new()),
            completeness: Arc::new(InMemoryCompletenessStore::new()),
            analytics: Arc::new(InMemoryAnalyticsStore::new()),
        }
    }
}

/// The caching and completeness engine.
#[derive(Clone)]
pub struct CacheEngine {
    config: CoreConfig,
    aggregates: Arc<AggregateCache>,
    completeness: Arc<CompletenessTracker>,
    analytics: Arc<AnalyticsCache>,
}

impl CacheEngine {
    /// Create an engine with the default access gate.
    ///
    /// # Errors
    ///
    /// `ValidationError` if the configuration is invalid.
    pub fn new(config: CoreConfig, facts: Arc<dyn FactSource>, stores: EngineStores) -> CacheResult<Self> {
        Self::with_gate(config, facts, stores, Arc::new(DefaultAccessGate::new()))
    }

    /// Create an engine with an explicit access gate.
    ///
    /// # Errors
    ///
    /// `ValidationError` if the configuration is invalid.
    pub fn with_gate(
        config: CoreConfig,
        facts: Arc<dyn FactSource>,
        stores: EngineStores,
        gate: Arc<dyn AccessGate>,
    ) -> CacheResult<Self> {
        let config = config.validate()?;
        let aggregates = Arc::new(AggregateCache::new(
            facts,
            stores.buckets,
            Arc::clone(&gate),
            config.retained_window_years,
            config.rebuild_history_limit,
        ));
        let completeness = Arc::new(CompletenessTracker::new(
            stores.completeness,
            Arc::clone(&gate),
            config.analytics_ready_threshold,
        ));
        let analytics = Arc::new(AnalyticsCache::new(stores.analytics, gate));
        Ok(Self {
            config,
            aggregates,
            completeness,
            analytics,
        })
    }

    /// Engine over fresh in-memory stores.
    ///
    /// # Errors
    ///
    /// `ValidationError` if the configuration is invalid.
    pub fn in_memory(config: CoreConfig, facts: Arc<dyn FactSource>) -> CacheResult<Self> {
        Self::new(config, facts, EngineStores::in_memory())
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The aggregate cache.
    #[must_use]
    pub fn aggregates(&self) -> &AggregateCache {
        &self.aggregates
    }

    /// The completeness tracker.
    #[must_use]
    pub fn completeness(&self) -> &CompletenessTracker {
        &self.completeness
    }

    /// The analytics cache.
    #[must_use]
    pub fn analytics(&self) -> &AnalyticsCache {
        &self.analytics
    }

    /// Run a scheduled job on the calling thread on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// `AuthorizationError` for a non-service caller, or a storage error from
    /// reconciliation. A failed rebuild is an `Ok` outcome with a failed report.
    pub fn run(&self, caller: &Caller, job: &Job) -> CacheResult<JobOutcome> {
        tracing::debug!(
            job = job.name(),
            role = %caller.role,
            principal = caller.principal.as_deref().unwrap_or("-"),
            "running job"
        );
        match job {
            Job::RebuildAggregates { as_of } => {
                let report = match as_of {
                    Some(date) => self.aggregates.rebuild_as_of(caller, *date)?,
                    None => self.aggregates.rebuild(caller)?,
                };
                Ok(JobOutcome::Rebuilt(report))
            }
            Job::ReconcileCompleteness => {
                Ok(JobOutcome::Reconciled(self.completeness.reconcile(caller)?))
            }
        }
    }
}
