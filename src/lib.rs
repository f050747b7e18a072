//! # courtcache - Aggregate caching and data-completeness tracking
//!
//! courtcache is the caching core of a judicial-research persistence layer.
//! It keeps three stores, each owned exclusively by this crate and read by
//! the API layer through one access gate:
//!
//! - **Aggregate cache**: per-entity, per-year decision counts rebuilt from
//!   the fact store on a schedule and swapped in whole, so batch reads cost
//!   one lookup per entity instead of one fact-store query per entity.
//! - **Completeness tracker**: per-entity ingestion flags and counters with a
//!   derived phase (`discovery` → ... → `complete`) and an independent
//!   analytics-readiness bit.
//! - **Analytics cache**: one computed JSON payload per entity, written only
//!   by the privileged writer.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use chrono::NaiveDate;
//! use courtcache::{CacheEngine, Caller, CoreConfig, EntityId, FactRecord, InMemoryFactStore};
//!
//! let facts = Arc::new(InMemoryFactStore::new());
//! let judge = EntityId::new();
//! facts.append(FactRecord::new(judge, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())).unwrap();
//!
//! let engine = CacheEngine::in_memory(CoreConfig::default(), facts).unwrap();
//! let service = Caller::service("nightly-rebuild");
//! engine
//!     .aggregates()
//!     .rebuild_as_of(&service, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
//!     .unwrap();
//!
//! let summary = engine.aggregates().get_summary(&Caller::public(), judge, 5).unwrap();
//! assert_eq!(summary.total, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod access;
pub mod config;
pub mod entity;
pub mod error;
pub mod fact;

// Stores and services
pub mod aggregate;
pub mod analytics;
pub mod completeness;
pub mod engine;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use access::{AccessGate, Action, Caller, DefaultAccessGate, Resource, Role};
pub use config::{CoreConfig, RuntimeConfig};
pub use entity::EntityId;
pub use error::{AuthorizationError, CacheError, CacheResult, ExecutionError, ValidationError};
pub use fact::{FactRecord, FactSource, InMemoryFactStore};

pub use aggregate::{AggregateBucket, AggregateCache, EntitySummary, RebuildReport, RebuildStatus};
pub use analytics::{AnalyticsCache, AnalyticsEntry, AnalyticsStats, CacheLookup};
pub use completeness::{
    CompletenessRecord, CompletenessTracker, Counter, Flag, Phase, ProgressUpdate, ReconcileReport,
};
pub use engine::runtime::{JobHandle, JobRuntime};
pub use engine::{CacheEngine, EngineStores, Job, JobOutcome};
pub use storage::{
    AnalyticsStore, BucketStore, CompletenessStore, InMemoryAnalyticsStore, InMemoryBucketStore,
    InMemoryCompletenessStore, StorageError,
};
