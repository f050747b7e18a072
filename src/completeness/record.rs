//! Completeness records and partial progress updates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::completeness::phase::{derive, Phase, ProgressCounters, ReadinessFlags};
use crate::entity::EntityId;
use crate::error::ValidationError;

/// Readiness flag selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Positions,
    Education,
    PoliticalAffiliations,
}

/// Counter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Opinions,
    Dockets,
    TotalCases,
}

impl Counter {
    /// Field name used in error messages.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Opinions => "opinions_count",
            Self::Dockets => "dockets_count",
            Self::TotalCases => "total_cases_count",
        }
    }
}

/// How a counter changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum CounterChange {
    /// Overwrite with an absolute value.
    Set(i64),
    /// Add to the current value. Applied under the store's write lock, so
    /// concurrent increments never lose counts.
    Increment(i64),
}

impl CounterChange {
    const fn value(self) -> i64 {
        match self {
            Self::Set(v) | Self::Increment(v) => v,
        }
    }
}

/// When each sub-phase last reported progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTimestamps {
    pub positions_synced_at: Option<DateTime<Utc>>,
    pub education_synced_at: Option<DateTime<Utc>>,
    pub affiliations_synced_at: Option<DateTime<Utc>>,
    pub opinions_synced_at: Option<DateTime<Utc>>,
    pub dockets_synced_at: Option<DateTime<Utc>>,
}

/// Data-completeness state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessRecord {
    pub entity_id: EntityId,
    pub flags: ReadinessFlags,
    pub counters: ProgressCounters,
    /// Derived; recomputed on every write.
    pub phase: Phase,
    /// Derived; `phase == Complete`.
    pub is_complete: bool,
    /// Derived; `total_cases_count >= threshold`.
    pub is_analytics_ready: bool,
    pub synced: SyncTimestamps,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompletenessRecord {
    /// All-false record for an entity seen for the first time.
    #[must_use]
    pub fn new(entity_id: EntityId, now: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            flags: ReadinessFlags::default(),
            counters: ProgressCounters::default(),
            phase: Phase::Discovery,
            is_complete: false,
            is_analytics_ready: false,
            synced: SyncTimestamps::default(),
            error_count: 0,
            last_error: None,
            last_error_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the derived fields. Returns true if any of them changed.
    pub fn rederive(&mut self, ready_threshold: u64) -> bool {
        let state = derive(&self.flags, &self.counters, ready_threshold);
        let changed = state.phase != self.phase
            || state.is_complete != self.is_complete
            || state.is_analytics_ready != self.is_analytics_ready;
        self.phase = state.phase;
        self.is_complete = state.is_complete;
        self.is_analytics_ready = state.is_analytics_ready;
        changed
    }

    /// Merge an update. Only the fields named by the update are touched;
    /// derived fields are recomputed afterwards.
    ///
    /// # Errors
    ///
    /// Any [`ProgressUpdate::validate`] failure. The record is left
    /// unchanged.
    pub fn apply(
        &mut self,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
        ready_threshold: u64,
    ) -> Result<(), ValidationError> {
        update.validate(self.entity_id)?;

        for (&flag, &value) in &update.flags {
            match flag {
                Flag::Positions => {
                    self.flags.has_positions = value;
                    self.synced.positions_synced_at = Some(now);
                }
                Flag::Education => {
                    self.flags.has_education = value;
                    self.synced.education_synced_at = Some(now);
                }
                Flag::PoliticalAffiliations => {
                    self.flags.has_political_affiliations = value;
                    self.synced.affiliations_synced_at = Some(now);
                }
            }
        }

        for (&counter, &change) in &update.counters {
            let slot = match counter {
                Counter::Opinions => {
                    self.synced.opinions_synced_at = Some(now);
                    &mut self.counters.opinions_count
                }
                Counter::Dockets => {
                    self.synced.dockets_synced_at = Some(now);
                    &mut self.counters.dockets_count
                }
                Counter::TotalCases => &mut self.counters.total_cases_count,
            };
            let value = change.value().unsigned_abs();
            *slot = match change {
                CounterChange::Set(_) => value,
                CounterChange::Increment(_) => slot.saturating_add(value),
            };
        }

        self.updated_at = now;
        self.rederive(ready_threshold);
        Ok(())
    }

    /// Record an ingestion failure. Leaves flags, counters and phase alone.
    pub fn note_error(&mut self, message: &str, now: DateTime<Utc>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(message.to_string());
        self.last_error_at = Some(now);
        self.updated_at = now;
    }
}

/// A partial set of flag and counter changes for one entity.
///
/// ```
/// use courtcache::completeness::{Counter, Flag, ProgressUpdate};
///
/// let update = ProgressUpdate::new()
///     .flag(Flag::Positions, true)
///     .increment(Counter::Opinions, 3);
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    flags: BTreeMap<Flag, bool>,
    counters: BTreeMap<Counter, CounterChange>,
}

impl ProgressUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag.
    #[must_use]
    pub fn flag(mut self, flag: Flag, value: bool) -> Self {
        self.flags.insert(flag, value);
        self
    }

    /// Overwrite a counter.
    #[must_use]
    pub fn set(mut self, counter: Counter, value: i64) -> Self {
        self.counters.insert(counter, CounterChange::Set(value));
        self
    }

    /// Add to a counter.
    #[must_use]
    pub fn increment(mut self, counter: Counter, by: i64) -> Self {
        self.counters.insert(counter, CounterChange::Increment(by));
        self
    }

    /// Returns true if the update names no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.counters.is_empty()
    }

    /// Reject malformed updates before anything is merged.
    ///
    /// # Errors
    ///
    /// `EmptyUpdate` when nothing is set, `NegativeCounter` for any negative
    /// value.
    pub fn validate(&self, entity_id: EntityId) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate { entity_id });
        }
        for (&counter, &change) in &self.counters {
            let value = change.value();
            if value < 0 {
                return Err(ValidationError::NegativeCounter {
                    field: counter.field(),
                    value,
                });
            }
        }
        Ok(())
    }
}
