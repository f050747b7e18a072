//! Analytics cache entries and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Computed analytics payload for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEntry {
    pub entity_id: EntityId,
    /// Opaque computed result.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// The entity has a cached payload.
    Hit(AnalyticsEntry),
    /// Nothing is cached; the caller decides whether to schedule a computation.
    Miss,
}

impl CacheLookup {
    /// Returns true on a hit.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Converts into the entry, if any.
    #[must_use]
    pub fn into_entry(self) -> Option<AnalyticsEntry> {
        match self {
            Self::Hit(entry) => Some(entry),
            Self::Miss => None,
        }
    }
}

impl From<Option<AnalyticsEntry>> for CacheLookup {
    fn from(entry: Option<AnalyticsEntry>) -> Self {
        entry.map_or(Self::Miss, Self::Hit)
    }
}

/// Aggregate view over the analytics cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsStats {
    pub entry_count: usize,
    /// Least recently written entry.
    pub oldest_update: Option<DateTime<Utc>>,
    /// Most recently written entry.
    pub newest_update: Option<DateTime<Utc>>,
    /// Mean age of all entries at `computed_at`, in seconds.
    pub average_age_secs: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl AnalyticsStats {
    /// Compute stats over a set of entries.
    #[must_use]
    pub fn compute<'a>(entries: impl IntoIterator<Item = &'a AnalyticsEntry>, now: DateTime<Utc>) -> Self {
        let mut entry_count = 0usize;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        let mut total_age_ms: i128 = 0;

        for entry in entries {
            entry_count += 1;
            oldest = Some(oldest.map_or(entry.updated_at, |o| o.min(entry.updated_at)));
            newest = Some(newest.map_or(entry.updated_at, |n| n.max(entry.updated_at)));
            total_age_ms += i128::from((now - entry.updated_at).num_milliseconds());
        }

        #[allow(clippy::cast_precision_loss)]
        let average_age_secs =
            (entry_count > 0).then(|| total_age_ms as f64 / entry_count as f64 / 1000.0);

        Self {
            entry_count,
            oldest_update: oldest,
            newest_update: newest,
            average_age_secs,
            computed_at: now,
        }
    }
}
