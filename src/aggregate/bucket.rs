//! Bucket and summary types.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Calendar year of an event date.
#[must_use]
pub fn period_of(date: NaiveDate) -> i32 {
    date.year()
}

/// Composite key of a bucket. Ordering is entity first, then period, so all
/// buckets of one entity are contiguous in an ordered map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    /// Entity the bucket belongs to.
    pub entity_id: EntityId,
    /// Calendar year.
    pub period: i32,
}

impl BucketKey {
    /// Create a key.
    #[must_use]
    pub const fn new(entity_id: EntityId, period: i32) -> Self {
        Self { entity_id, period }
    }
}

/// Fact count for one `(entity, period)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// Entity the bucket belongs to.
    pub entity_id: EntityId,
    /// Calendar year.
    pub period: i32,
    /// Number of facts in the period.
    pub count: u64,
    /// Earliest event date in the bucket.
    pub earliest: NaiveDate,
    /// Latest event date in the bucket.
    pub latest: NaiveDate,
}

impl AggregateBucket {
    /// Start a bucket from its first fact.
    #[must_use]
    pub fn first(entity_id: EntityId, event_date: NaiveDate) -> Self {
        Self {
            entity_id,
            period: period_of(event_date),
            count: 1,
            earliest: event_date,
            latest: event_date,
        }
    }

    /// Fold one more fact of the same period into the bucket.
    pub fn absorb(&mut self, event_date: NaiveDate) {
        debug_assert_eq!(period_of(event_date), self.period);
        self.count += 1;
        self.earliest = self.earliest.min(event_date);
        self.latest = self.latest.max(event_date);
    }

    /// Key of this bucket.
    #[must_use]
    pub const fn key(&self) -> BucketKey {
        BucketKey::new(self.entity_id, self.period)
    }
}

/// Per-entity rollup over a trailing window of periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    /// Entity summarised.
    pub entity_id: EntityId,
    /// Window the summary covers, in calendar years.
    pub window_years: u32,
    /// Buckets inside the window, ascending by period.
    pub buckets: Vec<AggregateBucket>,
    /// Sum of bucket counts.
    pub total: u64,
    /// Earliest event date inside the window.
    pub earliest: Option<NaiveDate>,
    /// Latest event date inside the window.
    pub latest: Option<NaiveDate>,
}

impl EntitySummary {
    /// Summary for an entity with no buckets in the window.
    #[must_use]
    pub const fn empty(entity_id: EntityId, window_years: u32) -> Self {
        Self {
            entity_id,
            window_years,
            buckets: Vec::new(),
            total: 0,
            earliest: None,
            latest: None,
        }
    }

    /// Build a summary from buckets already filtered to the window.
    #[must_use]
    pub fn from_buckets(entity_id: EntityId, window_years: u32, buckets: Vec<AggregateBucket>) -> Self {
        let total = buckets.iter().map(|b| b.count).sum();
        let earliest = buckets.iter().map(|b| b.earliest).min();
        let latest = buckets.iter().map(|b| b.latest).max();
        Self {
            entity_id,
            window_years,
            buckets,
            total,
            earliest,
            latest,
        }
    }

    /// Returns true if no fact fell inside the window.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_absorb_tracks_bounds() {
        let id = EntityId::new();
        let mut bucket = AggregateBucket::first(id, date(2022, 6, 1));
        bucket.absorb(date(2022, 2, 14));
        bucket.absorb(date(2022, 11, 30));
        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.earliest, date(2022, 2, 14));
        assert_eq!(bucket.latest, date(2022, 11, 30));
        assert_eq!(bucket.period, 2022);
    }

    #[test]
    fn test_key_ordering_groups_entities() {
        let a = EntityId::nil();
        let b = EntityId::new();
        assert!(BucketKey::new(a, 2030) < BucketKey::new(b, 1990));
        assert!(BucketKey::new(b, 2019) < BucketKey::new(b, 2020));
    }

    #[test]
    fn test_summary_from_buckets() {
        let id = EntityId::new();
        let mut b1 = AggregateBucket::first(id, date(2020, 3, 3));
        b1.absorb(date(2020, 4, 4));
        let b2 = AggregateBucket::first(id, date(2021, 9, 9));
        let summary = EntitySummary::from_buckets(id, 5, vec![b1, b2]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.earliest, Some(date(2020, 3, 3)));
        assert_eq!(summary.latest, Some(date(2021, 9, 9)));
        assert!(!summary.is_empty());
        assert!(EntitySummary::empty(id, 5).is_empty());
    }
}
