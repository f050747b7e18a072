//! Immutable bucket sets.
//!
//! A rebuild produces a whole new [`BucketSnapshot`] off to the side; the
//! store then swaps it in. Readers hold an `Arc` to whichever snapshot was
//! live when they started, so they see either the old set or the new set,
//! never a mix.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::aggregate::bucket::{period_of, AggregateBucket, BucketKey, EntitySummary};
use crate::entity::EntityId;
use crate::fact::FactRecord;
use crate::storage::StorageError;

/// First and last date covered by a trailing window of `years` calendar
/// years ending at `reference`.
///
/// Returns `None` if the window start is not representable.
#[must_use]
pub fn trailing_window(reference: NaiveDate, years: u32) -> Option<(NaiveDate, NaiveDate)> {
    let years = i32::try_from(years).ok()?;
    if years < 1 {
        return None;
    }
    let start_year = reference.year().checked_sub(years - 1)?;
    let start = NaiveDate::from_ymd_opt(start_year, 1, 1)?;
    Some((start, reference))
}

/// Every bucket produced by one rebuild.
#[derive(Debug, Clone, Default)]
pub struct BucketSnapshot {
    buckets: BTreeMap<BucketKey, AggregateBucket>,
    reference_date: Option<NaiveDate>,
    retained_years: u32,
    built_at: Option<DateTime<Utc>>,
    fact_count: u64,
    fingerprint: String,
}

impl BucketSnapshot {
    /// The snapshot served before any rebuild has completed.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group facts into buckets, keeping only facts inside the retained
    /// window that ends at `reference_date`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the window cannot be represented.
    pub fn build(
        facts: &[FactRecord],
        reference_date: NaiveDate,
        retained_years: u32,
        built_at: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        let (from, to) = trailing_window(reference_date, retained_years).ok_or_else(|| {
            StorageError::BackendError(format!(
                "cannot represent a {retained_years}-year window ending {reference_date}"
            ))
        })?;

        let mut buckets: BTreeMap<BucketKey, AggregateBucket> = BTreeMap::new();
        let mut fact_count = 0u64;
        for fact in facts {
            if fact.event_date < from || fact.event_date > to {
                continue;
            }
            fact_count += 1;
            let key = BucketKey::new(fact.entity_id, period_of(fact.event_date));
            buckets
                .entry(key)
                .and_modify(|b| b.absorb(fact.event_date))
                .or_insert_with(|| AggregateBucket::first(fact.entity_id, fact.event_date));
        }

        Ok(Self::from_parts(
            buckets.into_values(),
            reference_date,
            retained_years,
            built_at,
            fact_count,
        ))
    }

    /// Reassemble a snapshot from stored buckets.
    #[must_use]
    pub fn from_parts(
        buckets: impl IntoIterator<Item = AggregateBucket>,
        reference_date: NaiveDate,
        retained_years: u32,
        built_at: DateTime<Utc>,
        fact_count: u64,
    ) -> Self {
        let buckets: BTreeMap<BucketKey, AggregateBucket> =
            buckets.into_iter().map(|b| (b.key(), b)).collect();
        let fingerprint = fingerprint(&buckets);
        Self {
            buckets,
            reference_date: Some(reference_date),
            retained_years,
            built_at: Some(built_at),
            fact_count,
            fingerprint,
        }
    }

    /// Date the snapshot was built as of; `None` before the first rebuild.
    #[must_use]
    pub const fn reference_date(&self) -> Option<NaiveDate> {
        self.reference_date
    }

    /// Years of facts the snapshot retains.
    #[must_use]
    pub const fn retained_years(&self) -> u32 {
        self.retained_years
    }

    /// When the snapshot was built.
    #[must_use]
    pub const fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Facts folded into the snapshot.
    #[must_use]
    pub const fn fact_count(&self) -> u64 {
        self.fact_count
    }

    /// BLAKE3 digest over the ordered buckets (hex).
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of distinct entities with at least one bucket.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        let mut count = 0;
        let mut last: Option<EntityId> = None;
        for key in self.buckets.keys() {
            if last != Some(key.entity_id) {
                count += 1;
                last = Some(key.entity_id);
            }
        }
        count
    }

    /// Iterate all buckets in key order.
    pub fn buckets(&self) -> impl Iterator<Item = &AggregateBucket> {
        self.buckets.values()
    }

    /// Point lookup of one bucket.
    #[must_use]
    pub fn bucket(&self, entity_id: EntityId, period: i32) -> Option<&AggregateBucket> {
        self.buckets.get(&BucketKey::new(entity_id, period))
    }

    /// Summary of one entity over a trailing window ending at the snapshot's
    /// reference year. The caller has already validated `window_years`.
    #[must_use]
    pub fn summary(&self, entity_id: EntityId, window_years: u32) -> EntitySummary {
        let Some(reference) = self.reference_date else {
            return EntitySummary::empty(entity_id, window_years);
        };
        let Some((from, _)) = trailing_window(reference, window_years) else {
            return EntitySummary::empty(entity_id, window_years);
        };

        let lo = BucketKey::new(entity_id, from.year());
        let hi = BucketKey::new(entity_id, reference.year());
        let buckets: Vec<AggregateBucket> =
            self.buckets.range(lo..=hi).map(|(_, b)| *b).collect();
        if buckets.is_empty() {
            return EntitySummary::empty(entity_id, window_years);
        }
        EntitySummary::from_buckets(entity_id, window_years, buckets)
    }
}

fn fingerprint(buckets: &BTreeMap<BucketKey, AggregateBucket>) -> String {
    let mut hasher = blake3::Hasher::new();
    for bucket in buckets.values() {
        hasher.update(bucket.entity_id.as_uuid().as_bytes());
        hasher.update(&bucket.period.to_le_bytes());
        hasher.update(&bucket.count.to_le_bytes());
        hasher.update(&bucket.earliest.num_days_from_ce().to_le_bytes());
        hasher.update(&bucket.latest.num_days_from_ce().to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
