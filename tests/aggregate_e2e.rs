use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{Datelike, NaiveDate};
use courtcache::{
    CacheEngine, Caller, CoreConfig, EntityId, FactRecord, FactSource, InMemoryFactStore,
    StorageError,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Fact store wrapper whose scans can be made to fail.
struct SwitchableSource {
    facts: InMemoryFactStore,
    down: AtomicBool,
}

impl SwitchableSource {
    fn new() -> Self {
        Self {
            facts: InMemoryFactStore::new(),
            down: AtomicBool::new(false),
        }
    }
}

impl FactSource for SwitchableSource {
    fn facts_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<FactRecord>, StorageError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError("replica lagging".to_string()));
        }
        self.facts.facts_between(from, to)
    }
}

/// Deterministic spread of facts over a handful of judges and years.
fn seed(source: &SwitchableSource, judges: &[EntityId]) -> Vec<FactRecord> {
    let mut all = Vec::new();
    for (i, &judge) in judges.iter().enumerate() {
        for n in 0..(i * 7 + 3) {
            let year = 2012 + i32::try_from(n % 14).unwrap();
            let month = u32::try_from(n % 12).unwrap() + 1;
            let fact = FactRecord::new(judge, date(year, month, 15)).with_category("opinion");
            all.push(fact.clone());
            source.facts.append(fact).unwrap();
        }
    }
    all
}

fn expected_total(facts: &[FactRecord], judge: EntityId, reference: NaiveDate, window: u32) -> u64 {
    let first_year = reference.year() - i32::try_from(window).unwrap() + 1;
    facts
        .iter()
        .filter(|f| f.entity_id == judge)
        .filter(|f| f.event_date.year() >= first_year && f.event_date <= reference)
        .count() as u64
}

#[test]
fn summary_total_matches_fact_count_in_window() {
    let source = Arc::new(SwitchableSource::new());
    let judges: Vec<EntityId> = (0..6).map(|_| EntityId::new()).collect();
    let facts = seed(&source, &judges);
    let reference = date(2025, 6, 30);

    let engine = CacheEngine::in_memory(CoreConfig::default(), source).unwrap();
    let report = engine
        .aggregates()
        .rebuild_as_of(&Caller::service("cron"), reference)
        .unwrap();
    assert!(report.succeeded());

    let reader = Caller::authenticated("analyst");
    for &judge in &judges {
        for window in [1, 3, 5, 10] {
            let summary = engine.aggregates().get_summary(&reader, judge, window).unwrap();
            assert_eq!(summary.total, expected_total(&facts, judge, reference, window));
            assert_eq!(summary.buckets.iter().map(|b| b.count).sum::<u64>(), summary.total);
            if let (Some(first), Some(last)) = (summary.earliest, summary.latest) {
                assert!(first <= last);
                assert!(last <= reference);
            }
        }
    }
}

#[test]
fn batch_equals_individual_lookups() {
    let source = Arc::new(SwitchableSource::new());
    let judges: Vec<EntityId> = (0..8).map(|_| EntityId::new()).collect();
    seed(&source, &judges);
    let engine = CacheEngine::in_memory(CoreConfig::default(), source).unwrap();
    engine
        .aggregates()
        .rebuild_as_of(&Caller::service("cron"), date(2025, 12, 31))
        .unwrap();

    let unknown = EntityId::new();
    let mut ids = judges.clone();
    ids.push(unknown);

    let reader = Caller::public();
    let batch = engine.aggregates().get_batch_summaries(&reader, &ids, 5).unwrap();
    assert_eq!(batch.len(), ids.len());
    for id in &ids {
        let single = engine.aggregates().get_summary(&reader, *id, 5).unwrap();
        assert_eq!(batch[id], single);
    }

    let empty = &batch[&unknown];
    assert_eq!(empty.total, 0);
    assert!(empty.buckets.is_empty());
    assert!(empty.earliest.is_none());
}

#[test]
fn rebuild_is_idempotent() {
    let source = Arc::new(SwitchableSource::new());
    let judges: Vec<EntityId> = (0..4).map(|_| EntityId::new()).collect();
    seed(&source, &judges);
    let engine = CacheEngine::in_memory(CoreConfig::default(), source).unwrap();
    let svc = Caller::service("cron");

    let first = engine.aggregates().rebuild_as_of(&svc, date(2025, 3, 1)).unwrap();
    let second = engine.aggregates().rebuild_as_of(&svc, date(2025, 3, 1)).unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.bucket_count, second.bucket_count);
    assert_eq!(engine.aggregates().rebuild_history().len(), 2);
}

#[test]
fn failed_rebuild_leaves_summaries_untouched() {
    let source = Arc::new(SwitchableSource::new());
    let judges: Vec<EntityId> = (0..5).map(|_| EntityId::new()).collect();
    seed(&source, &judges);
    let engine = CacheEngine::in_memory(CoreConfig::default(), Arc::clone(&source) as Arc<dyn FactSource>).unwrap();
    let svc = Caller::service("cron");
    let reader = Caller::public();

    engine.aggregates().rebuild_as_of(&svc, date(2025, 1, 1)).unwrap();
    let before: HashMap<_, _> = engine.aggregates().get_batch_summaries(&reader, &judges, 10).unwrap();
    let info_before = engine.aggregates().snapshot_info(&reader).unwrap();

    // new facts arrive, but the source fails during the next rebuild
    source.facts.append(FactRecord::new(judges[0], date(2024, 7, 7))).unwrap();
    source.down.store(true, Ordering::SeqCst);
    let report = engine.aggregates().rebuild_as_of(&svc, date(2025, 2, 1)).unwrap();
    assert!(!report.succeeded());

    let after = engine.aggregates().get_batch_summaries(&reader, &judges, 10).unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.aggregates().snapshot_info(&reader).unwrap(), info_before);

    // next scheduled run recovers and picks up the new fact
    source.down.store(false, Ordering::SeqCst);
    assert!(engine.aggregates().rebuild_as_of(&svc, date(2025, 2, 1)).unwrap().succeeded());
    let recovered = engine.aggregates().get_summary(&reader, judges[0], 10).unwrap();
    assert_eq!(recovered.total, before[&judges[0]].total + 1);
}

#[test]
fn readers_see_whole_snapshots_during_rebuilds() {
    let source = Arc::new(SwitchableSource::new());
    let judges: Vec<EntityId> = (0..20).map(|_| EntityId::new()).collect();
    seed(&source, &judges);
    let engine = CacheEngine::in_memory(CoreConfig::default(), Arc::clone(&source) as Arc<dyn FactSource>).unwrap();
    let svc = Caller::service("cron");
    engine.aggregates().rebuild_as_of(&svc, date(2025, 1, 1)).unwrap();

    let old_total: u64 = engine
        .aggregates()
        .get_batch_summaries(&Caller::public(), &judges, 10)
        .unwrap()
        .values()
        .map(|s| s.total)
        .sum();

    // one extra fact per judge: the new grand total is old + 20
    for &judge in &judges {
        source.facts.append(FactRecord::new(judge, date(2024, 1, 2))).unwrap();
    }
    let new_total = old_total + judges.len() as u64;

    thread::scope(|scope| {
        for _ in 0..4 {
            let engine = &engine;
            let judges = &judges;
            scope.spawn(move || {
                for _ in 0..200 {
                    let total: u64 = engine
                        .aggregates()
                        .get_batch_summaries(&Caller::public(), judges, 10)
                        .unwrap()
                        .values()
                        .map(|s| s.total)
                        .sum();
                    assert!(total == old_total || total == new_total, "mixed snapshot: {total}");
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..5 {
                engine.aggregates().rebuild_as_of(&svc, date(2025, 1, 1)).unwrap();
            }
        });
    });
}

#[test]
fn rebuild_ignores_facts_outside_retained_window() {
    let source = Arc::new(SwitchableSource::new());
    let judge = EntityId::new();
    source
        .facts
        .extend([
            FactRecord::new(judge, date(2000, 1, 1)),
            FactRecord::new(judge, date(2023, 1, 1)),
            FactRecord::new(judge, date(2026, 1, 1)),
        ])
        .unwrap();
    let config = CoreConfig {
        retained_window_years: 3,
        ..CoreConfig::default()
    };
    let engine = CacheEngine::in_memory(config, source).unwrap();
    let report = engine
        .aggregates()
        .rebuild_as_of(&Caller::service("cron"), date(2025, 6, 1))
        .unwrap();
    assert_eq!(report.fact_count, 1);
    assert!(engine
        .aggregates()
        .get_summary(&Caller::public(), judge, 4)
        .unwrap_err()
        .is_validation());
}
