use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use courtcache::{
    CacheEngine, Caller, CoreConfig, EntityId, FactRecord, InMemoryFactStore, Job, JobOutcome, JobRuntime,
    Phase, ProgressUpdate, RuntimeConfig,
};
use courtcache::{Counter, Flag};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn scheduled_rebuild_and_reconcile_run_on_workers() {
    let facts = Arc::new(InMemoryFactStore::new());
    let judge = EntityId::new();
    facts
        .extend((1..=9).map(|m| FactRecord::new(judge, date(2024, m, 1))))
        .unwrap();

    let engine = CacheEngine::in_memory(CoreConfig::default(), facts).unwrap();
    let runtime = JobRuntime::with_config(
        engine,
        &RuntimeConfig {
            workers: 2,
            queue_capacity: 8,
        },
    )
    .unwrap();
    let cron = Caller::service("cron");

    let rebuild = runtime
        .submit(
            cron.clone(),
            Job::RebuildAggregates {
                as_of: Some(date(2024, 12, 31)),
            },
        )
        .unwrap();
    assert_eq!(rebuild.name(), "rebuild_aggregates");
    let JobOutcome::Rebuilt(report) = rebuild.join_timeout(Duration::from_secs(10)).unwrap() else {
        panic!("expected rebuild outcome");
    };
    assert!(report.succeeded());
    assert_eq!(report.fact_count, 9);

    let summary = runtime
        .engine()
        .aggregates()
        .get_summary(&Caller::public(), judge, 1)
        .unwrap();
    assert_eq!(summary.total, 9);

    runtime
        .engine()
        .completeness()
        .upsert_progress(
            &cron,
            judge,
            &ProgressUpdate::new()
                .flag(Flag::Positions, true)
                .set(Counter::Opinions, 9),
        )
        .unwrap();
    let JobOutcome::Reconciled(sweep) = runtime
        .run(cron, Job::ReconcileCompleteness)
        .unwrap()
    else {
        panic!("expected reconcile outcome");
    };
    assert_eq!(sweep.scanned, 1);
    assert_eq!(sweep.corrected, 0);

    let record = runtime
        .engine()
        .completeness()
        .get(&Caller::public(), judge)
        .unwrap()
        .unwrap();
    assert_eq!(record.phase, Phase::Opinions);
}

#[test]
fn unauthorized_job_fails_without_side_effects() {
    let facts = Arc::new(InMemoryFactStore::new());
    facts.append(FactRecord::new(EntityId::new(), date(2024, 1, 1))).unwrap();
    let runtime = JobRuntime::start(CacheEngine::in_memory(CoreConfig::default(), facts).unwrap()).unwrap();

    let err = runtime
        .run(Caller::authenticated("someone"), Job::RebuildAggregates { as_of: None })
        .unwrap_err();
    assert!(err.is_authorization());
    assert!(runtime.engine().aggregates().last_report().is_none());
    let info = runtime.engine().aggregates().snapshot_info(&Caller::public()).unwrap();
    assert!(info.reference_date.is_none());
}

#[test]
fn scheduler_payload_runs_with_submitter_identity() {
    let facts = Arc::new(InMemoryFactStore::new());
    facts.append(FactRecord::new(EntityId::new(), date(2024, 3, 3))).unwrap();
    let runtime = JobRuntime::start(CacheEngine::in_memory(CoreConfig::default(), facts).unwrap()).unwrap();

    let payload = r#"{"job":"rebuild_aggregates","as_of":"2025-01-01","caller":{"role":"service","principal":"cron"}}"#;
    let job: Job = serde_json::from_str(payload).unwrap();
    assert_eq!(
        job,
        Job::RebuildAggregates {
            as_of: Some(date(2025, 1, 1)),
        }
    );

    // the role claimed in the payload grants nothing
    let err = runtime.run(Caller::public(), job.clone()).unwrap_err();
    assert!(err.is_authorization());
    assert!(runtime.engine().aggregates().last_report().is_none());

    let JobOutcome::Rebuilt(report) = runtime.run(Caller::service("cron"), job).unwrap() else {
        panic!("expected rebuild outcome");
    };
    assert_eq!(report.fact_count, 1);
}
