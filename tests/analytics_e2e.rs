use std::sync::Arc;

use courtcache::{
    AccessGate, Action, AuthorizationError, CacheEngine, Caller, CacheLookup, CoreConfig, EngineStores,
    EntityId, InMemoryFactStore, Resource, Role,
};
use serde_json::json;

fn engine() -> CacheEngine {
    CacheEngine::in_memory(CoreConfig::default(), Arc::new(InMemoryFactStore::new())).unwrap()
}

#[test]
fn put_then_get_returns_payload() {
    let engine = engine();
    let writer = Caller::service("analytics-job");
    let judge = EntityId::new();
    let payload = json!({ "reversal_rate": 0.12, "median_days_to_decision": 41 });

    assert_eq!(
        engine.analytics().get(&Caller::public(), judge).unwrap(),
        CacheLookup::Miss
    );
    engine.analytics().put(&writer, judge, payload.clone()).unwrap();

    let entry = engine
        .analytics()
        .get(&Caller::authenticated("analyst"), judge)
        .unwrap()
        .into_entry()
        .unwrap();
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.entity_id, judge);
}

#[test]
fn overwrite_keeps_one_entry_per_entity() {
    let engine = engine();
    let writer = Caller::service("analytics-job");
    let judge = EntityId::new();

    let first = engine.analytics().put(&writer, judge, json!({ "v": 1 })).unwrap();
    let second = engine.analytics().put(&writer, judge, json!({ "v": 2 })).unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);

    let stats = engine.analytics().stats(&Caller::public()).unwrap();
    assert_eq!(stats.entry_count, 1);
    let entry = engine.analytics().get(&writer, judge).unwrap().into_entry().unwrap();
    assert_eq!(entry.payload, json!({ "v": 2 }));
}

#[test]
fn invalidate_then_get_misses() {
    let engine = engine();
    let writer = Caller::service("analytics-job");
    let judges: Vec<EntityId> = (0..3).map(|_| EntityId::new()).collect();
    for &judge in &judges {
        engine.analytics().put(&writer, judge, json!({ "n": 1 })).unwrap();
    }

    assert_eq!(engine.analytics().invalidate(&writer, judges[0]).unwrap(), 1);
    assert_eq!(engine.analytics().invalidate(&writer, judges[0]).unwrap(), 0);
    assert!(!engine.analytics().get(&writer, judges[0]).unwrap().is_hit());
    assert!(engine.analytics().get(&writer, judges[1]).unwrap().is_hit());

    assert_eq!(engine.analytics().invalidate_all(&writer).unwrap(), 2);
    let stats = engine.analytics().stats(&writer).unwrap();
    assert_eq!(stats.entry_count, 0);
    assert!(stats.oldest_update.is_none());
    assert!(stats.average_age_secs.is_none());
}

#[test]
fn unprivileged_writes_change_nothing() {
    let engine = engine();
    let writer = Caller::service("analytics-job");
    let judge = EntityId::new();
    engine.analytics().put(&writer, judge, json!({ "ok": true })).unwrap();

    for caller in [Caller::public(), Caller::authenticated("mallory")] {
        let err = engine
            .analytics()
            .put(&caller, judge, json!({ "ok": false }))
            .unwrap_err();
        assert!(err.is_authorization());
        assert!(engine.analytics().invalidate(&caller, judge).unwrap_err().is_authorization());
        assert!(engine.analytics().invalidate_all(&caller).unwrap_err().is_authorization());
    }

    let entry = engine.analytics().get(&Caller::public(), judge).unwrap().into_entry().unwrap();
    assert_eq!(entry.payload, json!({ "ok": true }));
}

#[test]
fn null_payload_is_rejected() {
    let engine = engine();
    let judge = EntityId::new();
    let err = engine
        .analytics()
        .put(&Caller::service("analytics-job"), judge, serde_json::Value::Null)
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!engine.analytics().get(&Caller::public(), judge).unwrap().is_hit());
}

/// Gate that keeps every store private to authenticated users.
struct MembersOnly;

impl AccessGate for MembersOnly {
    fn authorize(&self, caller: &Caller, resource: Resource, action: Action) -> Result<(), AuthorizationError> {
        let allowed = match caller.role {
            Role::Public => false,
            Role::Authenticated => !action.is_mutation(),
            Role::Service => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(AuthorizationError {
                role: caller.role,
                action,
                resource,
            })
        }
    }
}

#[test]
fn custom_gate_applies_to_every_store() {
    let engine = CacheEngine::with_gate(
        CoreConfig::default(),
        Arc::new(InMemoryFactStore::new()),
        EngineStores::in_memory(),
        Arc::new(MembersOnly),
    )
    .unwrap();
    let judge = EntityId::new();

    let public = Caller::public();
    assert!(engine.analytics().get(&public, judge).unwrap_err().is_authorization());
    assert!(engine.completeness().get(&public, judge).unwrap_err().is_authorization());
    assert!(engine.aggregates().get_summary(&public, judge, 1).unwrap_err().is_authorization());

    let member = Caller::authenticated("clerk");
    assert!(!engine.analytics().get(&member, judge).unwrap().is_hit());
    assert!(engine.completeness().get(&member, judge).unwrap().is_none());
    assert_eq!(engine.aggregates().get_summary(&member, judge, 1).unwrap().total, 0);
}
