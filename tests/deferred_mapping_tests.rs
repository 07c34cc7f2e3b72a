/// Deferred mapping tests
///
/// Edit-session scenarios: staging intents against an owner, resolving them
/// on save, and the notifications emitted afterwards.
/// Run with: cargo test --test deferred_mapping_tests

use relsync::{
    ConnectorConfig, DefaultMapping, EditSession, EmptyDrainPolicy, IntentKind, IntentOutcome,
    MapOptions, MappingEvent, MembershipEntry, OwnerRef, OwnerState, RelError, RelatedObject,
    ResolverState, Target, TargetKey,
    memory::{InMemoryObjectCache, InMemoryRelationshipStore, StaticMappingRegistry},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

struct Fixture {
    session: EditSession,
    store: Arc<InMemoryRelationshipStore>,
}

async fn fixture(owner: OwnerRef, config: ConnectorConfig, baseline: Vec<Target>) -> Fixture {
    let store = Arc::new(InMemoryRelationshipStore::new());
    if owner.is_persisted() {
        store.seed(&owner, "related_objects", baseline).await.unwrap();
    }

    let cache = Arc::new(InMemoryObjectCache::new());
    cache.insert(RelatedObject::new(1, "Risk", "Vendor risk"));
    cache.insert(RelatedObject::new(2, "Risk", "Fraud risk"));
    cache.insert(RelatedObject::new(5, "Control", "Access review"));
    cache.insert(RelatedObject::new(9, "Program", "SOX"));

    let registry = Arc::new(
        StaticMappingRegistry::new()
            .relation("Audit", "Control", "audit_controls")
            .fallback("related_objects"),
    );

    let session = EditSession::new(owner, config, store.clone(), registry, cache);
    Fixture { session, store }
}

fn events(rx: &mut broadcast::Receiver<MappingEvent>) -> Vec<MappingEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}

fn keys(ids: &[(i64, &str)]) -> BTreeSet<TargetKey> {
    ids.iter().map(|(id, ty)| TargetKey::new(*id, *ty)).collect()
}

#[tokio::test]
async fn test_add_then_remove_before_save_issues_no_store_calls() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner,
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(1, "Risk")],
    )
    .await;
    fx.session.open().await.unwrap();
    let mut rx = fx.session.subscribe();

    fx.session.add_mappings(&[Target::new(2, "Risk")]).unwrap();
    let outcome = fx.session.remove_mapping(&Target::new(2, "Risk")).unwrap();
    assert!(matches!(outcome, IntentOutcome::Cancelled(_)));

    fx.session.begin_save().unwrap();
    let report = fx.session.owner_updated().await.unwrap();

    assert!(fx.session.pending_intents().unwrap().is_empty());
    assert_eq!(report.mapped + report.unmapped, 0);
    assert_eq!(fx.store.map_calls(), 0);
    assert_eq!(fx.store.unmap_calls(), 0);
    // Empty drains still announce a subtree refresh under the default policy.
    assert_eq!(events(&mut rx), vec![MappingEvent::SubtreeChanged]);
    assert_eq!(fx.session.view().identities(), keys(&[(1, "Risk")]));
}

#[tokio::test]
async fn test_empty_drain_can_stay_silent() {
    let config = ConnectorConfig::new()
        .mapping("related_objects")
        .empty_drain(EmptyDrainPolicy::Skip);
    let fx = fixture(OwnerRef::new(10, "Program"), config, vec![]).await;
    fx.session.open().await.unwrap();
    let mut rx = fx.session.subscribe();

    fx.session.owner_updated().await.unwrap();
    assert!(events(&mut rx).is_empty());
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Add(i64),
    Remove(i64),
}

use Step::{Add, Remove};

/// Applies `steps` to a session over `baseline`, then checks the view before
/// the save and the store after it against plain set arithmetic.
async fn assert_set_law(baseline: &[i64], steps: &[Step]) {
    let owner = OwnerRef::new(10, "Program");
    let risks = |ids: &[i64]| ids.iter().map(|id| Target::new(*id, "Risk")).collect::<Vec<_>>();
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        risks(baseline),
    )
    .await;
    fx.session.open().await.unwrap();

    let mut expected: BTreeSet<TargetKey> =
        baseline.iter().map(|id| TargetKey::new(*id, "Risk")).collect();
    for step in steps {
        match *step {
            Add(id) => {
                fx.session.add_mappings(&risks(&[id])).unwrap();
                expected.insert(TargetKey::new(id, "Risk"));
            }
            Remove(id) => {
                fx.session.remove_mapping(&Target::new(id, "Risk")).unwrap();
                expected.remove(&TargetKey::new(id, "Risk"));
            }
        }
    }
    assert_eq!(
        fx.session.view().identities(),
        expected,
        "view after {steps:?} on {baseline:?}"
    );

    fx.session.owner_updated().await.unwrap();
    let stored: BTreeSet<TargetKey> = fx
        .store
        .members(&owner, "related_objects")
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(stored, expected, "store after {steps:?} on {baseline:?}");
}

#[tokio::test]
async fn test_membership_set_law() {
    let cases: Vec<(Vec<i64>, Vec<Step>)> = vec![
        (vec![1, 2], vec![Add(3), Remove(1), Add(4), Remove(4), Remove(2), Add(2)]),
        (vec![1], vec![Add(1), Remove(1)]),
        (vec![1], vec![Add(1), Add(1), Remove(1), Add(1)]),
        (vec![1], vec![Remove(1), Remove(1)]),
        (vec![1], vec![Remove(1), Add(1), Remove(1)]),
        (vec![], vec![Add(3), Add(3), Remove(3), Add(3)]),
        (vec![], vec![Add(3), Remove(3), Add(3), Remove(3)]),
        (vec![], vec![Remove(5)]),
        (vec![1, 2], vec![Add(3), Remove(3), Add(3), Remove(1), Add(1), Add(2)]),
        (vec![1, 2], vec![Add(2), Remove(2), Add(2), Remove(1)]),
    ];
    for (baseline, steps) in &cases {
        assert_set_law(baseline, steps).await;
    }
}

#[tokio::test]
async fn test_readding_baseline_member_keeps_it_mapped() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(1, "Risk")],
    )
    .await;
    fx.session.open().await.unwrap();

    let added = fx.session.add_mappings(&[Target::new(1, "Risk")]).unwrap();
    assert_eq!(added, vec![IntentOutcome::Duplicate]);
    assert_eq!(fx.session.view().len(), 1);
    assert!(fx.session.pending_intents().unwrap().is_empty());

    let removed = fx.session.remove_mapping(&Target::new(1, "Risk")).unwrap();
    assert_eq!(removed, IntentOutcome::Appended);
    assert!(fx.session.view().is_empty());

    fx.session.owner_updated().await.unwrap();
    assert!(
        fx.store
            .members(&owner, "related_objects")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_pending_intents_keep_arrival_order() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner,
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(1, "Risk"), Target::new(2, "Risk")],
    )
    .await;
    fx.session.open().await.unwrap();

    fx.session.add_mappings(&[Target::new(3, "Risk")]).unwrap();
    fx.session.remove_mapping(&Target::new(1, "Risk")).unwrap();
    fx.session.add_mappings(&[Target::new(4, "Risk")]).unwrap();
    fx.session.remove_mapping(&Target::new(4, "Risk")).unwrap();
    fx.session.remove_mapping(&Target::new(2, "Risk")).unwrap();
    fx.session.add_mappings(&[Target::new(2, "Risk")]).unwrap();

    assert_eq!(
        fx.session.view().identities(),
        keys(&[(2, "Risk"), (3, "Risk")])
    );

    let pending: Vec<(TargetKey, IntentKind)> = fx
        .session
        .pending_intents()
        .unwrap()
        .iter()
        .map(|intent| (intent.key().clone(), intent.kind))
        .collect();
    assert_eq!(
        pending,
        vec![
            (TargetKey::new(3, "Risk"), IntentKind::Add),
            (TargetKey::new(1, "Risk"), IntentKind::Remove),
        ]
    );
}

#[tokio::test]
async fn test_save_resolves_intents_and_notifies_per_type() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(5, "Control")],
    )
    .await;
    fx.session.open().await.unwrap();
    let mut rx = fx.session.subscribe();

    fx.session
        .add_mappings(&[Target::new(1, "Risk"), Target::new(2, "Risk")])
        .unwrap();
    fx.session.remove_mapping(&Target::new(5, "Control")).unwrap();

    fx.session.begin_save().unwrap();
    let report = fx.session.owner_updated().await.unwrap();

    assert_eq!(report.mapped, 2);
    assert_eq!(report.unmapped, 1);
    assert_eq!(fx.store.map_calls(), 1);
    assert_eq!(fx.store.unmap_calls(), 1);
    assert_eq!(
        fx.store.members(&owner, "related_objects").await.unwrap(),
        vec![TargetKey::new(1, "Risk"), TargetKey::new(2, "Risk")]
    );

    let seen = events(&mut rx);
    assert_eq!(seen.len(), 3);
    assert!(seen.contains(&MappingEvent::MappingChanged { target_type: "Risk".into() }));
    assert!(seen.contains(&MappingEvent::MappingChanged { target_type: "Control".into() }));
    assert_eq!(seen.last(), Some(&MappingEvent::SubtreeChanged));
    assert_eq!(fx.session.owner_state().unwrap(), OwnerState::Saved);
    assert_eq!(fx.session.resolver().state(), ResolverState::Idle);
}

#[tokio::test]
async fn test_repeated_completion_signals_resolve_once() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(owner, ConnectorConfig::new().mapping("related_objects"), vec![]).await;
    fx.session.open().await.unwrap();

    fx.session.add_mappings(&[Target::new(1, "Risk")]).unwrap();
    fx.session.owner_updated().await.unwrap();
    let second = fx.session.owner_updated().await.unwrap();

    assert_eq!(second.mapped, 0);
    assert_eq!(fx.store.map_calls(), 1);
}

#[tokio::test]
async fn test_intent_during_drain_starts_fresh_log() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        vec![],
    )
    .await;
    fx.session.open().await.unwrap();
    fx.session.add_mappings(&[Target::new(1, "Risk")]).unwrap();

    let gate = fx.store.gate_next_map().unwrap();
    let during = async {
        gate.entered().await;
        fx.session.add_mappings(&[Target::new(2, "Risk")]).unwrap();
        let absorbed = fx.session.owner_updated().await.unwrap();
        gate.release();
        absorbed
    };
    let (report, absorbed) = tokio::join!(fx.session.owner_updated(), during);
    let report = report.unwrap();

    assert!(absorbed.skipped);
    assert_eq!(report.mapped, 1);
    assert_eq!(
        fx.store.members(&owner, "related_objects").await.unwrap(),
        vec![TargetKey::new(1, "Risk")]
    );
    let pending = fx.session.pending_intents().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key(), &TargetKey::new(2, "Risk"));
    assert_eq!(
        fx.session.resolver().state(),
        ResolverState::AwaitingOwnerCompletion
    );

    fx.session.owner_updated().await.unwrap();
    assert_eq!(
        fx.store.members(&owner, "related_objects").await.unwrap(),
        vec![TargetKey::new(1, "Risk"), TargetKey::new(2, "Risk")]
    );
}

#[tokio::test]
async fn test_new_owner_is_resolved_after_create() {
    let owner = OwnerRef::unsaved("Audit");
    let config = ConnectorConfig::new()
        .default_mapping(DefaultMapping::new(9, "Program"))
        .default_mapping(DefaultMapping {
            id: None,
            type_name: Some("Program".into()),
        });
    let fx = fixture(owner, config, vec![]).await;
    fx.session.open().await.unwrap();

    // The default mapping is shown immediately, hydrated from the cache.
    let snapshot = fx.session.view().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(matches!(&snapshot[0], MembershipEntry::Hydrated(p) if p.title == "SOX"));

    fx.session
        .add_mappings(&[Target::new(5, "Control"), Target::new(1, "Risk")])
        .unwrap();

    fx.session.begin_save().unwrap();
    assert_eq!(fx.session.owner_state().unwrap(), OwnerState::Saving);
    let report = fx.session.owner_created(42).await.unwrap();
    assert_eq!(report.mapped, 3);

    let saved = OwnerRef::new(42, "Audit");
    assert_eq!(
        fx.store.members(&saved, "audit_controls").await.unwrap(),
        vec![TargetKey::new(5, "Control")]
    );
    assert_eq!(
        fx.store.members(&saved, "related_objects").await.unwrap(),
        vec![TargetKey::new(1, "Risk")]
    );
    assert_eq!(
        fx.store
            .members(&saved, "related_objects_as_source")
            .await
            .unwrap(),
        vec![TargetKey::new(9, "Program")]
    );
    assert!(fx.session.resolver().pending_joins().unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_joins_drain_with_empty_log() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        vec![],
    )
    .await;
    fx.session.open().await.unwrap();
    let mut rx = fx.session.subscribe();

    fx.session
        .resolver()
        .mark_for_addition("related_objects", Target::new(2, "Risk"), Default::default())
        .unwrap();
    assert!(fx.session.pending_intents().unwrap().is_empty());

    let report = fx.session.owner_updated().await.unwrap();
    assert_eq!(report.mapped, 1);
    assert_eq!(
        events(&mut rx),
        vec![
            MappingEvent::MappingChanged { target_type: "Risk".into() },
            MappingEvent::SubtreeChanged,
        ]
    );
}

#[tokio::test]
async fn test_failed_group_is_reported_and_not_requeued() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner,
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(5, "Control")],
    )
    .await;
    fx.session.open().await.unwrap();
    let mut rx = fx.session.subscribe();
    fx.store.fail_unmap(true);

    fx.session.add_mappings(&[Target::new(1, "Risk")]).unwrap();
    fx.session.remove_mapping(&Target::new(5, "Control")).unwrap();

    let err = fx.session.owner_updated().await.unwrap_err();
    match &err {
        RelError::ResolutionFailure { failed, .. } => {
            assert_eq!(failed, &vec![Target::new(5, "Control")]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());

    // The successful map group still triggers refreshes for what it touched.
    assert_eq!(
        events(&mut rx),
        vec![
            MappingEvent::MappingChanged { target_type: "Risk".into() },
            MappingEvent::SubtreeChanged,
        ]
    );
    assert!(fx.session.pending_intents().unwrap().is_empty());
    assert!(fx.session.resolver().pending_joins().unwrap().is_empty());
    assert_eq!(fx.session.resolver().state(), ResolverState::Idle);
}

#[tokio::test]
async fn test_validation_gap_is_rejected_synchronously() {
    let fx = fixture(OwnerRef::unsaved("Program"), ConnectorConfig::new(), vec![]).await;
    let broken = Target {
        id: None,
        type_name: "Risk".into(),
        payload: None,
    };

    let err = fx.session.add_mappings(&[broken.clone()]).unwrap_err();
    assert!(matches!(err, RelError::ValidationGap(_)));
    assert!(fx.session.remove_mapping(&broken).is_err());
    assert!(fx.session.pending_intents().unwrap().is_empty());
    assert!(fx.session.view().is_empty());
}

#[tokio::test]
async fn test_snapshot_option_is_forwarded() {
    let config = ConnectorConfig::new()
        .mapping("related_objects")
        .use_snapshots(true);
    let fx = fixture(OwnerRef::new(10, "Audit"), config, vec![]).await;
    fx.session.open().await.unwrap();

    fx.session.add_mappings(&[Target::new(1, "Risk")]).unwrap();
    fx.session.owner_updated().await.unwrap();
    assert_eq!(
        fx.store.last_map_options(),
        Some(MapOptions { use_snapshots: true })
    );
}

#[tokio::test]
async fn test_custom_loader_skips_baseline() {
    let config = ConnectorConfig::new()
        .mapping("related_objects")
        .custom_related_loader(true);
    let fx = fixture(OwnerRef::new(10, "Program"), config, vec![Target::new(1, "Risk")]).await;
    fx.session.open().await.unwrap();
    assert!(fx.session.view().is_empty());

    fx.session
        .set_list_items(&[Target::new(2, "Risk")])
        .unwrap();
    assert_eq!(fx.session.view().identities(), keys(&[(2, "Risk")]));
}

#[tokio::test]
async fn test_close_without_saving_leaves_store_untouched() {
    let owner = OwnerRef::new(10, "Program");
    let fx = fixture(
        owner.clone(),
        ConnectorConfig::new().mapping("related_objects"),
        vec![Target::new(1, "Risk")],
    )
    .await;
    fx.session.open().await.unwrap();
    fx.session.add_mappings(&[Target::new(2, "Risk")]).unwrap();
    fx.session.remove_mapping(&Target::new(1, "Risk")).unwrap();

    let store = fx.store.clone();
    assert_eq!(fx.session.close().unwrap(), 2);
    assert_eq!(store.map_calls() + store.unmap_calls(), 0);
    assert_eq!(
        store.members(&owner, "related_objects").await.unwrap(),
        vec![TargetKey::new(1, "Risk")]
    );
}
