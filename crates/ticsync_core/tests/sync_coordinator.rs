mod support;

use chrono::{DateTime, TimeDelta, Utc};
use futures::executor::block_on;
use std::rc::Rc;
use support::{
    advance, clock, configured_store, recommendation_input, signed_in, store_with, t0,
    tic_input, unreachable, BrokenStorage, FakeGenerator, FakeRemote,
};
use ticsync_core::{
    Clock, DrainOutcome, DrainReport, EntityStore, GenerateRemote, GenerationOutcome,
    InMemoryKeyValueStore, KeyValueStore, ManualClock, Mutation, OperationKind, RangeReader,
    Recommendation, RecommendationPatch, RecordId, Snapshot, SqliteKeyValueStore, StoreConfig,
    SyncCoordinator, TicLog,
};

fn tic_coordinator(
    clock: &Rc<ManualClock>,
    storage: Rc<dyn KeyValueStore>,
) -> (Rc<FakeRemote<TicLog>>, SyncCoordinator<TicLog>) {
    let remote = FakeRemote::<TicLog>::new(clock.clone());
    let store = store_with(remote.clone(), signed_in(), clock.clone());
    (remote, SyncCoordinator::new(store, storage))
}

fn delete(id: &str) -> Mutation<TicLog> {
    Mutation::Delete {
        id: RecordId::new(id),
    }
}

#[test]
fn drain_replays_queue_and_stamps_last_sync() {
    let clock = clock();
    let storage = Rc::new(InMemoryKeyValueStore::new());
    let (remote, coordinator) = tic_coordinator(&clock, storage.clone());
    let store = coordinator.store();

    remote.fail_with(unreachable());
    block_on(store.create(tic_input("t1", 5))).unwrap_err();
    block_on(store.create(tic_input("t2", 6))).unwrap_err();
    assert_eq!(store.queue_len(), 2);

    remote.heal();
    advance(&clock, 5);
    let started = clock.now();
    let outcome = block_on(coordinator.sync_pending());

    assert_eq!(
        outcome,
        DrainOutcome::Completed(DrainReport {
            snapshot: 2,
            attempted: 2,
            confirmed: 2,
            discarded: 0,
        })
    );
    assert_eq!(store.queue_len(), 0);
    assert_eq!(store.len(), 2);
    assert!(store.last_sync().is_some_and(|at| at >= started));
    assert_eq!(store.error(), None);
    assert!(!store.is_draining());

    let saved = storage.load("ticsync.tic_log").unwrap().unwrap();
    let snapshot = Snapshot::<TicLog>::decode(&saved).unwrap();
    assert_eq!(snapshot.entities.len(), 2);
    assert!(snapshot.queue.is_empty());
    assert_eq!(snapshot.last_sync, store.last_sync());
}

#[test]
fn halted_drain_keeps_the_tail_and_last_sync() {
    let clock = clock();
    let storage = Rc::new(InMemoryKeyValueStore::new());
    let (remote, coordinator) = tic_coordinator(&clock, storage.clone());
    let store = coordinator.store();
    store.defer(delete("srv-a"));
    store.defer(delete("srv-b"));
    store.defer(delete("srv-c"));

    remote.script(vec![Ok(()), Err(unreachable())]);
    let outcome = block_on(coordinator.sync_pending());

    match outcome {
        DrainOutcome::Halted { report, error } => {
            assert_eq!(report.confirmed, 1);
            assert_eq!(report.attempted, 2);
            assert!(error.is_retryable());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let remaining = store
        .pending_operations()
        .into_iter()
        .map(|op| op.logical_key())
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec!["delete:srv-b", "delete:srv-c"]);
    assert_eq!(store.last_sync(), None);
    assert!(store
        .error()
        .is_some_and(|message| message.starts_with("sync halted")));
    assert!(!store.is_draining());

    let saved = storage.load("ticsync.tic_log").unwrap().unwrap();
    let snapshot = Snapshot::<TicLog>::decode(&saved).unwrap();
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.last_sync, None);

    let outcome = block_on(coordinator.sync_pending());
    assert!(matches!(outcome, DrainOutcome::Completed(_)));
    assert_eq!(store.queue_len(), 0);
    assert!(store.last_sync().is_some());
}

#[test]
fn unreplayable_ops_are_discarded_without_halting() {
    let clock = clock();
    let remote = FakeRemote::<Recommendation>::new(clock.clone());
    let store = store_with(remote.clone(), signed_in(), clock);
    let coordinator = SyncCoordinator::new(store.clone(), Rc::new(InMemoryKeyValueStore::new()));
    store.defer(Mutation::Feedback {
        id: RecordId::new("srv-gone"),
        patch: RecommendationPatch::feedback(true, None),
    });

    let outcome = block_on(coordinator.sync_pending());

    match outcome {
        DrainOutcome::Completed(report) => assert_eq!(report.discarded, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(store.queue_len(), 0);
    assert_eq!(remote.calls().updates, 0);
}

#[test]
fn overlapping_sync_is_skipped() {
    let clock = clock();
    let (remote, coordinator) = tic_coordinator(&clock, Rc::new(InMemoryKeyValueStore::new()));
    let store = coordinator.store();
    store.defer(Mutation::create(tic_input("t1", 5)));
    let release = remote.gate_next_create();

    let (first, second, ()) = block_on(async {
        futures::join!(coordinator.sync_pending(), coordinator.sync_pending(), async {
            assert!(store.is_draining());
            let _ = release.send(());
        })
    });

    assert!(matches!(first, DrainOutcome::Completed(_)));
    assert_eq!(second, DrainOutcome::Skipped);
    assert_eq!(remote.calls().creates, 1);
    assert_eq!(store.len(), 1);
    assert!(!store.is_draining());
}

struct RecommendationRig {
    tic_store: Rc<EntityStore<TicLog>>,
    remote: Rc<FakeRemote<Recommendation>>,
    generator: Rc<FakeGenerator>,
    coordinator: SyncCoordinator<Recommendation>,
}

fn recommendation_rig(clock: &Rc<ManualClock>, config: StoreConfig) -> RecommendationRig {
    let tic_remote = FakeRemote::<TicLog>::new(clock.clone());
    let tic_store = store_with(tic_remote, signed_in(), clock.clone());
    let generator = FakeGenerator::new(clock.clone());
    let remote = FakeRemote::<Recommendation>::new(clock.clone());
    let rec_store = configured_store(remote.clone(), signed_in(), clock.clone(), config);

    let source: Rc<dyn RangeReader<TicLog>> = tic_store.clone();
    let generate: Rc<dyn GenerateRemote<TicLog, Recommendation>> = generator.clone();
    let coordinator = SyncCoordinator::new(rec_store, Rc::new(InMemoryKeyValueStore::new()))
        .with_recent_window(source, generate);
    RecommendationRig {
        tic_store,
        remote,
        generator,
        coordinator,
    }
}

fn default_rig(clock: &Rc<ManualClock>) -> RecommendationRig {
    recommendation_rig(clock, StoreConfig::for_record::<Recommendation>())
}

fn recommendation_setup(
    clock: &Rc<ManualClock>,
) -> (
    Rc<EntityStore<TicLog>>,
    Rc<FakeGenerator>,
    SyncCoordinator<Recommendation>,
) {
    let rig = default_rig(clock);
    (rig.tic_store, rig.generator, rig.coordinator)
}

#[test]
fn generation_runs_once_per_cooldown() {
    let clock = clock();
    let (tic_store, generator, coordinator) = recommendation_setup(&clock);
    block_on(tic_store.create(tic_input("t1", 4))).unwrap();
    block_on(tic_store.create(tic_input("t1", 7))).unwrap();

    let first = block_on(coordinator.generate_derived("t1")).unwrap();
    advance(&clock, 59);
    let second = block_on(coordinator.generate_derived("t1")).unwrap();

    assert_eq!(first, GenerationOutcome::Generated(1));
    assert_eq!(second, GenerationOutcome::CoolingDown);
    assert_eq!(generator.calls(), 1);
    assert_eq!(generator.contexts(), vec![2]);
    assert_eq!(coordinator.store().len(), 1);
    assert_eq!(coordinator.store().last_generated("t1"), Some(t0()));

    let other = block_on(coordinator.generate_derived("t2")).unwrap();
    assert_eq!(other, GenerationOutcome::Generated(1));

    advance(&clock, 1);
    let third = block_on(coordinator.generate_derived("t1")).unwrap();
    assert_eq!(third, GenerationOutcome::Generated(1));
    assert_eq!(generator.calls(), 3);
    assert_eq!(coordinator.store().len(), 3);
}

#[test]
fn failed_generation_leaves_cooldown_unstamped() {
    let clock = clock();
    let (_tic_store, generator, coordinator) = recommendation_setup(&clock);
    generator.fail_with(unreachable());

    block_on(coordinator.generate_derived("t1")).unwrap_err();
    assert_eq!(coordinator.store().last_generated("t1"), None);
    assert!(coordinator.store().error().is_some());

    generator.heal();
    let retry = block_on(coordinator.generate_derived("t1")).unwrap();
    assert_eq!(retry, GenerationOutcome::Generated(1));
    assert_eq!(generator.calls(), 2);
}

#[test]
fn generation_without_deriver_is_unavailable() {
    let clock = clock();
    let store = store_with(
        FakeRemote::<Recommendation>::new(clock.clone()),
        signed_in(),
        clock,
    );
    let coordinator = SyncCoordinator::new(store, Rc::new(InMemoryKeyValueStore::new()));

    let outcome = block_on(coordinator.generate_derived("t1")).unwrap();

    assert_eq!(outcome, GenerationOutcome::Unavailable);
}

#[test]
fn restore_reads_last_sync_from_snapshot() {
    let clock = clock();
    let storage = Rc::new(InMemoryKeyValueStore::new().with_entry(
        "ticsync.tic_log",
        r#"{"version":1,"entities":[],"queue":[],"lastSync":"2024-01-01T00:00:00Z"}"#,
    ));
    let (_remote, coordinator) = tic_coordinator(&clock, storage);

    assert!(coordinator.restore());

    let expected = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
    assert_eq!(coordinator.store().last_sync(), Some(expected));
    assert_eq!(coordinator.store().queue_len(), 0);
}

#[test]
fn malformed_or_future_snapshots_degrade_to_empty_state() {
    for text in ["not json", r#"{"version":99,"entities":[]}"#] {
        let clock = clock();
        let storage = Rc::new(InMemoryKeyValueStore::new().with_entry("ticsync.tic_log", text));
        let (_remote, coordinator) = tic_coordinator(&clock, storage);

        assert!(!coordinator.restore());
        assert!(coordinator.store().is_empty());
        assert_eq!(coordinator.store().last_sync(), None);
    }
}

#[test]
fn persistence_failures_are_swallowed() {
    let clock = clock();
    let (remote, coordinator) = tic_coordinator(&clock, Rc::new(BrokenStorage));
    let store = coordinator.store();

    assert!(!coordinator.restore());
    remote.fail_with(unreachable());
    block_on(store.create(tic_input("t1", 5))).unwrap_err();
    remote.heal();

    let outcome = block_on(coordinator.sync_pending());

    assert!(matches!(outcome, DrainOutcome::Completed(_)));
    assert_eq!(store.len(), 1);
    assert!(store.last_sync().is_some());
    assert_eq!(store.error(), None);
}

#[test]
fn queued_work_survives_a_restart_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticsync.db");

    let clock = clock();
    let storage = Rc::new(SqliteKeyValueStore::open(&path).unwrap());
    let (remote, coordinator) = tic_coordinator(&clock, storage);
    let store = coordinator.store();
    let kept = block_on(store.create(tic_input("t1", 5))).unwrap();
    remote.fail_with(unreachable());
    block_on(store.delete(&kept.id)).unwrap_err();
    block_on(store.create(tic_input("t2", 3))).unwrap_err();
    coordinator.persist();
    drop(coordinator);

    let reopened = Rc::new(SqliteKeyValueStore::open(&path).unwrap());
    let (_remote, restarted) = tic_coordinator(&clock, reopened);
    assert!(restarted.restore());

    let store = restarted.store();
    assert_eq!(store.records(), vec![kept]);
    let kinds = store
        .pending_operations()
        .iter()
        .map(|op| op.kind())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![OperationKind::Delete, OperationKind::Create]);
    assert!(store.recent().iter().all(|record| !record.id.is_local()));
}

#[test]
fn window_covers_the_configured_days_only() {
    let clock = clock();
    let (tic_store, generator, coordinator) = recommendation_setup(&clock);
    block_on(tic_store.create(tic_input("t1", 4))).unwrap();
    clock.advance(TimeDelta::days(8));
    block_on(tic_store.create(tic_input("t1", 6))).unwrap();

    block_on(coordinator.generate_derived("t1")).unwrap();

    assert_eq!(generator.contexts(), vec![1]);
}

#[test]
fn window_follows_the_recommendation_store_config() {
    let clock = clock();
    let config =
        StoreConfig::for_record::<Recommendation>().with_derivation_window(TimeDelta::days(2));
    let rig = recommendation_rig(&clock, config);
    block_on(rig.tic_store.create(tic_input("t1", 4))).unwrap();
    clock.advance(TimeDelta::days(3));
    block_on(rig.tic_store.create(tic_input("t1", 6))).unwrap();

    block_on(rig.coordinator.generate_derived("t1")).unwrap();

    assert_eq!(rig.generator.contexts(), vec![1]);
}

#[test]
fn oversized_window_reads_all_history() {
    let clock = clock();
    let config: StoreConfig =
        serde_json::from_str(r#"{ "derivationWindowSecs": 9223372036854775807 }"#).unwrap();
    let rig = recommendation_rig(&clock, config);
    block_on(rig.tic_store.create(tic_input("t1", 4))).unwrap();
    clock.advance(TimeDelta::days(400));
    block_on(rig.tic_store.create(tic_input("t1", 6))).unwrap();

    let outcome = block_on(rig.coordinator.generate_derived("t1")).unwrap();

    assert_eq!(outcome, GenerationOutcome::Generated(1));
    assert_eq!(rig.generator.contexts(), vec![2]);
}

#[test]
fn generated_records_lead_the_recent_projection() {
    let clock = clock();
    let rig = default_rig(&clock);
    let store = rig.coordinator.store();
    block_on(store.create(recommendation_input("t1", "Breathing"))).unwrap();
    advance(&clock, 5);

    block_on(rig.coordinator.generate_derived("t1")).unwrap();

    let ids = store
        .recent()
        .iter()
        .map(|record| record.id.as_str().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["rec-t1-1", "srv-1"]);
}

#[test]
fn failed_create_after_generation_keeps_recent_unchanged() {
    let clock = clock();
    let rig = default_rig(&clock);
    let store = rig.coordinator.store();
    for n in 0..10 {
        block_on(store.create(recommendation_input("t1", &format!("Tip {n}")))).unwrap();
    }
    advance(&clock, 5);
    block_on(rig.coordinator.generate_derived("t1")).unwrap();
    let before = store.recent();
    assert_eq!(before.len(), 10);
    assert_eq!(before[0].id.as_str(), "rec-t1-1");

    rig.remote.fail_with(unreachable());
    block_on(store.create(recommendation_input("t1", "Offline tip"))).unwrap_err();

    assert_eq!(store.recent(), before);
    assert_eq!(store.queue_len(), 1);
}
