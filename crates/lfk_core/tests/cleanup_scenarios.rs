//! End-to-end batch cleanup against the in-memory store.

use lfk_core::memory::InMemoryCleanupStore;
use lfk_core::{
    BatchCleaner, BatchState, CleanupConfig, DeletedParentBatch, LockMode, ModificationTracker,
    RecordStatus, RelationDefinition, RelationRegistry, Strategy,
};

// ── Test Infrastructure ──────────────────────────────────────────

fn registry(strategy: Strategy) -> RelationRegistry {
    RelationRegistry::new(vec![RelationDefinition::new("p", "c", "p_id", strategy)]).unwrap()
}

fn config(batch_size: i64) -> CleanupConfig {
    CleanupConfig {
        delete_batch_size: batch_size,
        update_batch_size: batch_size,
        max_runtime_secs: 0,
        ..CleanupConfig::default()
    }
}

/// Three children of parent 1, two of parent 2, nothing unrelated.
async fn seed() -> (InMemoryCleanupStore, DeletedParentBatch) {
    let store = InMemoryCleanupStore::new();
    for _ in 0..3 {
        store.insert_row("c", &[("p_id", Some(1))]).await;
    }
    for _ in 0..2 {
        store.insert_row("c", &[("p_id", Some(2))]).await;
    }
    let first = store.record_deletion("p", 1).await;
    let second = store.record_deletion("p", 2).await;
    let batch = DeletedParentBatch::new("public.p", vec![first, second]).unwrap();
    (store, batch)
}

async fn processed_count(store: &InMemoryCleanupStore) -> usize {
    store
        .deleted_records()
        .await
        .iter()
        .filter(|r| r.status == RecordStatus::Processed)
        .count()
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_deletes_everything_and_finalizes() {
    let (store, batch) = seed().await;
    let registry = registry(Strategy::AsyncDelete);
    let config = config(1000);
    let mut tracker = ModificationTracker::new(100);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.state, BatchState::Done);
    assert!(outcome.finalized);
    assert_eq!(outcome.marked_processed, 2);
    assert_eq!(store.row_count("c").await, 0);
    assert_eq!(processed_count(&store).await, 2);
    assert_eq!(tracker.deletions_for("c"), 5);
    assert_eq!(tracker.updates(), 0);
}

#[tokio::test]
async fn scenario_b_stops_when_budget_is_exhausted() {
    let (store, batch) = seed().await;
    let registry = registry(Strategy::AsyncDelete);
    let config = config(2);
    let mut tracker = ModificationTracker::new(2);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    assert!(outcome.over_limit);
    assert!(!outcome.finalized);
    assert!(tracker.over_limit());
    assert_eq!(tracker.deletions_for("c"), 2);
    assert_eq!(store.row_count("c").await, 3);
    assert_eq!(store.passes().await.len(), 1);
    assert_eq!(processed_count(&store).await, 0);
}

#[tokio::test]
async fn scenario_c_nullify_keeps_rows_and_counts_updates() {
    let (store, batch) = seed().await;
    let registry = registry(Strategy::AsyncNullify);
    let config = config(1000);
    let mut tracker = ModificationTracker::new(100);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    assert!(outcome.finalized);
    assert_eq!(store.row_count("c").await, 5);
    assert_eq!(store.count_where("c", "p_id", None).await, 5);
    assert_eq!(tracker.updates_for("c"), 5);
    assert_eq!(tracker.deletions(), 0);
}

#[tokio::test]
async fn scenario_d_blocking_pass_picks_up_locked_rows() {
    let (store, batch) = seed().await;
    store.lock_row("c", 1).await;
    let registry = registry(Strategy::AsyncDelete);
    let config = config(1000);
    let mut tracker = ModificationTracker::new(100);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    let summary = &outcome.relations[0];
    assert_eq!(summary.skip_locked_rows, 4);
    assert_eq!(summary.blocking_rows, 1);
    assert!(summary.drained);
    assert_eq!(store.waited_on_locks().await, 1);
    assert_eq!(store.row_count("c").await, 0);

    let passes = store.passes().await;
    let first_blocking = passes
        .iter()
        .position(|p| p.lock_mode == LockMode::Blocking)
        .unwrap();
    assert!(passes[..first_blocking]
        .iter()
        .all(|p| p.lock_mode == LockMode::SkipLocked));
    assert_eq!(passes[first_blocking].affected_rows, 1);
}

// ── Properties ───────────────────────────────────────────────────

#[tokio::test]
async fn second_run_is_a_noop() {
    let (store, batch) = seed().await;
    let registry = registry(Strategy::AsyncDelete);
    let config = config(2);

    let mut first = ModificationTracker::new(100);
    BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut first)
        .await
        .unwrap();

    let mut second = ModificationTracker::new(100);
    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut second)
        .await
        .unwrap();

    assert_eq!(second.total(), 0);
    assert_eq!(outcome.marked_processed, 0);
    assert_eq!(store.row_count("c").await, 0);
}

#[tokio::test]
async fn budget_overshoot_is_at_most_one_batch() {
    for ceiling in 1..=6u64 {
        let (store, batch) = seed().await;
        let registry = registry(Strategy::AsyncDelete);
        let config = config(2);
        let mut tracker = ModificationTracker::new(ceiling);

        let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
            .execute(&mut tracker)
            .await
            .unwrap();

        assert!(
            tracker.total() < ceiling + 2,
            "ceiling {ceiling}: total {}",
            tracker.total()
        );
        // finalized iff the budget held
        assert_eq!(outcome.finalized, !outcome.over_limit, "ceiling {ceiling}");
        if outcome.over_limit {
            assert_eq!(processed_count(&store).await, 0, "ceiling {ceiling}");
        } else {
            assert_eq!(store.row_count("c").await, 0, "ceiling {ceiling}");
        }
    }
}

#[tokio::test]
async fn interrupted_run_resumes_on_next_invocation() {
    let (store, batch) = seed().await;
    let registry = registry(Strategy::AsyncDelete);
    let config = config(2);

    let mut tracker = ModificationTracker::new(2);
    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();
    assert!(!outcome.finalized);

    let mut tracker = ModificationTracker::new(100);
    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    assert!(outcome.finalized);
    assert_eq!(tracker.deletions_for("c"), 3);
    assert_eq!(processed_count(&store).await, 2);
}

#[tokio::test]
async fn relations_run_in_declaration_order() {
    let store = InMemoryCleanupStore::new();
    store.insert_row("z_children", &[("p_id", Some(1))]).await;
    store.insert_row("a_children", &[("p_id", Some(1))]).await;
    let record = store.record_deletion("p", 1).await;
    let batch = DeletedParentBatch::new("public.p", vec![record]).unwrap();
    let registry = RelationRegistry::new(vec![
        RelationDefinition::new("p", "z_children", "p_id", Strategy::AsyncDelete),
        RelationDefinition::new("p", "a_children", "p_id", Strategy::AsyncNullify),
    ])
    .unwrap();
    let config = config(1000);
    let mut tracker = ModificationTracker::new(100);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    let tables: Vec<&str> = outcome
        .relations
        .iter()
        .map(|r| r.child_table.as_str())
        .collect();
    assert_eq!(tables, vec!["z_children", "a_children"]);
    assert_eq!(store.passes().await[0].table, "z_children");
    assert_eq!(tracker.deletions_for("z_children"), 1);
    assert_eq!(tracker.updates_for("a_children"), 1);
}

#[tokio::test]
async fn budget_stops_before_later_relations() {
    let store = InMemoryCleanupStore::new();
    store.insert_row("first", &[("p_id", Some(1))]).await;
    store.insert_row("second", &[("p_id", Some(1))]).await;
    let record = store.record_deletion("p", 1).await;
    let batch = DeletedParentBatch::new("public.p", vec![record]).unwrap();
    let registry = RelationRegistry::new(vec![
        RelationDefinition::new("p", "first", "p_id", Strategy::AsyncDelete),
        RelationDefinition::new("p", "second", "p_id", Strategy::AsyncDelete),
    ])
    .unwrap();
    let config = config(1000);
    let mut tracker = ModificationTracker::new(1);

    let outcome = BatchCleaner::new(&store, &registry, &batch, &config)
        .execute(&mut tracker)
        .await
        .unwrap();

    assert!(outcome.over_limit);
    assert_eq!(outcome.relations.len(), 1);
    assert_eq!(store.row_count("second").await, 1);
}
