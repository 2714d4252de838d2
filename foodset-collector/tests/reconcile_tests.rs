//! End-to-end reconciliation passes against a fake provider

mod helpers;

use foodset_collector::db;
use foodset_collector::models::{Partition, PassMode, SYSTEM_DESCRIPTION, SYSTEM_OWNER_ID};
use foodset_collector::services::{InventoryScanner, QuotaCalculator};
use helpers::{fill_category, write_corrupt, FakeProvider, TestEnv};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_partial_delivery_shrinks_deficit() {
    let env = TestEnv::new(&["огурец"], 5, 2).await;
    let train_dir = env.partition_dir(Partition::Train);
    fill_category(&train_dir, "огурец", 2);

    let provider = Arc::new(FakeProvider::new().delivering(1));
    let reconciler = env.reconciler(provider.clone());

    let summary = reconciler
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.images_requested, 3);
    assert_eq!(summary.files_fetched, 1);
    assert_eq!(summary.records_added, 1);
    assert!(summary.failed_categories.is_empty());

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_count, 3);
    assert_eq!(requests[0].start_index, 3);

    let scanner = InventoryScanner::new();
    assert_eq!(scanner.count(&train_dir.join("огурец")).unwrap(), 3);

    let report = QuotaCalculator::default().compute(&env.registry, 5, &train_dir);
    assert_eq!(report.deficits.get("огурец"), Some(&2));
}

#[tokio::test]
async fn test_satisfied_categories_are_not_fetched() {
    let env = TestEnv::new(&["лимон", "хлеб"], 3, 2).await;
    fill_category(&env.partition_dir(Partition::Train), "лимон", 3);

    let provider = Arc::new(FakeProvider::new());
    let summary = env
        .reconciler(provider.clone())
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.categories_requested, 1);
    let calls = provider.calls();
    assert!(!calls.contains_key("лимон"));
    assert_eq!(calls.get("хлеб"), Some(&1));
    assert_eq!(summary.records_added, 3);
}

#[tokio::test]
async fn test_corrupt_download_deleted_and_not_recorded() {
    let env = TestEnv::new(&["апельсин"], 3, 1).await;
    let provider = Arc::new(FakeProvider::new().corrupt_at(1));
    let reconciler = env.reconciler(provider);

    let summary = reconciler
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.files_fetched, 3);
    assert_eq!(summary.files_deleted, 1);
    assert_eq!(summary.records_added, 2);
    assert_eq!(summary.files_accepted(), 2);

    let dir = env.partition_dir(Partition::Train).join("апельсин");
    assert!(!dir.join("000002.png").exists());

    let stats = reconciler.recorder().get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 2);
    assert_eq!(stats.by_category.get("апельсин"), Some(&2));
}

#[tokio::test]
async fn test_system_records_are_verified_and_owned_by_system() {
    let env = TestEnv::new(&["сыр"], 1, 1).await;
    let reconciler = env.reconciler(Arc::new(FakeProvider::new()));
    reconciler
        .run_pass(Partition::Eval, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    let path = env.partition_dir(Partition::Eval).join("сыр").join("000001.png");
    let record = db::records::load_record(&env.pool, &path.to_string_lossy())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.partition, Partition::Eval);
    assert_eq!(record.label, "сыр");
    assert!(record.verified);
    assert_eq!(record.description, SYSTEM_DESCRIPTION);
    assert_eq!(record.owner_id, SYSTEM_OWNER_ID);

    // partitions never mix
    let train = reconciler.recorder().get_statistics(Partition::Train).await.unwrap();
    assert_eq!(train.total_images, 0);
}

#[tokio::test]
async fn test_failed_category_does_not_affect_others() {
    let env = TestEnv::new(&["груша", "яблоко"], 2, 2).await;
    let provider = Arc::new(FakeProvider::new().failing_for("груша"));

    let summary = env
        .reconciler(provider)
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed_categories, vec!["груша".to_string()]);
    assert_eq!(summary.records_added, 2);

    let report = QuotaCalculator::default().compute(
        &env.registry,
        2,
        &env.partition_dir(Partition::Train),
    );
    assert_eq!(report.deficits.get("груша"), Some(&2));
    assert!(!report.deficits.contains_key("яблоко"));
}

#[tokio::test]
async fn test_seed_requests_full_quota_and_never_overwrites() {
    let env = TestEnv::new(&["огурец"], 4, 1).await;
    let existing = fill_category(&env.partition_dir(Partition::Train), "огурец", 4);
    let before: Vec<Vec<u8>> = existing.iter().map(|p| std::fs::read(p).unwrap()).collect();

    let provider = Arc::new(FakeProvider::new());
    let summary = env
        .reconciler(provider.clone())
        .run_pass(Partition::Train, PassMode::Seed, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.images_requested, 4);
    assert_eq!(provider.requests()[0].start_index, 5);
    assert_eq!(summary.records_added, 4);

    let after: Vec<Vec<u8>> = existing.iter().map(|p| std::fs::read(p).unwrap()).collect();
    assert_eq!(before, after);

    let files = InventoryScanner::new()
        .list_files(&env.partition_dir(Partition::Train).join("огурец"))
        .unwrap();
    let stems: HashSet<_> = files.iter().map(|p| p.file_stem().unwrap().to_owned()).collect();
    assert_eq!(files.len(), 8);
    assert_eq!(stems.len(), 8);
}

#[tokio::test]
async fn test_cancelled_pass_reports_unstarted_jobs() {
    let env = TestEnv::new(&["a", "b", "c"], 1, 1).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let provider = Arc::new(FakeProvider::new());
    let summary = env
        .reconciler(provider.clone())
        .run_pass(Partition::Train, PassMode::Reconcile, &cancel)
        .await
        .unwrap();

    assert!(summary.is_cancelled());
    assert_eq!(summary.cancelled_categories.len(), 3);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_pass_summary_is_persisted() {
    let env = TestEnv::new(&["a"], 2, 1).await;
    let summary = env
        .reconciler(Arc::new(FakeProvider::new()))
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    let stored = db::passes::load_pass(&env.pool, summary.pass_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.records_added, 2);
    assert_eq!(stored.mode, PassMode::Reconcile);
    assert!(stored.ended_at.is_some());
}

#[tokio::test]
async fn test_sync_partition_is_idempotent() {
    let env = TestEnv::new(&["лимон", "хлеб"], 10, 1).await;
    let train_dir = env.partition_dir(Partition::Train);
    fill_category(&train_dir, "лимон", 3);
    let bread = fill_category(&train_dir, "хлеб", 1);
    write_corrupt(&bread[0].with_file_name("000002.jpg"));

    let reconciler = env.reconciler(Arc::new(FakeProvider::new()));

    let first = reconciler.sync_partition(Partition::Train).await.unwrap();
    assert_eq!(first.files_checked, 5);
    assert_eq!(first.files_deleted, 1);
    assert_eq!(first.records_added, 4);

    let second = reconciler.sync_partition(Partition::Train).await.unwrap();
    assert_eq!(second.files_checked, 4);
    assert_eq!(second.records_added, 0);
    assert_eq!(second.records_skipped, 4);

    let stats = reconciler.recorder().get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 4);
    assert!(stats.trainable_samples <= stats.total_images);
}

#[tokio::test]
async fn test_sweep_deletes_corrupt_files() {
    let env = TestEnv::new(&["лимон"], 10, 1).await;
    let files = fill_category(&env.partition_dir(Partition::Eval), "лимон", 2);
    write_corrupt(&files[1]);

    let reconciler = env.reconciler(Arc::new(FakeProvider::new()));
    let report = reconciler.sweep(Partition::Eval).await.unwrap();

    assert_eq!(report.valid, vec![files[0].clone()]);
    assert_eq!(report.deleted, vec![files[1].clone()]);
    assert!(!files[1].exists());
}

#[tokio::test]
async fn test_pass_records_files_left_unrecorded() {
    let env = TestEnv::new(&["лимон", "хлеб"], 3, 1).await;
    let train_dir = env.partition_dir(Partition::Train);
    fill_category(&train_dir, "лимон", 3);
    let bread = fill_category(&train_dir, "хлеб", 2);
    write_corrupt(&bread[1]);

    let provider = Arc::new(FakeProvider::new());
    let reconciler = env.reconciler(provider.clone());
    let summary = reconciler
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();

    // the corrupt leftover is removed before the deficit is computed
    assert_eq!(summary.records_recovered, 4);
    assert_eq!(summary.files_deleted, 1);
    assert_eq!(summary.images_requested, 2);
    assert!(!provider.calls().contains_key("лимон"));
    assert_eq!(summary.records_added, 2);

    let stats = reconciler.recorder().get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 6);
    assert_eq!(stats.by_category.get("лимон"), Some(&3));
    assert_eq!(stats.by_category.get("хлеб"), Some(&3));

    let again = reconciler
        .run_pass(Partition::Train, PassMode::Reconcile, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.records_recovered, 0);
    assert_eq!(again.images_requested, 0);
}
