//! Dataset recorder statistics and concurrent appends

mod helpers;

use foodset_collector::models::Partition;
use foodset_collector::services::DatasetRecorder;
use helpers::TestEnv;
use std::path::PathBuf;
use std::sync::Arc;

async fn recorder(env: &TestEnv) -> DatasetRecorder {
    DatasetRecorder::new(
        env.pool.clone(),
        Arc::clone(&env.registry),
        env.config.min_confidence,
        env.config.trainable_threshold,
    )
}

#[tokio::test]
async fn test_can_train_flips_at_threshold() {
    let env = TestEnv::new(&["лимон"], 50, 1).await;
    let recorder = recorder(&env).await;
    assert_eq!(recorder.trainable_threshold(), 20);

    for i in 0..19 {
        let path = PathBuf::from(format!("/data/лимон/{:06}.png", i));
        recorder
            .record(Partition::Train, &path, "", Some("лимон"), 0)
            .await
            .unwrap();
    }
    let stats = recorder.get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.trainable_samples, 19);
    assert!(!stats.can_train);

    recorder
        .record(Partition::Train, &PathBuf::from("/data/лимон/x.png"), "", Some("лимон"), 0)
        .await
        .unwrap();
    let stats = recorder.get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.trainable_samples, 20);
    assert!(stats.can_train);
}

#[tokio::test]
async fn test_unknown_labels_count_but_are_not_trainable() {
    let env = TestEnv::new(&["лимон"], 50, 1).await;
    let recorder = recorder(&env).await;

    recorder
        .record(Partition::Train, &PathBuf::from("/u/1.png"), "тарелка супа", None, 5)
        .await
        .unwrap();
    recorder
        .record(Partition::Train, &PathBuf::from("/u/2.png"), "лимонный пирог", None, 5)
        .await
        .unwrap();

    let stats = recorder.get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 2);
    assert_eq!(stats.trainable_samples, 1);
    assert_eq!(stats.by_category.get("unknown"), Some(&1));
    assert_eq!(stats.by_category.get("лимон"), Some(&1));

    let samples = recorder.labeled_samples(Partition::Train).await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].path, "/u/2.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_records_collapse_to_one() {
    let env = TestEnv::new(&["лимон", "хлеб"], 50, 1).await;
    let recorder = recorder(&env).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let recorder = recorder.clone();
        let label = if i % 2 == 0 { "лимон" } else { "хлеб" };
        handles.push(tokio::spawn(async move {
            recorder
                .record(
                    Partition::Train,
                    &PathBuf::from("/shared/000001.png"),
                    "",
                    Some(label),
                    0,
                )
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let accepted: Vec<_> = outcomes.iter().filter(|o| o.accepted).collect();
    assert_eq!(accepted.len(), 1);
    let winner = accepted[0].assigned_label.clone();
    assert!(outcomes.iter().all(|o| o.assigned_label == winner));

    let stats = recorder.get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_records_all_counted() {
    let env = TestEnv::new(&["лимон"], 50, 1).await;
    let recorder = recorder(&env).await;

    let mut handles = Vec::new();
    for worker in 0..4 {
        let recorder = recorder.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                let path = PathBuf::from(format!("/w{}/{:06}.png", worker, i));
                recorder
                    .record(Partition::Train, &path, "", Some("лимон"), 0)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = recorder.get_statistics(Partition::Train).await.unwrap();
    assert_eq!(stats.total_images, 40);
    assert_eq!(stats.trainable_samples, 40);
    assert!(stats.trainable_samples <= stats.total_images);
    assert!(stats.can_train);
}
