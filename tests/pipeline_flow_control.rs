//! Backpressure, drain, gating and ordering behavior of the pipeline

mod fixtures;

use fixtures::{pipeline, ready_backend, seed_edit_item};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use vton_forge::pipeline::{DownloadStage, QueueMessage};
use vton_forge::{
    EditJob, KeyLayout, MemoryObjectStore, NoOpProgressReporter, ObjectStore, PipelineConfig,
    ResumeIndex, WorkFilter, WorkOrder,
};

fn seed_items(store: &MemoryObjectStore, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| seed_edit_item(store, "easy", "female", "partition_0", &format!("{i:03}_0"), &format!("prompt {i:03}")))
        .collect()
}

#[tokio::test]
async fn test_producer_blocks_when_queue_is_full() {
    let store = MemoryObjectStore::new();
    let keys = seed_items(&store, 10);

    let stage = DownloadStage::new(
        Arc::new(EditJob::new(KeyLayout::default())),
        Arc::new(store.clone()) as Arc<dyn ObjectStore>,
        Arc::new(NoOpProgressReporter),
    );
    let (tx, mut rx) = mpsc::channel(2);
    let producer = tokio::spawn(stage.run(keys, ResumeIndex::empty(), WorkFilter::new(), WorkOrder::Sorted, tx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Two packages queued plus one assembled and waiting to be sent
    assert_eq!(store.get_log().len(), 3 * 2);
    assert!(!producer.is_finished());

    assert!(matches!(rx.recv().await, Some(QueueMessage::Package(_))));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.get_log().len(), 4 * 2);
    assert!(!producer.is_finished());

    let mut packages = 1;
    while let Some(message) = rx.recv().await {
        match message {
            QueueMessage::Package(_) => packages += 1,
            QueueMessage::Done => break,
        }
    }
    assert_eq!(packages, 10);
    let stats = producer.await.unwrap().unwrap();
    assert_eq!(stats.queued, 10);
}

#[tokio::test]
async fn test_run_returns_only_after_uploads_settle() {
    let store = MemoryObjectStore::new().with_put_delay(Duration::from_millis(40));
    seed_items(&store, 5);
    let backend = ready_backend();

    let summary = pipeline(&store, &backend, PipelineConfig::default())
        .run(Arc::new(EditJob::new(KeyLayout::default())), &WorkFilter::new())
        .await
        .unwrap();

    assert_eq!(summary.uploads_started, 5);
    assert_eq!(summary.uploads_completed, 5);
    assert_eq!(store.put_calls(), 5);
    assert_eq!(
        store
            .keys()
            .iter()
            .filter(|key| key.starts_with("edited_images/"))
            .count(),
        5
    );
}

async fn max_overlap_with_permits(permits: usize) -> usize {
    let store = MemoryObjectStore::new();
    seed_items(&store, 6);
    let backend = ready_backend().with_latency(Duration::from_millis(50));

    let config = PipelineConfig::builder()
        .queue_capacity(6)
        .gate_permits(permits)
        .build()
        .unwrap();
    let summary = pipeline(&store, &backend, config)
        .run(Arc::new(EditJob::new(KeyLayout::default())), &WorkFilter::new())
        .await
        .unwrap();

    assert_eq!(summary.generated, 6);
    assert_eq!(summary.uploads_completed, 6);
    backend.max_concurrent_calls()
}

#[tokio::test]
async fn test_single_permit_serializes_generation() {
    assert_eq!(max_overlap_with_permits(1).await, 1);
}

#[tokio::test]
async fn test_gate_permits_bound_overlapping_generations() {
    assert_eq!(max_overlap_with_permits(2).await, 2);
}

#[tokio::test]
async fn test_sorted_order_is_preserved_through_the_queue() {
    let store = MemoryObjectStore::new();
    seed_items(&store, 6);
    let backend = ready_backend();

    pipeline(&store, &backend, PipelineConfig::default())
        .run(Arc::new(EditJob::new(KeyLayout::default())), &WorkFilter::new())
        .await
        .unwrap();

    let expected: Vec<String> = (0..6).map(|i| format!("prompt {i:03}")).collect();
    assert_eq!(backend.get_call_history(), expected);
}

#[tokio::test]
async fn test_seeded_shuffle_is_reproducible_across_runs() {
    let mut histories = Vec::new();
    for _ in 0..2 {
        let store = MemoryObjectStore::new();
        seed_items(&store, 12);
        let backend = ready_backend();
        let config = PipelineConfig::builder()
            .order(WorkOrder::Shuffled { seed: Some(2024) })
            .build()
            .unwrap();

        pipeline(&store, &backend, config)
            .run(Arc::new(EditJob::new(KeyLayout::default())), &WorkFilter::new())
            .await
            .unwrap();
        histories.push(backend.get_call_history());
    }

    assert_eq!(histories[0], histories[1]);
    let mut sorted = histories[0].clone();
    sorted.sort();
    assert_eq!(sorted.len(), 12);
    sorted.dedup();
    assert_eq!(sorted.len(), 12);
}
