//! Batch runner workflows through the public engine API

mod common;

use common::{engine_with, local_engine, write_test_image, FailingLocal, FakeCloud};
use image::ImageFormat;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;
use watermark_remover::{
    BatchEvent, BatchItem, BatchItemUpdate, BatchStatus, CloudError,
    MemoryCredentialStore, PatchInpainter, Region, RemovalError, RemovalMethod, RemovalOptions,
};

fn five_items(dir: &std::path::Path) -> Vec<BatchItem> {
    (1..=5)
        .map(|i| {
            if i == 3 {
                BatchItem::new(dir.join("missing.png"))
            } else {
                BatchItem::new(write_test_image(dir, &format!("img{}.png", i), 40, 30, ImageFormat::Png))
            }
        })
        .collect()
}

fn progress_names(events: &[BatchEvent]) -> Vec<(usize, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress(p) => Some((p.current_index, p.current_name.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_one_failure_does_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let mut items = five_items(dir.path());
    let mut events = Vec::new();

    let summary = engine
        .run_batch(&mut items, Region::new(5, 5, 10, 6), &RemovalOptions::default(), |e| {
            events.push(e);
        })
        .await
        .unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);

    for (index, item) in items.iter().enumerate() {
        if index == 2 {
            assert_eq!(item.status, BatchStatus::Failed);
            assert!(item.error.as_ref().unwrap().contains("missing.png"));
            assert!(item.processed_path.is_none());
        } else {
            assert_eq!(item.status, BatchStatus::Completed);
            let processed = item.processed_path.as_ref().unwrap();
            assert!(processed.exists());
            assert!(engine.scratch().is_registered(processed));
        }
    }

    let progress = progress_names(&events);
    assert_eq!(
        progress.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(progress[2].1, "missing.png");
    assert!(progress.iter().all(|(_, name)| !name.is_empty()));

    let updated_ids: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::ItemUpdated { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(updated_ids.len(), 10);
    for (chunk, item) in updated_ids.chunks(2).zip(&items) {
        assert!(chunk.iter().all(|id| *id == item.id));
    }

    assert!(matches!(events.last(), Some(BatchEvent::Finished(s)) if s.completed == 4));
}

#[tokio::test]
async fn test_resume_skips_terminal_items() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let mut items: Vec<BatchItem> = (1..=5)
        .map(|i| BatchItem::new(write_test_image(dir.path(), &format!("img{}.png", i), 24, 24, ImageFormat::Png)))
        .collect();

    for item in items.iter_mut().take(2) {
        item.apply(&BatchItemUpdate::processing());
        item.apply(&BatchItemUpdate::completed(dir.path().join("earlier.png")));
    }

    let mut events = Vec::new();
    let summary = engine
        .run_batch(&mut items, Region::new(2, 2, 6, 6), &RemovalOptions::default(), |e| {
            events.push(e);
        })
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.completed, 3);
    assert_eq!(
        progress_names(&events).iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![2, 3, 4]
    );
    assert_eq!(items[0].processed_path.as_deref(), Some(dir.path().join("earlier.png").as_path()));
    assert!(items.iter().all(|i| i.status == BatchStatus::Completed));
}

#[tokio::test]
async fn test_resume_restarts_item_left_processing() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let mut items: Vec<BatchItem> = (1..=3)
        .map(|i| BatchItem::new(write_test_image(dir.path(), &format!("img{}.png", i), 24, 24, ImageFormat::Png)))
        .collect();

    items[0].apply(&BatchItemUpdate::processing());
    items[0].apply(&BatchItemUpdate::completed(dir.path().join("earlier.png")));
    // Interrupted mid-item
    items[1].apply(&BatchItemUpdate::processing());

    let mut events = Vec::new();
    let summary = engine
        .run_batch(&mut items, Region::new(2, 2, 6, 6), &RemovalOptions::default(), |e| {
            events.push(e);
        })
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 2);
    assert_eq!(
        progress_names(&events).iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(items[1].status, BatchStatus::Completed);
    assert!(engine.scratch().is_registered(items[1].processed_path.as_ref().unwrap()));
}

#[tokio::test]
async fn test_failed_items_are_not_retried() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let mut items = five_items(dir.path());

    engine
        .run_batch(&mut items, Region::new(1, 1, 4, 4), &RemovalOptions::default(), |_| {})
        .await
        .unwrap();

    let mut events = Vec::new();
    let summary = engine
        .run_batch(&mut items, Region::new(1, 1, 4, 4), &RemovalOptions::default(), |e| {
            events.push(e);
        })
        .await
        .unwrap();

    assert_eq!(summary.skipped, 5);
    assert_eq!(events.len(), 1);
    assert_eq!(items[2].status, BatchStatus::Failed);
}

#[tokio::test]
async fn test_local_inpainter_failure_is_recorded_per_item() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        dir.path(),
        Arc::new(FailingLocal),
        Arc::new(FakeCloud::default()),
        Arc::new(MemoryCredentialStore::new()),
        common::MemoryCodec::new(1),
    );
    let mut items = vec![
        BatchItem::new(write_test_image(dir.path(), "a.png", 20, 20, ImageFormat::Png)),
        BatchItem::new(write_test_image(dir.path(), "b.png", 20, 20, ImageFormat::Png)),
    ];

    let summary = engine
        .run_batch(&mut items, Region::new(0, 0, 5, 5), &RemovalOptions::default(), |_| {})
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert!(items
        .iter()
        .all(|i| i.error.as_deref().is_some_and(|e| e.contains("synthetic failure"))));
    assert!(engine.scratch().registered().is_empty());
}

#[tokio::test]
async fn test_cloud_batch_is_sequential_and_isolates_rate_limit() {
    let dir = TempDir::new().unwrap();
    let cloud = Arc::new(FakeCloud::failing_at(1, CloudError::rate_limited("quota exceeded")));
    let engine = engine_with(
        dir.path(),
        Arc::new(PatchInpainter::new()),
        cloud.clone(),
        Arc::new(MemoryCredentialStore::with_key("secret")),
        common::MemoryCodec::new(1),
    );
    let mut items: Vec<BatchItem> = (0..4)
        .map(|i| BatchItem::new(write_test_image(dir.path(), &format!("c{}.jpg", i), 32, 32, ImageFormat::Jpeg)))
        .collect();
    let options = RemovalOptions::builder()
        .method(RemovalMethod::Cloud)
        .build()
        .unwrap();

    let summary = engine
        .run_batch(&mut items, Region::new(4, 4, 8, 8), &options, |_| {})
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(cloud.calls.load(Ordering::SeqCst), 4);
    assert_eq!(cloud.max_in_flight.load(Ordering::SeqCst), 1);

    let message = items[1].error.as_deref().unwrap();
    assert!(message.contains("rate limited"));
    assert!(message.contains("quota exceeded"));
}

#[tokio::test]
async fn test_cloud_batch_without_key_fails_before_any_item() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let mut items = vec![BatchItem::new(write_test_image(dir.path(), "a.png", 10, 10, ImageFormat::Png))];
    let options = RemovalOptions::builder()
        .method(RemovalMethod::Cloud)
        .build()
        .unwrap();
    let mut events = Vec::new();

    let err = engine
        .run_batch(&mut items, Region::new(0, 0, 4, 4), &options, |e| events.push(e))
        .await
        .unwrap_err();

    assert!(matches!(err, RemovalError::MissingCredential));
    assert!(events.is_empty());
    assert_eq!(items[0].status, BatchStatus::Pending);
}
