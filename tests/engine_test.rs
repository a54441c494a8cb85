//! Engine integration tests: exclusivity and scratch isolation.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clipforged::config::EngineConfig;
use clipforged::engine::Engine;
use clipforged_core::config::CompressionConfig;
use clipforged_core::plan_encode;
use common::FakeBackend;
use tokio::sync::mpsc;

#[tokio::test]
async fn direct_encodes_never_overlap() {
    let backend = Arc::new(FakeBackend::new().with_step_delay(Duration::from_millis(10)));
    let engine = Arc::new(Engine::new(backend.clone(), EngineConfig::default()));
    engine.initialize().await.unwrap();

    let params = plan_encode(30.0, &CompressionConfig::default()).unwrap();

    let encodes = (0..3).map(|i| {
        let engine = Arc::clone(&engine);
        let params = params.clone();
        tokio::spawn(async move {
            let (tx, _rx) = mpsc::unbounded_channel();
            let input = format!("clip{i}.mp4");
            engine.encode(i, Path::new(&input), &params, tx).await
        })
    });

    for handle in encodes.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(backend.encoded().len(), 3);
    assert_eq!(backend.max_concurrent(), 1);
}

#[tokio::test]
async fn scratch_files_live_under_work_dir_and_are_cleaned_up() {
    let work_dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let engine = Engine::new(
        backend,
        EngineConfig {
            work_dir: Some(work_dir.path().to_path_buf()),
            ..EngineConfig::default()
        },
    );
    engine.initialize().await.unwrap();

    let params = plan_encode(10.0, &CompressionConfig::default()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let bytes = engine
        .encode(4, Path::new("clip.mov"), &params, tx)
        .await
        .unwrap();

    assert_eq!(&bytes[..], b"clip.mov@6225k");
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn failed_encode_reports_error_and_cleans_up() {
    let work_dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        Arc::new(FakeBackend::new().reject("bad.mp4")),
        EngineConfig {
            work_dir: Some(work_dir.path().to_path_buf()),
            ..EngineConfig::default()
        },
    );
    engine.initialize().await.unwrap();

    let params = plan_encode(10.0, &CompressionConfig::default()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = engine.encode(0, Path::new("bad.mp4"), &params, tx).await;

    assert!(matches!(result, Err(clipforged_core::Error::Encode(_))));
    assert_eq!(rx.recv().await, Some(25));
    assert_eq!(rx.recv().await, None);
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}
