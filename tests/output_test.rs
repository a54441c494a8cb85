//! Artifact fetching tests.

mod common;

use std::time::{Duration, Instant};

use clipforged::output::ArtifactStore;
use common::{FakeBackend, FakeProbe, TestHarness};

#[tokio::test]
async fn fetch_all_copies_completed_outputs_in_order() {
    let h = TestHarness::with(FakeBackend::new().reject("bad.mp4"), FakeProbe::new());
    h.submit_all(&["one.mp4", "bad.mp4", "two.mov"]);
    h.queue.run_queue().await.unwrap();

    let dest = tempfile::tempdir().unwrap();
    let fetched = h
        .queue
        .store()
        .fetch_all(&h.queue.jobs(), dest.path())
        .await
        .unwrap();

    let names: Vec<_> = fetched
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["discord_one.mp4", "discord_two.mp4"]);
    assert_eq!(
        std::fs::read_to_string(&fetched[1]).unwrap(),
        "two.mov@6225k"
    );
}

#[tokio::test]
async fn fetch_all_staggers_triggers() {
    let stagger = Duration::from_millis(100);
    let h = TestHarness::with_config(FakeBackend::new(), FakeProbe::new(), |c| {
        c.output.fetch_stagger_ms = stagger.as_millis() as u64;
    });
    h.submit_all(&["a.mp4", "b.mp4", "c.mp4"]);
    h.queue.run_queue().await.unwrap();

    let store = ArtifactStore::new(h.config.output.clone());
    let dest = tempfile::tempdir().unwrap();

    let started = Instant::now();
    let fetched = store.fetch_all(&h.queue.jobs(), dest.path()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(fetched.len(), 3);
    // Two gaps between three triggers; the first is immediate.
    assert!(elapsed >= stagger * 2, "elapsed {elapsed:?}");
    assert!(elapsed < stagger * 3 + Duration::from_secs(1), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn fetch_into_output_dir_leaves_files_intact() {
    let h = TestHarness::new();
    h.submit_all(&["a.mp4"]);
    h.queue.run_queue().await.unwrap();

    let fetched = h
        .queue
        .store()
        .fetch_all(&h.queue.jobs(), h.output_dir.path())
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&fetched[0]).unwrap(), "a.mp4@6225k");
}

#[tokio::test]
async fn fetch_all_with_nothing_completed_is_empty() {
    let h = TestHarness::new();
    h.submit_all(&["pending.mp4"]);

    let dest = tempfile::tempdir().unwrap();
    let fetched = h
        .queue
        .store()
        .fetch_all(&h.queue.jobs(), dest.path())
        .await
        .unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn fetch_all_keeps_existing_files_in_destination() {
    let h = TestHarness::new();
    h.submit_all(&["clip.mp4"]);
    h.queue.run_queue().await.unwrap();

    let dest = tempfile::tempdir().unwrap();
    let earlier = dest.path().join("discord_clip.mp4");
    std::fs::write(&earlier, "earlier output").unwrap();

    let fetched = h
        .queue
        .store()
        .fetch_all(&h.queue.jobs(), dest.path())
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&earlier).unwrap(), "earlier output");
    assert_eq!(fetched, vec![dest.path().join("discord_clip-1.mp4")]);
    assert_eq!(std::fs::read_to_string(&fetched[0]).unwrap(), "clip.mp4@6225k");
}
