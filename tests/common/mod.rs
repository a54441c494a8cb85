//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`JobQueue`] to a scripted
//! [`FakeBackend`] and [`FakeProbe`] so queue behaviour can be tested
//! without ffmpeg installed.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use clipforged::config::Config;
use clipforged::engine::{EncoderBackend, Engine};
use clipforged::output::ArtifactStore;
use clipforged::probe::DurationProbe;
use clipforged::queue::JobQueue;
use clipforged_av::EncodeProgress;
use clipforged_core::events::{Event, EventBus, EventPayload};
use clipforged_core::{EncodeParams, Error, Result};

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Encoder that writes a small marker file instead of running ffmpeg.
pub struct FakeBackend {
    fail_load: bool,
    failing: Mutex<HashSet<String>>,
    step_delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    encoded: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            fail_load: false,
            failing: Mutex::new(HashSet::new()),
            step_delay: Duration::from_millis(5),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            encoded: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose `load` always fails.
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    /// Reject sources with this file name as undecodable.
    pub fn reject(self, file_name: &str) -> Self {
        self.failing.lock().insert(file_name.to_string());
        self
    }

    /// Delay between progress steps (four steps per encode).
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Stop rejecting a file name.
    pub fn accept(&self, file_name: &str) {
        self.failing.lock().remove(file_name);
    }

    /// File names that were encoded successfully, in order.
    pub fn encoded(&self) -> Vec<String> {
        self.encoded.lock().clone()
    }

    /// Highest number of encodes ever observed in flight together.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load(&self) -> Result<()> {
        if self.fail_load {
            return Err(Error::tool("fake", "encoder core failed to load"));
        }
        Ok(())
    }

    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: &EncodeParams,
        on_progress: &(dyn Fn(EncodeProgress) + Send + Sync),
    ) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let result = self.run(input, output, params, on_progress).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeBackend {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &EncodeParams,
        on_progress: &(dyn Fn(EncodeProgress) + Send + Sync),
    ) -> Result<()> {
        let name = file_name(input);

        for percent in [25, 50, 75, 100] {
            tokio::time::sleep(self.step_delay).await;
            if percent == 50 && self.failing.lock().contains(&name) {
                return Err(Error::Encode(format!(
                    "{name}: Invalid data found when processing input"
                )));
            }
            on_progress(EncodeProgress {
                percent,
                fps: Some(120.0),
                speed: Some("4.0x".into()),
            });
        }

        let body = format!("{name}@{}k", params.video_bitrate_kbps);
        tokio::fs::write(output, body).await?;
        self.encoded.lock().push(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeProbe
// ---------------------------------------------------------------------------

/// Probe answering from a table keyed by file name.
pub struct FakeProbe {
    default_secs: f64,
    durations: HashMap<String, f64>,
    hanging: HashSet<String>,
    broken: HashSet<String>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            default_secs: 10.0,
            durations: HashMap::new(),
            hanging: HashSet::new(),
            broken: HashSet::new(),
        }
    }

    pub fn duration(mut self, file_name: &str, secs: f64) -> Self {
        self.durations.insert(file_name.to_string(), secs);
        self
    }

    /// Never answer for this file.
    pub fn hang(mut self, file_name: &str) -> Self {
        self.hanging.insert(file_name.to_string());
        self
    }

    /// Report missing container metadata for this file.
    pub fn broken(mut self, file_name: &str) -> Self {
        self.broken.insert(file_name.to_string());
        self
    }
}

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let name = file_name(path);
        if self.hanging.contains(&name) {
            std::future::pending::<()>().await;
        }
        if self.broken.contains(&name) {
            return Err(Error::Probe("no duration in container metadata".into()));
        }
        Ok(self.durations.get(&name).copied().unwrap_or(self.default_secs))
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub queue: Arc<JobQueue>,
    pub engine: Arc<Engine>,
    pub backend: Arc<FakeBackend>,
    pub events: Arc<EventBus>,
    pub config: Arc<Config>,
    pub input_dir: TempDir,
    pub output_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(FakeBackend::new(), FakeProbe::new())
    }

    pub fn with(backend: FakeBackend, probe: FakeProbe) -> Self {
        Self::with_config(backend, probe, |_| {})
    }

    /// Build a harness, letting the caller adjust the config first.
    pub fn with_config(
        backend: FakeBackend,
        probe: FakeProbe,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let input_dir = tempfile::tempdir().expect("failed to create input dir");
        let output_dir = tempfile::tempdir().expect("failed to create output dir");

        let mut config = Config::default();
        config.output.dir = output_dir.path().to_path_buf();
        config.output.fetch_stagger_ms = 0;
        config.probe.timeout_secs = 1;
        configure(&mut config);
        let config = Arc::new(config);

        let events = Arc::new(EventBus::default());
        let backend = Arc::new(backend);
        let engine = Arc::new(
            Engine::new(backend.clone(), config.engine.clone()).with_events(events.clone()),
        );
        let store = Arc::new(ArtifactStore::new(config.output.clone()));
        let queue = Arc::new(JobQueue::new(
            engine.clone(),
            Arc::new(probe),
            store,
            config.clone(),
            events.clone(),
        ));

        Self {
            queue,
            engine,
            backend,
            events,
            config,
            input_dir,
            output_dir,
        }
    }

    /// Create a placeholder source file and return its path.
    pub fn video(&self, name: &str) -> PathBuf {
        let path = self.input_dir.path().join(name);
        std::fs::write(&path, b"not really a video").expect("failed to write source");
        path
    }

    /// Create sources and submit them in order, returning their indices.
    pub fn submit_all(&self, names: &[&str]) -> Vec<u64> {
        names
            .iter()
            .map(|name| self.queue.submit(self.video(name)).expect("submit failed"))
            .collect()
    }
}

/// Wait until an event matching `pred` arrives.
pub async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    pred: impl Fn(&EventPayload) -> bool,
) -> EventPayload {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event.payload) => return event.payload,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
