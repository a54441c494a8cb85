//! The shared encoding engine.
//!
//! One [`Engine`] exists per process. It is created once, loaded once and
//! handed to the job queue behind an `Arc`. Encodes are strictly serialized:
//! the engine holds an internal lock for the full duration of every encode,
//! independent of how the caller schedules work.

mod ffmpeg;

pub use ffmpeg::FfmpegBackend;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use clipforged_av::{EncodeProgress, Workspace};
use clipforged_core::config::EngineConfig;
use clipforged_core::events::{EventBus, EventPayload};
use clipforged_core::{EncodeParams, Error, Result};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

/// Capacity of the engine-wide progress feed.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of the engine. `Ready` and `Failed` are both terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

/// The component that actually turns a source file into an encoded MP4.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Short name used in logs and events.
    fn name(&self) -> &str;

    /// Prepare the backend for use. Called at most once per engine.
    async fn load(&self) -> Result<()>;

    /// Encode `input` into `output` with the given parameters.
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        params: &EncodeParams,
        on_progress: &(dyn Fn(EncodeProgress) + Send + Sync),
    ) -> Result<()>;
}

/// Single shared encoding engine.
pub struct Engine {
    backend: Arc<dyn EncoderBackend>,
    config: EngineConfig,
    state: watch::Sender<EngineState>,
    init_lock: Mutex<()>,
    encode_lock: Mutex<()>,
    progress: broadcast::Sender<EncodeProgress>,
    events: Option<Arc<EventBus>>,
}

impl Engine {
    pub fn new(backend: Arc<dyn EncoderBackend>, config: EngineConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            state,
            init_lock: Mutex::new(()),
            encode_lock: Mutex::new(()),
            progress,
            events: None,
        }
    }

    /// Publish lifecycle events on the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), EngineState::Ready)
    }

    /// Load the backend.
    ///
    /// Idempotent: once loaded, later calls return immediately. Concurrent
    /// callers share a single load. A failed load is permanent and every
    /// later call reports the same failure.
    ///
    /// # Errors
    ///
    /// [`Error::EngineInit`] if the backend fails to load.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        match self.state() {
            EngineState::Ready => return Ok(()),
            EngineState::Failed(reason) => return Err(Error::EngineInit(reason)),
            EngineState::Uninitialized | EngineState::Loading => {}
        }

        tracing::info!("Loading encoding engine ({})", self.backend.name());
        self.state.send_replace(EngineState::Loading);
        self.emit(EventPayload::EngineLoading);

        match self.backend.load().await {
            Ok(()) => {
                tracing::info!("Encoding engine ready ({})", self.backend.name());
                self.state.send_replace(EngineState::Ready);
                self.emit(EventPayload::EngineReady {
                    backend: self.backend.name().to_string(),
                });
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!("Encoding engine failed to load: {}", reason);
                self.state.send_replace(EngineState::Failed(reason.clone()));
                self.emit(EventPayload::EngineFailed {
                    error: reason.clone(),
                });
                Err(Error::EngineInit(reason))
            }
        }
    }

    /// Resolve once the engine has finished loading.
    ///
    /// # Errors
    ///
    /// [`Error::EngineInit`] if loading failed.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, EngineState::Ready | EngineState::Failed(_)))
            .await
            .map_err(|_| Error::EngineInit("engine state channel closed".into()))?
            .clone();

        match state {
            EngineState::Failed(reason) => Err(Error::EngineInit(reason)),
            _ => Ok(()),
        }
    }

    /// Engine-wide progress feed. Values carry no job identity.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<EncodeProgress> {
        self.progress.subscribe()
    }

    /// Encode one job and return the encoded bytes.
    ///
    /// Percent updates for this encode are delivered on `progress_tx`, which
    /// belongs to the caller alone. Scratch files live in a workspace named
    /// after `job_index` and are removed when this returns.
    ///
    /// # Errors
    ///
    /// [`Error::EngineInit`] if the engine is not ready, otherwise whatever
    /// the backend or workspace reports.
    pub async fn encode(
        &self,
        job_index: u64,
        input: &Path,
        params: &EncodeParams,
        progress_tx: mpsc::UnboundedSender<u8>,
    ) -> Result<Bytes> {
        if !self.is_ready() {
            return Err(Error::EngineInit(format!(
                "engine is not ready (state: {:?})",
                self.state()
            )));
        }

        let _guard = self.encode_lock.lock().await;

        let workspace = Workspace::new(self.config.work_dir.as_deref(), job_index)?;
        let output = workspace.output();
        tracing::debug!(
            "Job {} scratch output: {}",
            job_index,
            output.display()
        );

        let feed = self.progress.clone();
        let on_progress = move |p: EncodeProgress| {
            // The caller may have stopped listening; that is not an error.
            let _ = progress_tx.send(p.percent);
            let _ = feed.send(p);
        };

        self.backend
            .encode(input, &output, params, &on_progress)
            .await?;

        workspace.read_output().await
    }

    fn emit(&self, payload: EventPayload) {
        if let Some(events) = &self.events {
            events.broadcast(payload);
        }
    }
}
