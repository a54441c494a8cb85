//! FIFO job queue in front of the shared engine.
//!
//! Jobs run one at a time in submission order. Job state lives in a plain
//! `Vec` behind a lock that is never held across an await; observers follow
//! along through the [`EventBus`].

mod types;

pub use types::*;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use clipforged_core::config::Config;
use clipforged_core::events::{Event, EventBus, EventPayload};
use clipforged_core::{plan_encode, Error, Result};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::output::{Artifact, ArtifactStore};
use crate::probe::{probe_with_timeout, DurationProbe};

/// Clears the worker flag however the worker exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobQueue {
    engine: Arc<Engine>,
    probe: Arc<dyn DurationProbe>,
    store: Arc<ArtifactStore>,
    config: Arc<Config>,
    events: Arc<EventBus>,
    jobs: RwLock<Vec<Job>>,
    next_index: AtomicU64,
    running: AtomicBool,
}

impl JobQueue {
    pub fn new(
        engine: Arc<Engine>,
        probe: Arc<dyn DurationProbe>,
        store: Arc<ArtifactStore>,
        config: Arc<Config>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            engine,
            probe,
            store,
            config,
            events,
            jobs: RwLock::new(Vec::new()),
            next_index: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Append a Pending job for `path` and return its order index.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the extension is not an accepted video type,
    /// [`Error::NotFound`] if the file does not exist.
    pub fn submit(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();

        if !self.config.input.accepts(path) {
            return Err(Error::Validation(format!(
                "{} is not a supported video file",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(Error::not_found("file", path.display()));
        }

        let job = {
            let mut jobs = self.jobs.write();
            let index = self.next_index.fetch_add(1, Ordering::SeqCst);
            let job = Job::new(index, path.to_path_buf());
            jobs.push(job.clone());
            job
        };

        tracing::info!("Queued job {}: {}", job.index, job.file_name);
        self.events.broadcast(EventPayload::JobQueued {
            index: job.index,
            file_name: job.file_name,
        });

        Ok(job.index)
    }

    /// Process Pending jobs until none remain.
    ///
    /// Only one worker runs at a time; a call made while another is active
    /// returns `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// [`Error::EngineInit`] if the engine cannot be loaded. Jobs stay
    /// Pending in that case. Per-job failures are recorded on the job and do
    /// not surface here.
    pub async fn run_queue(&self) -> Result<()> {
        loop {
            if self.running.swap(true, Ordering::AcqRel) {
                tracing::debug!("Queue worker already running");
                return Ok(());
            }

            {
                let _guard = RunningGuard(&self.running);
                self.drain().await?;
            }

            // A submit can land after the last claim but before the flag
            // clears; pick it up rather than strand it.
            if !self.has_pending() {
                return Ok(());
            }
        }
    }

    /// Spawn [`JobQueue::run_queue`] on the runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.run_queue().await })
    }

    /// Remove a Pending job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown index, [`Error::InvalidState`] if
    /// the job has already started.
    pub fn remove(&self, index: u64) -> Result<Job> {
        let job = {
            let mut jobs = self.jobs.write();
            let pos = jobs
                .iter()
                .position(|j| j.index == index)
                .ok_or_else(|| Error::not_found("job", index))?;

            if jobs[pos].status != JobStatus::Pending {
                return Err(Error::InvalidState(format!(
                    "job {index} is {} and cannot be removed",
                    jobs[pos].status
                )));
            }
            jobs.remove(pos)
        };

        tracing::info!("Removed job {}: {}", job.index, job.file_name);
        self.events.broadcast(EventPayload::JobRemoved { index });
        Ok(job)
    }

    /// Drop every job. Refused while a job is Processing.
    pub fn clear(&self) -> Result<usize> {
        let removed = {
            let mut jobs = self.jobs.write();
            if let Some(active) = jobs.iter().find(|j| j.status == JobStatus::Processing) {
                return Err(Error::InvalidState(format!(
                    "job {} is processing; cannot clear the queue",
                    active.index
                )));
            }
            let removed = jobs.len();
            jobs.clear();
            removed
        };

        tracing::info!("Cleared {} job(s)", removed);
        self.events.broadcast(EventPayload::QueueCleared { removed });
        Ok(removed)
    }

    /// Resubmit a failed job's source as a new job.
    pub fn retry(&self, index: u64) -> Result<u64> {
        let job = self.get(index).ok_or_else(|| Error::not_found("job", index))?;
        if job.status != JobStatus::Error {
            return Err(Error::InvalidState(format!(
                "job {index} is {}; only failed jobs can be retried",
                job.status
            )));
        }
        self.submit(&job.source)
    }

    /// Snapshot of all jobs in submission order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn get(&self, index: u64) -> Option<Job> {
        self.jobs.read().iter().find(|j| j.index == index).cloned()
    }

    pub fn counts(&self) -> JobCounts {
        self.jobs.read().iter().collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn has_pending(&self) -> bool {
        self.jobs
            .read()
            .iter()
            .any(|j| j.status == JobStatus::Pending)
    }

    async fn drain(&self) -> Result<()> {
        self.engine.initialize().await?;

        let mut completed = 0;
        let mut failed = 0;

        while let Some((index, source)) = self.claim_next() {
            match self.process(index, &source).await {
                Ok(artifact) => {
                    tracing::info!("Job {} completed: {}", index, artifact.path.display());
                    let payload = EventPayload::JobCompleted {
                        index,
                        artifact_id: artifact.id,
                        size_bytes: artifact.size_bytes,
                    };
                    self.update(index, |job| job.complete(artifact));
                    self.events.broadcast(payload);
                    completed += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Job {} failed: {}", index, message);
                    self.update(index, |job| job.fail(&message));
                    self.events.broadcast(EventPayload::JobFailed {
                        index,
                        error: message,
                    });
                    failed += 1;
                }
            }
        }

        tracing::info!(
            "Queue drained ({} completed, {} failed)",
            completed,
            failed
        );
        self.events
            .broadcast(EventPayload::QueueDrained { completed, failed });
        Ok(())
    }

    /// Mark the first Pending job Processing and return its identity.
    fn claim_next(&self) -> Option<(u64, PathBuf)> {
        let claimed = {
            let mut jobs = self.jobs.write();
            let job = jobs.iter_mut().find(|j| j.status == JobStatus::Pending)?;
            job.start();
            (job.index, job.source.clone())
        };

        tracing::info!("Processing job {}: {}", claimed.0, claimed.1.display());
        self.events
            .broadcast(EventPayload::JobStarted { index: claimed.0 });
        Some(claimed)
    }

    async fn process(&self, index: u64, source: &Path) -> Result<Artifact> {
        let duration =
            probe_with_timeout(self.probe.as_ref(), source, self.config.probe.timeout()).await?;
        let params = plan_encode(duration, &self.config.compression)?;

        self.update(index, |job| job.params = Some(params.clone()));
        self.events.broadcast(EventPayload::JobPlanned {
            index,
            duration_secs: duration,
            bitrate_kbps: params.video_bitrate_kbps,
            resolution: params.resolution,
        });

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let encode = self.engine.encode(index, source, &params, progress_tx);
        let follow = async {
            while let Some(percent) = progress_rx.recv().await {
                if self.update(index, |job| job.update_progress(percent)) == Some(true) {
                    tracing::trace!("Job {} at {}%", index, percent);
                    self.events.broadcast(EventPayload::JobProgress {
                        index,
                        progress: percent.min(99),
                    });
                }
            }
        };
        let (encoded, ()) = tokio::join!(encode, follow);

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.store.materialize(&file_name, encoded?).await
    }

    /// Apply `f` to the job with `index`, if it still exists.
    fn update<R>(&self, index: u64, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut jobs = self.jobs.write();
        jobs.iter_mut().find(|j| j.index == index).map(f)
    }
}
