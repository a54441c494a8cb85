//! Duration probing for queued sources.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clipforged_av::{FfprobeProber, ToolRegistry};
use clipforged_core::{Error, Result};

/// Grace period given to the ffprobe process beyond the caller's deadline,
/// so the outer timeout is what fires.
const PROCESS_GRACE: Duration = Duration::from_secs(5);

/// Reads a source's playback duration in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64>;
}

/// [`DurationProbe`] backed by ffprobe container metadata.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    prober: FfprobeProber,
    process_timeout: Duration,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            prober: FfprobeProber::new(ffprobe_path),
            process_timeout: timeout + PROCESS_GRACE,
        }
    }

    /// Build a probe from a discovered tool registry.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] if ffprobe was not found.
    pub fn from_registry(tools: &ToolRegistry, timeout: Duration) -> Result<Self> {
        let path = tools.require("ffprobe")?;
        Ok(Self::new(path.to_path_buf(), timeout))
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        self.prober.duration(path, self.process_timeout).await
    }
}

/// Probe `path`, failing with [`Error::ProbeTimeout`] if `probe` does not
/// answer within `timeout`.
pub async fn probe_with_timeout(
    probe: &dyn DurationProbe,
    path: &Path,
    timeout: Duration,
) -> Result<f64> {
    match tokio::time::timeout(timeout, probe.probe_duration(path)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Probe of {} timed out after {:?}", path.display(), timeout);
            Err(Error::ProbeTimeout {
                path: path.to_path_buf(),
                timeout,
            })
        }
    }
}
