//! ffprobe-based duration probing.
//!
//! Only container metadata is read (`-show_format`); streams are never
//! decoded, so probing is cheap even for large files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clipforged_core::{Error, Result};
use serde::Deserialize;

use crate::command::ToolCommand;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[allow(dead_code)]
    format_name: Option<String>,
    duration: Option<String>,
}

/// Reads a file's playback duration with the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Duration of the media file in seconds.
    ///
    /// `timeout` bounds the ffprobe process itself; callers that need a hard
    /// deadline for the whole call should still wrap it.
    ///
    /// # Errors
    ///
    /// [`Error::Probe`] if ffprobe fails or reports no usable duration.
    pub async fn duration(&self, path: &Path, timeout: Duration) -> Result<f64> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(timeout);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format"]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await.map_err(|e| match e {
            Error::Tool { message, .. } => {
                Error::Probe(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;

        parse_duration(&output.stdout)
    }
}

/// Extract the duration in seconds from `ffprobe -show_format` JSON.
pub fn parse_duration(json: &str) -> Result<f64> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("invalid ffprobe output: {e}")))?;

    let raw = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| Error::Probe("no duration in container metadata".into()))?;

    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::Probe(format!("unparseable duration '{raw}'")))
}
