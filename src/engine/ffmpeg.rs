//! ffmpeg subprocess backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clipforged_av::{encode_to_target, EncodeProgress, ToolCommand, ToolRegistry};
use clipforged_core::{EncodeParams, Error, Result};

use super::EncoderBackend;

/// Encoders every target-size encode depends on.
const REQUIRED_ENCODERS: &[&str] = &["libx264", "aac"];

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs each encode as an ffmpeg child process.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: Option<PathBuf>,
    encode_timeout: Duration,
}

impl FfmpegBackend {
    pub fn new(tools: &ToolRegistry, encode_timeout: Duration) -> Self {
        Self {
            ffmpeg: tools.require("ffmpeg").ok().map(Path::to_path_buf),
            encode_timeout,
        }
    }

    fn ffmpeg(&self) -> Result<&Path> {
        self.ffmpeg
            .as_deref()
            .ok_or_else(|| Error::tool("ffmpeg", "ffmpeg not found; is it installed and in PATH?"))
    }
}

#[async_trait]
impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    /// Verify ffmpeg runs and ships the encoders we need.
    async fn load(&self) -> Result<()> {
        let ffmpeg = self.ffmpeg()?;

        let mut version = ToolCommand::new(ffmpeg.to_path_buf());
        version.timeout(LOAD_TIMEOUT);
        version.arg("-version");
        let output = version.execute().await?;
        if let Some(line) = output.stdout.lines().next() {
            tracing::info!("Using {}", line);
        }

        let mut encoders = ToolCommand::new(ffmpeg.to_path_buf());
        encoders.timeout(LOAD_TIMEOUT);
        encoders.args(["-hide_banner", "-encoders"]);
        let output = encoders.execute().await?;

        let missing = missing_encoders(&output.stdout);
        if !missing.is_empty() {
            return Err(Error::tool(
                "ffmpeg",
                format!("ffmpeg was built without: {}", missing.join(", ")),
            ));
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
        let ffmpeg = self.ffmpeg()?;
        encode_to_target(ffmpeg, input, output, params, self.encode_timeout, |p| {
            on_progress(p)
        })
        .await
    }
}

/// Encoders from [`REQUIRED_ENCODERS`] absent from `ffmpeg -encoders` output.
fn missing_encoders(listing: &str) -> Vec<&'static str> {
    REQUIRED_ENCODERS
        .iter()
        .copied()
        .filter(|name| {
            !listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(*name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn finds_required_encoders() {
        assert!(missing_encoders(LISTING).is_empty());
    }

    #[test]
    fn reports_missing_encoders() {
        let listing = " V....D mpeg4                MPEG-4 part 2\n";
        assert_eq!(missing_encoders(listing), vec!["libx264", "aac"]);
    }

    #[tokio::test]
    async fn load_without_ffmpeg_fails() {
        let backend = FfmpegBackend::new(&ToolRegistry::default(), Duration::from_secs(1));
        assert_matches!(backend.load().await, Err(Error::Tool { .. }));
    }
}
