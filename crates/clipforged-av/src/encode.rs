//! Target-size H.264/AAC encoding using ffmpeg.

use std::path::Path;
use std::time::Duration;

use clipforged_core::{EncodeParams, Error};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Progress of a running encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// 0..=100. Reaches 100 only when ffmpeg reports `progress=end`.
    pub percent: u8,
    pub fps: Option<f64>,
    pub speed: Option<String>,
}

/// Build the ffmpeg argument list for a target-size encode.
///
/// The computed bitrate is both the target (`-b:v`) and the rate-control
/// ceiling (`-maxrate`).
pub fn build_args(input: &Path, output: &Path, params: &EncodeParams) -> Vec<String> {
    let bitrate = format!("{}k", params.video_bitrate_kbps);
    let maxrate = format!("{}k", params.maxrate_kbps());

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-nostats".into(),
        "-progress".into(),
        "pipe:2".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-b:v".into(),
        bitrate,
        "-maxrate".into(),
        maxrate,
        "-bufsize".into(),
        format!("{}k", params.buffer_size_kb),
    ];

    if let Some(filter) = params.resolution.scale_filter() {
        args.extend(["-vf".into(), filter]);
    }

    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        params.preset.clone(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", params.audio_bitrate_kbps),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ]);

    args
}

/// Incremental parser for `ffmpeg -progress` key=value blocks.
///
/// Emits a value at the end of each block, and only when the integer
/// percentage has advanced, so consumers always see a non-decreasing series.
#[derive(Debug)]
pub struct ProgressParser {
    duration_secs: f64,
    out_time_us: Option<i64>,
    fps: Option<f64>,
    speed: Option<String>,
    last_percent: Option<u8>,
}

impl ProgressParser {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            out_time_us: None,
            fps: None,
            speed: None,
            last_percent: None,
        }
    }

    /// Feed one stderr line; returns progress when a block completes with a
    /// higher percentage than previously reported.
    pub fn feed(&mut self, line: &str) -> Option<EncodeProgress> {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();

        match key.trim() {
            // ffmpeg reports `out_time_ms` in microseconds as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = Some(us);
                }
                None
            }
            "fps" => {
                self.fps = value.parse::<f64>().ok();
                None
            }
            "speed" => {
                self.speed = (value != "N/A").then(|| value.to_string());
                None
            }
            "progress" => {
                let percent = if value == "end" {
                    100
                } else {
                    self.running_percent()?
                };

                if self.last_percent.is_some_and(|last| percent <= last) {
                    return None;
                }
                self.last_percent = Some(percent);

                Some(EncodeProgress {
                    percent,
                    fps: self.fps,
                    speed: self.speed.clone(),
                })
            }
            _ => None,
        }
    }

    /// Percentage while encoding, capped at 99 until ffmpeg says it is done.
    fn running_percent(&self) -> Option<u8> {
        let out_us = self.out_time_us?;
        if self.duration_secs <= 0.0 {
            return None;
        }
        let elapsed = out_us.max(0) as f64 / 1_000_000.0;
        let pct = (elapsed / self.duration_secs * 100.0).floor().clamp(0.0, 99.0);
        Some(pct as u8)
    }
}

/// Whether a stderr line is part of the `-progress` stream rather than a
/// diagnostic.
pub fn is_progress_line(line: &str) -> bool {
    line.split_once('=').is_some_and(|(key, _)| {
        !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Encode `input` into `output` with the given parameters, streaming
/// progress to `on_progress`.
///
/// # Errors
///
/// Returns [`Error::Encode`] carrying ffmpeg's last diagnostic lines when the
/// encode fails or times out.
pub async fn encode_to_target(
    ffmpeg: &Path,
    input: &Path,
    output: &Path,
    params: &EncodeParams,
    timeout: Duration,
    mut on_progress: impl FnMut(EncodeProgress),
) -> clipforged_core::Result<()> {
    let args = build_args(input, output, params);

    tracing::info!(
        "Target-size encode: {:?} -> {:?} (bitrate={}k, resolution={}, preset={})",
        input,
        output,
        params.video_bitrate_kbps,
        params.resolution,
        params.preset,
    );
    tracing::debug!("FFmpeg args: {:?}", args);

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(timeout);
    cmd.args(args);

    let mut parser = ProgressParser::new(params.duration_secs);
    let mut diagnostics: Vec<String> = Vec::new();

    let result = cmd
        .execute_with_stderr_callback(|line| {
            if let Some(progress) = parser.feed(line) {
                on_progress(progress);
            } else if !is_progress_line(line) && !line.trim().is_empty() {
                if diagnostics.len() == 10 {
                    diagnostics.remove(0);
                }
                diagnostics.push(line.to_string());
            }
        })
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(Error::Tool { message, .. }) => {
            let detail = if diagnostics.is_empty() {
                message
            } else {
                diagnostics.join("\n")
            };
            Err(Error::Encode(detail))
        }
        Err(e) => Err(e),
    }
}
