//! Size-budget planning.
//!
//! Turns a clip duration and a size budget into the parameters handed to the
//! encoder: a target video bitrate (also used as the rate-control ceiling)
//! and a resolution tier picked from that bitrate. Everything here is pure.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CompressionConfig;
use crate::{Error, Result};

const KILOBITS_PER_MEGABYTE: f64 = 1024.0 * 8.0;

/// Compute the video bitrate that makes `duration_secs` of output fit in
/// `budget_mb`: `floor(budget_mb * 1024 * 8 / duration_secs)`.
///
/// The audio allowance is not subtracted, so real outputs overshoot the
/// budget slightly on long clips.
///
/// # Errors
///
/// - [`Error::InvalidDuration`] when the duration is zero, negative or not finite.
/// - [`Error::Validation`] when the budget is zero, negative or not finite.
pub fn target_bitrate_kbps(duration_secs: f64, budget_mb: f64) -> Result<u32> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(Error::InvalidDuration(duration_secs));
    }
    if !budget_mb.is_finite() || budget_mb <= 0.0 {
        return Err(Error::Validation(format!(
            "size budget must be positive, got {budget_mb} MB"
        )));
    }

    // `as` saturates at u32::MAX.
    Ok((budget_mb * KILOBITS_PER_MEGABYTE / duration_secs).floor() as u32)
}

/// Output resolution tier, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    /// Downscale to 480 lines.
    #[serde(rename = "480p")]
    P480,
    /// Downscale to 720 lines.
    #[serde(rename = "720p")]
    P720,
    /// Keep the source resolution.
    Original,
}

impl ResolutionTier {
    /// Target frame height, or `None` to keep the source size.
    pub fn height(&self) -> Option<u32> {
        match self {
            ResolutionTier::P480 => Some(480),
            ResolutionTier::P720 => Some(720),
            ResolutionTier::Original => None,
        }
    }

    /// ffmpeg `-vf` scale filter. `-2` keeps the aspect ratio with an even width.
    pub fn scale_filter(&self) -> Option<String> {
        self.height().map(|h| format!("scale=-2:{h}"))
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionTier::P480 => f.write_str("480p"),
            ResolutionTier::P720 => f.write_str("720p"),
            ResolutionTier::Original => f.write_str("original"),
        }
    }
}

/// Bitrate boundaries between resolution tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionThresholds {
    pub low_kbps: u32,
    pub high_kbps: u32,
}

impl From<&CompressionConfig> for ResolutionThresholds {
    fn from(cfg: &CompressionConfig) -> Self {
        Self {
            low_kbps: cfg.low_bitrate_threshold_kbps,
            high_kbps: cfg.high_bitrate_threshold_kbps,
        }
    }
}

impl Default for ResolutionThresholds {
    fn default() -> Self {
        (&CompressionConfig::default()).into()
    }
}

/// Pick the output resolution for a computed bitrate.
///
/// Below `low_kbps` full resolution would block up visibly, so fewer pixels
/// get the same bits. Monotonic: a lower bitrate never maps to a higher tier.
pub fn choose_resolution(bitrate_kbps: u32, thresholds: &ResolutionThresholds) -> ResolutionTier {
    if bitrate_kbps < thresholds.low_kbps {
        ResolutionTier::P480
    } else if bitrate_kbps < thresholds.high_kbps {
        ResolutionTier::P720
    } else {
        ResolutionTier::Original
    }
}

/// Parameters passed to the encoder for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    /// Source duration the plan was derived from.
    pub duration_secs: f64,
    /// `-b:v`, also used as `-maxrate`.
    pub video_bitrate_kbps: u32,
    /// `-bufsize`.
    pub buffer_size_kb: u32,
    pub resolution: ResolutionTier,
    /// `-b:a`.
    pub audio_bitrate_kbps: u32,
    /// `-preset`.
    pub preset: String,
}

impl EncodeParams {
    /// Rate-control ceiling; equal to the target bitrate.
    pub fn maxrate_kbps(&self) -> u32 {
        self.video_bitrate_kbps
    }

    /// Rough output size in bytes including the audio stream.
    pub fn estimated_size_bytes(&self) -> u64 {
        let total_kbps = f64::from(self.video_bitrate_kbps) + f64::from(self.audio_bitrate_kbps);
        (total_kbps * 1000.0 / 8.0 * self.duration_secs) as u64
    }
}

/// Derive the full encoder parameter set for a clip.
///
/// # Errors
///
/// Propagates [`target_bitrate_kbps`] errors, and returns
/// [`Error::Validation`] when the clip is so long that the bitrate floors to 0.
pub fn plan_encode(duration_secs: f64, cfg: &CompressionConfig) -> Result<EncodeParams> {
    let bitrate = target_bitrate_kbps(duration_secs, cfg.size_budget_mb)?;
    if bitrate == 0 {
        return Err(Error::Validation(format!(
            "{duration_secs:.1}s clip cannot fit in {} MB",
            cfg.size_budget_mb
        )));
    }

    let resolution = choose_resolution(bitrate, &cfg.into());

    tracing::debug!(
        duration_secs,
        bitrate_kbps = bitrate,
        %resolution,
        "planned encode"
    );

    Ok(EncodeParams {
        duration_secs,
        video_bitrate_kbps: bitrate,
        buffer_size_kb: cfg.buffer_size_kb,
        resolution,
        audio_bitrate_kbps: cfg.audio_bitrate_kbps,
        preset: cfg.encoder_preset.clone(),
    })
}
