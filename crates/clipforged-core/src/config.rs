//! Application configuration types.
//!
//! The top-level [`Config`] struct carries every tunable of the compression
//! engine. Every section defaults sensibly so a completely empty file is
//! valid; the root crate handles reading TOML from disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard platform ceiling the default budget is chosen under.
pub const PLATFORM_LIMIT_MB: f64 = 8.0;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compression: CompressionConfig,
    pub probe: ProbeConfig,
    pub engine: EngineConfig,
    pub output: OutputConfig,
    pub input: InputConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.compression.size_budget_mb > PLATFORM_LIMIT_MB {
            warnings.push(format!(
                "compression.size_budget_mb {} exceeds the {} MB platform limit; \
                 outputs will likely be rejected",
                self.compression.size_budget_mb, PLATFORM_LIMIT_MB
            ));
        }

        if self.probe.timeout_secs == 0 {
            warnings.push("probe.timeout_secs is 0; every probe will time out".into());
        }

        if self.input.extensions.is_empty() {
            warnings.push("input.extensions is empty; no file will be accepted".into());
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Size budget and encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Target output size in megabytes, kept below the platform cap.
    pub size_budget_mb: f64,
    /// Bitrates below this are encoded at 480p.
    pub low_bitrate_threshold_kbps: u32,
    /// Bitrates below this (and at or above the low threshold) are encoded at 720p.
    pub high_bitrate_threshold_kbps: u32,
    /// Rate-control buffer size passed as `-bufsize`.
    pub buffer_size_kb: u32,
    /// Fixed audio bitrate. Not subtracted from the size budget.
    pub audio_bitrate_kbps: u32,
    /// x264 speed/quality preset.
    pub encoder_preset: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            size_budget_mb: 7.6,
            low_bitrate_threshold_kbps: 800,
            high_bitrate_threshold_kbps: 1500,
            buffer_size_kb: 2000,
            audio_bitrate_kbps: 128,
            encoder_preset: "superfast".into(),
        }
    }
}

/// Duration probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Encoding engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory for per-job scratch workspaces. System temp dir when unset.
    pub work_dir: Option<PathBuf>,
    /// Upper bound for a single encode before ffmpeg is killed.
    pub encode_timeout_secs: u64,
}

impl EngineConfig {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            encode_timeout_secs: 3600,
        }
    }
}

/// Where and how artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
    /// Delay between successive artifact retrievals in `fetch_all`.
    pub fetch_stagger_ms: u64,
}

impl OutputConfig {
    pub fn fetch_stagger(&self) -> Duration {
        Duration::from_millis(self.fetch_stagger_ms)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./clipforged-out"),
            file_prefix: "discord_".into(),
            fetch_stagger_ms: 400,
        }
    }
}

/// Accepted input files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Lowercase file extensions treated as video.
    pub extensions: Vec<String>,
}

impl InputConfig {
    /// Whether the path looks like a video file by its extension.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| x.eq_ignore_ascii_case(&e))
            })
            .unwrap_or(false)
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "mp4", "mov", "mkv", "webm", "avi", "m4v", "wmv", "flv", "mpeg", "mpg", "3gp",
                "ts",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.compression.size_budget_mb, 7.6);
        assert_eq!(cfg.compression.low_bitrate_threshold_kbps, 800);
        assert_eq!(cfg.compression.high_bitrate_threshold_kbps, 1500);
        assert_eq!(cfg.compression.buffer_size_kb, 2000);
        assert_eq!(cfg.compression.audio_bitrate_kbps, 128);
        assert_eq!(cfg.compression.encoder_preset, "superfast");
        assert_eq!(cfg.probe.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.output.file_prefix, "discord_");
        assert_eq!(cfg.output.fetch_stagger(), Duration::from_millis(400));
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn budget_over_platform_limit_warns() {
        let mut cfg = Config::default();
        cfg.compression.size_budget_mb = 9.5;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("size_budget_mb")));
    }

    #[test]
    fn missing_tool_path_warns() {
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("ffmpeg_path")));
    }

    #[test]
    fn parse_partial_json_uses_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"compression": {"size_budget_mb": 7.9}}"#).unwrap();
        assert_eq!(cfg.compression.size_budget_mb, 7.9);
        assert_eq!(cfg.compression.low_bitrate_threshold_kbps, 800);
        assert_eq!(cfg.probe.timeout_secs, 30);
    }

    #[test]
    fn input_accepts_video_extensions_case_insensitively() {
        let input = InputConfig::default();
        assert!(input.accepts(Path::new("/clips/game.MP4")));
        assert!(input.accepts(Path::new("obs-recording.mkv")));
        assert!(!input.accepts(Path::new("notes.txt")));
        assert!(!input.accepts(Path::new("no_extension")));
    }
}
