pub use clipforged_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./clipforged.toml", "~/.config/clipforged/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Reject settings that would make every encode fail, and log the rest.
pub fn validate_config(config: &Config) -> Result<()> {
    let c = &config.compression;

    if !c.size_budget_mb.is_finite() || c.size_budget_mb <= 0.0 {
        anyhow::bail!(
            "compression.size_budget_mb must be positive, got {}",
            c.size_budget_mb
        );
    }

    if c.low_bitrate_threshold_kbps > c.high_bitrate_threshold_kbps {
        anyhow::bail!(
            "compression.low_bitrate_threshold_kbps ({}) is above high_bitrate_threshold_kbps ({})",
            c.low_bitrate_threshold_kbps,
            c.high_bitrate_threshold_kbps
        );
    }

    if c.buffer_size_kb == 0 {
        anyhow::bail!("compression.buffer_size_kb cannot be 0");
    }

    if c.audio_bitrate_kbps == 0 {
        anyhow::bail!("compression.audio_bitrate_kbps cannot be 0");
    }

    if c.encoder_preset.trim().is_empty() {
        anyhow::bail!("compression.encoder_preset cannot be empty");
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(())
}

fn expand_paths(config: &mut Config) {
    config.output.dir = expand(&config.output.dir);
    if let Some(dir) = config.engine.work_dir.as_mut() {
        *dir = expand(dir);
    }
    for path in [&mut config.tools.ffmpeg_path, &mut config.tools.ffprobe_path]
        .into_iter()
        .flatten()
    {
        *path = expand(path);
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
