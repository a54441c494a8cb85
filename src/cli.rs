use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforged")]
#[command(author, version, about = "Compress videos to fit an upload size cap")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress one or more videos under the size budget
    Compress {
        /// Video files to compress, processed in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Copy finished outputs into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the encode parameters for a clip length without encoding
    Plan {
        /// Clip duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Override the configured size budget (MB)
        #[arg(long)]
        budget_mb: Option<f64>,
    },

    /// Probe a video file's duration
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Display version information
    Version,
}
