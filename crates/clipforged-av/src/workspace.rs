//! Per-job scratch directories.
//!
//! Every encode gets its own [`Workspace`] so intermediate files are named
//! after the job (`job-<index>-output.mp4`) instead of a fixed name shared
//! between jobs. The directory is removed when the workspace is dropped.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;

/// Scratch directory for a single job.
///
/// # Example
///
/// ```no_run
/// use clipforged_av::Workspace;
///
/// # async fn example() -> clipforged_core::Result<()> {
/// let workspace = Workspace::new(None, 3)?;
/// // ... ffmpeg writes to workspace.output() ...
/// let bytes = workspace.read_output().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    job_index: u64,
}

impl Workspace {
    /// Create a workspace for the job with the given submission index.
    ///
    /// The directory is created under `parent` when given, otherwise under
    /// the system temp directory.
    pub fn new(parent: Option<&Path>, job_index: u64) -> clipforged_core::Result<Self> {
        let prefix = format!("clipforged-job-{job_index}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let temp_dir = match parent {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| {
            clipforged_core::Error::tool("workspace", format!("failed to create temp dir: {e}"))
        })?;

        Ok(Self {
            temp_dir,
            job_index,
        })
    }

    /// Submission index of the owning job.
    pub fn job_index(&self) -> u64 {
        self.job_index
    }

    /// Path to the temporary directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Job-namespaced path for the encoder output.
    pub fn output(&self) -> PathBuf {
        self.temp_file("output.mp4")
    }

    /// Job-namespaced path for a named temporary file.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir
            .path()
            .join(format!("job-{}-{name}", self.job_index))
    }

    /// Read the encoder output into memory.
    ///
    /// # Errors
    ///
    /// Returns [`clipforged_core::Error::Encode`] if the encoder produced no
    /// output file.
    pub async fn read_output(&self) -> clipforged_core::Result<Bytes> {
        let output = self.output();
        match tokio::fs::read(&output).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(clipforged_core::Error::Encode(format!(
                    "encoder produced no output at {}",
                    output.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}
