//! Output materialization.
//!
//! Encoded bytes become files under the configured output directory, named
//! after the source with the platform prefix (`discord_clip.mp4`). Artifacts
//! outlive the jobs that produced them; removing or clearing jobs never
//! deletes files.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clipforged_core::config::OutputConfig;
use clipforged_core::{ArtifactId, Error, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::queue::{Job, JobStatus};

/// Upper bound on `-N` suffixes tried when a name is taken.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Handle to an encoded output on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Writes encoded outputs and hands them back out.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: OutputConfig,
}

impl ArtifactStore {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Output file name for a source named `hint`.
    pub fn output_name(&self, hint: &str) -> String {
        format!("{}{}.mp4", self.config.file_prefix, stem(hint))
    }

    /// Persist `bytes` as a new artifact named after `name_hint`.
    ///
    /// Existing files are never overwritten; a numeric suffix is appended
    /// until a free name is found.
    pub async fn materialize(&self, name_hint: &str, bytes: Bytes) -> Result<Artifact> {
        tokio::fs::create_dir_all(&self.config.dir).await?;

        let name = self.output_name(name_hint);
        let (file, path) = create_unique(&self.config.dir, &name).await?;
        let size_bytes = discard_on_error(fill(file, &mut &bytes[..]).await, &path).await?;

        let artifact = Artifact {
            id: ArtifactId::new(),
            path,
            size_bytes,
            created_at: Utc::now(),
        };
        tracing::info!(
            "Materialized {} ({} bytes)",
            artifact.path.display(),
            artifact.size_bytes
        );
        Ok(artifact)
    }

    /// Copy every completed job's artifact into `destination`, in queue
    /// order.
    ///
    /// Consecutive transfers are spaced by the configured stagger; the first
    /// starts immediately. Jobs that are not Completed are skipped. Files
    /// already in `destination` are kept and the copy takes a suffixed name.
    pub async fn fetch_all(&self, jobs: &[Job], destination: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(destination).await?;

        let stagger = self.config.fetch_stagger();
        let artifacts = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
            .filter_map(|job| job.artifact.as_ref());

        let mut fetched = Vec::new();
        for (i, artifact) in artifacts.enumerate() {
            if i > 0 && stagger > Duration::ZERO {
                tokio::time::sleep(stagger).await;
            }

            let name = artifact.file_name().ok_or_else(|| {
                Error::Validation(format!("artifact path {} has no file name", artifact.path.display()))
            })?;

            let in_place = destination.join(name);
            if same_file(&artifact.path, &in_place).await {
                tracing::debug!("{} already in place", in_place.display());
                fetched.push(in_place);
                continue;
            }

            let (file, target) = create_unique(destination, name).await?;
            let copied = async {
                let mut source = tokio::fs::File::open(&artifact.path).await?;
                fill(file, &mut source).await
            }
            .await;
            discard_on_error(copied, &target).await?;

            tracing::debug!("Fetched {} -> {}", artifact.path.display(), target.display());
            fetched.push(target);
        }

        Ok(fetched)
    }
}

/// Create `dir/name`, or `dir/<stem>-N.<ext>` with the first free `N`.
async fn create_unique(dir: &Path, name: &str) -> Result<(File, PathBuf)> {
    let stem = stem(name);
    let ext = Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            format!("{stem}-{attempt}{ext}")
        };
        let path = dir.join(candidate);

        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Validation(format!(
        "no free file name for '{name}' in {}",
        dir.display()
    )))
}

async fn fill<R>(mut file: File, reader: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

/// Remove a partially written file so its name is not left holding junk.
async fn discard_on_error<T>(result: io::Result<T>, path: &Path) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                tracing::warn!("Failed to remove partial file {}: {}", path.display(), rm);
            }
            Err(e.into())
        }
    }
}

fn stem(hint: &str) -> String {
    Path::new(hint)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
