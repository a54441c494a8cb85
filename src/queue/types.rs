use chrono::{DateTime, Utc};
use clipforged_core::EncodeParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::output::Artifact;

/// Highest progress a job reports before it is Completed.
const MAX_RUNNING_PROGRESS: u8 = 99;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Submission order; unique and increasing.
    pub index: u64,
    pub source: PathBuf,
    pub file_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub params: Option<EncodeParams>,
    pub artifact: Option<Artifact>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl Job {
    pub fn new(index: u64, source: PathBuf) -> Self {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            index,
            source,
            file_name,
            status: JobStatus::Pending,
            progress: 0,
            params: None,
            artifact: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Raise progress; lower or repeated values are ignored. Returns whether
    /// the stored value changed.
    pub fn update_progress(&mut self, progress: u8) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let progress = progress.min(MAX_RUNNING_PROGRESS);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    pub fn complete(&mut self, artifact: Artifact) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.artifact = Some(artifact);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Error;
        self.progress = 0;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

impl<'a> FromIterator<&'a Job> for JobCounts {
    fn from_iter<I: IntoIterator<Item = &'a Job>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut counts, job| {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Error => counts.failed += 1,
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforged_core::ArtifactId;

    fn artifact() -> Artifact {
        Artifact {
            id: ArtifactId::new(),
            path: PathBuf::from("/out/discord_a.mp4"),
            size_bytes: 10,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_job_is_pending() {
        let job = Job::new(3, PathBuf::from("/videos/a.mov"));
        assert_eq!(job.index, 3);
        assert_eq!(job.file_name, "a.mov");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.artifact.is_none());
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let mut job = Job::new(0, PathBuf::from("a.mov"));
        assert!(!job.update_progress(10), "pending jobs do not move");

        job.start();
        assert!(job.update_progress(40));
        assert!(!job.update_progress(20));
        assert_eq!(job.progress, 40);
        assert!(job.update_progress(100));
        assert_eq!(job.progress, 99);

        job.complete(artifact());
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.artifact.is_some());
    }

    #[test]
    fn failure_resets_progress() {
        let mut job = Job::new(0, PathBuf::from("a.mov"));
        job.start();
        job.update_progress(70);
        job.fail("decoder error");

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("decoder error"));
        assert!(job.artifact.is_none());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn counts_by_status() {
        let mut jobs: Vec<Job> = (0..4).map(|i| Job::new(i, PathBuf::from("a.mov"))).collect();
        jobs[0].start();
        jobs[1].start();
        jobs[1].fail("x");
        jobs[2].start();
        jobs[2].complete(artifact());

        let counts: JobCounts = jobs.iter().collect();
        assert_eq!(
            counts,
            JobCounts {
                pending: 1,
                processing: 1,
                completed: 1,
                failed: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
