// Job table: per-id status, result file and work directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::downloader::errors::JobError;
use crate::downloader::format_selector::QualitySelector;

pub type JobId = Uuid;

/// Job status (serialized lowercase for the status endpoint)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Downloading,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Mutable status record polled by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStatus {
    pub status: JobState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualitySelector>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            message: "Download queued".to_string(),
            ..Self::default()
        }
    }
}

/// Finished artifact of a completed job
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub quality: QualitySelector,
    pub audio_only: bool,
}

#[derive(Debug, Clone)]
pub struct JobEntry {
    pub status: JobStatus,
    pub result: Option<ResultFile>,
    /// Private directory owned by the job until cleanup
    pub work_dir: Option<PathBuf>,
}

/// Status plus result availability, as returned by `GET /api/status/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub status: JobStatus,
    pub file_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

fn not_found(id: &JobId) -> JobError {
    JobError::NotFound(format!("Download {} not found", id))
}

/// Shared map of live jobs
#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Pending job with no work directory
    pub fn create(&self, id: JobId) -> JobStatus {
        self.insert(id, None)
    }

    /// Register a Pending job owning `work_dir`
    pub fn create_in(&self, id: JobId, work_dir: PathBuf) -> JobStatus {
        self.insert(id, Some(work_dir))
    }

    fn insert(&self, id: JobId, work_dir: Option<PathBuf>) -> JobStatus {
        let status = JobStatus::pending();
        self.jobs.write().insert(
            id,
            JobEntry {
                status: status.clone(),
                result: None,
                work_dir,
            },
        );
        status
    }

    /// Overwrite the status of an existing job.
    ///
    /// A removed job is never recreated.
    pub fn update(&self, id: &JobId, status: JobStatus) -> Result<(), JobError> {
        self.modify(id, |current| *current = status)
    }

    /// Read-modify-write under a single write lock
    pub fn modify<F>(&self, id: &JobId, f: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        f(&mut entry.status);
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Result<JobStatus, JobError> {
        self.jobs
            .read()
            .get(id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Store the result and mark the job Completed in one step
    pub fn complete(&self, id: &JobId, result: ResultFile) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.status = JobStatus {
            status: JobState::Completed,
            progress: 100,
            message: "Download completed successfully!".to_string(),
            speed: None,
            eta: None,
            file_size: Some(result.size),
            quality: Some(result.quality),
            title: entry.status.title.take(),
            duration: entry.status.duration,
        };
        entry.result = Some(result);
        Ok(())
    }

    /// Low-level: store `result` without touching the status.
    ///
    /// The worker goes through `complete`, which keeps "result exists iff
    /// Completed"; callers of this primitive own that invariant.
    pub fn attach_result(&self, id: &JobId, result: ResultFile) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.result = Some(result);
        Ok(())
    }

    pub fn result(&self, id: &JobId) -> Option<ResultFile> {
        self.jobs
            .read()
            .get(id)
            .and_then(|entry| entry.result.clone())
    }

    pub fn work_dir(&self, id: &JobId) -> Option<PathBuf> {
        self.jobs
            .read()
            .get(id)
            .and_then(|entry| entry.work_dir.clone())
    }

    /// Take the entry out of the table; `None` if it was already gone
    pub fn remove(&self, id: &JobId) -> Option<JobEntry> {
        self.jobs.write().remove(id)
    }

    pub fn snapshot(&self, id: &JobId) -> Result<StatusReport, JobError> {
        let jobs = self.jobs.read();
        let entry = jobs.get(id).ok_or_else(|| not_found(id))?;
        Ok(StatusReport {
            status: entry.status.clone(),
            file_ready: entry.result.is_some(),
            filename: entry.result.as_ref().map(|r| r.filename.clone()),
        })
    }

    /// Whether `dir` belongs to a live job
    pub fn owns_dir(&self, dir: &Path) -> bool {
        self.jobs
            .read()
            .values()
            .any(|entry| entry.work_dir.as_deref() == Some(dir))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}
