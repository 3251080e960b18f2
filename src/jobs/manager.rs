// JobManager - entry point for the HTTP layer
//
// Owns the job table and the extraction engine, validates requests, spawns
// one supervised worker per accepted download and routes retrieval and
// cleanup to the cleanup module.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::cleanup::{self, RetrievedFile};
use super::table::{JobId, JobState, JobTable, StatusReport};
use super::worker::DownloadWorker;
use crate::downloader::errors::JobError;
use crate::downloader::format_selector::QualitySelector;
use crate::downloader::metadata::fetch_metadata;
use crate::downloader::models::{InfoOptions, RetryPolicy, VideoMetadata};
use crate::downloader::traits::ExtractionEngine;
use crate::downloader::url_validator::is_acceptable;

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub work_root: PathBuf,
    pub work_dir_prefix: String,
    pub cleanup_grace: Duration,
    /// Age after which orphaned work dirs are swept; zero disables
    pub stale_after: Duration,
    pub info: InfoOptions,
    pub retry: RetryPolicy,
}

/// Service-owned parent of the work dirs; the stale sweep only ever looks here
pub fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("ytdl-service")
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            work_dir_prefix: "ytdl_".to_string(),
            cleanup_grace: Duration::from_secs(30),
            stale_after: Duration::from_secs(2 * 60 * 60),
            info: InfoOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Acknowledgement returned when a download job is accepted
#[derive(Debug, Clone, Serialize)]
pub struct StartedDownload {
    pub download_id: String,
    pub message: &'static str,
    pub status: &'static str,
    pub quality: QualitySelector,
    pub audio_only: bool,
}

pub struct JobManager {
    table: Arc<JobTable>,
    engine: Arc<dyn ExtractionEngine>,
    settings: ManagerSettings,
}

fn parse_id(id: &str) -> Option<JobId> {
    Uuid::parse_str(id.trim()).ok()
}

impl JobManager {
    pub fn new(engine: Arc<dyn ExtractionEngine>, settings: ManagerSettings) -> Self {
        Self {
            table: Arc::new(JobTable::new()),
            engine,
            settings,
        }
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Metadata and quality list for `url`, no job is created
    pub async fn video_info(&self, url: &str) -> Result<VideoMetadata, JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobError::Validation("URL is required".to_string()));
        }
        if !is_acceptable(url) {
            return Err(JobError::Validation("Invalid YouTube URL".to_string()));
        }
        fetch_metadata(self.engine.as_ref(), url, &self.settings.info).await
    }

    /// Validate, register the job and spawn its worker.
    ///
    /// The job is visible in the table before this returns.
    pub async fn start_download(
        &self,
        url: &str,
        quality: Option<&str>,
        audio_only: bool,
    ) -> Result<StartedDownload, JobError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobError::Validation("URL is required".to_string()));
        }
        if !is_acceptable(url) {
            return Err(JobError::Validation(
                "Invalid YouTube URL. Please provide a valid YouTube video URL.".to_string(),
            ));
        }
        let quality = QualitySelector::from_request(quality);

        let id = Uuid::new_v4();
        let work_dir = self.settings.work_root.join(format!(
            "{}{}",
            self.settings.work_dir_prefix,
            id.simple()
        ));
        tokio::fs::create_dir_all(&work_dir).await?;
        self.table.create_in(id, work_dir.clone());

        info!(job = %id, url, quality = %quality, audio_only, "download accepted");
        self.spawn_supervised(DownloadWorker {
            id,
            url: url.to_string(),
            quality,
            audio_only,
            work_dir,
            table: self.table.clone(),
            engine: self.engine.clone(),
            info_options: self.settings.info,
            retry: self.settings.retry,
        });

        Ok(StartedDownload {
            download_id: id.to_string(),
            message: "Download started",
            status: "started",
            quality,
            audio_only,
        })
    }

    /// Run the worker in its own task; a panic is recorded as a failed job
    fn spawn_supervised(&self, worker: DownloadWorker) {
        let table = self.table.clone();
        let id = worker.id;
        tokio::spawn(async move {
            let Err(join_err) = tokio::spawn(worker.run()).await else {
                return;
            };
            if !join_err.is_panic() {
                return;
            }
            error!(job = %id, "download worker panicked");
            let _ = table.modify(&id, |s| {
                s.status = JobState::Error;
                s.progress = 0;
                s.message = "Download failed unexpectedly.".to_string();
                s.speed = None;
                s.eta = None;
            });
        });
    }

    pub fn status(&self, id: &str) -> Result<StatusReport, JobError> {
        parse_id(id)
            .and_then(|id| self.table.snapshot(&id).ok())
            .ok_or_else(|| JobError::NotFound("Download not found".to_string()))
    }

    /// Open the finished file and schedule its deferred cleanup
    pub async fn retrieve(&self, id: &str) -> Result<RetrievedFile, JobError> {
        let id = parse_id(id).ok_or_else(|| {
            JobError::NotFound("File not found or download not completed".to_string())
        })?;
        cleanup::retrieve(&self.table, id, self.settings.cleanup_grace).await
    }

    pub async fn cleanup_now(&self, id: &str) -> Result<(), JobError> {
        match parse_id(id) {
            Some(id) => cleanup::cleanup_now(&self.table, &id).await,
            None => Ok(()),
        }
    }

    /// Remove work dirs left behind by an earlier run
    pub async fn sweep_stale_work_dirs(&self) -> usize {
        cleanup::sweep_stale_work_dirs(
            &self.table,
            &self.settings.work_root,
            &self.settings.work_dir_prefix,
            self.settings.stale_after,
        )
        .await
    }
}
