// Download worker: one background task per job

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::table::{JobId, JobState, JobStatus, JobTable, ResultFile};
use crate::downloader::errors::JobError;
use crate::downloader::format_selector::{resolve_format, QualitySelector};
use crate::downloader::models::{InfoOptions, ProgressEvent, RetryPolicy, TransferSpec};
use crate::downloader::traits::ExtractionEngine;
use crate::downloader::utils::{find_media_file, is_dir_empty};

/// Progress never reaches 100 before the job is Completed
pub const MAX_RUNNING_PROGRESS: u8 = 99;

pub struct DownloadWorker {
    pub id: JobId,
    pub url: String,
    pub quality: QualitySelector,
    pub audio_only: bool,
    pub work_dir: PathBuf,
    pub table: Arc<JobTable>,
    pub engine: Arc<dyn ExtractionEngine>,
    pub info_options: InfoOptions,
    pub retry: RetryPolicy,
}

impl DownloadWorker {
    /// Drive the job to a terminal state. Errors end up in the table.
    pub async fn run(self) {
        if self.start().is_err() {
            debug!(job = %self.id, "job removed before the worker started");
            return;
        }

        match self.execute().await {
            Ok(()) => {}
            Err(err) => self.fail(err).await,
        }
    }

    /// Pending -> Downloading at 0%
    fn start(&self) -> Result<(), JobError> {
        self.table.update(
            &self.id,
            JobStatus {
                status: JobState::Downloading,
                progress: 0,
                message: "Initializing download...".to_string(),
                quality: Some(self.quality),
                ..JobStatus::default()
            },
        )
    }

    async fn execute(&self) -> Result<(), JobError> {
        self.table.modify(&self.id, |s| {
            s.message = "Extracting video information...".to_string();
        })?;

        let info = self
            .engine
            .fetch_info(&self.url, &self.info_options)
            .await?;
        let title = info.title.clone().unwrap_or_else(|| "video".to_string());
        let duration = info.duration_seconds();
        self.table.modify(&self.id, |s| {
            s.title = Some(title);
            s.duration = Some(duration);
            s.message = "Starting download...".to_string();
        })?;

        self.transfer().await?;

        let path = find_media_file(&self.work_dir)
            .await?
            .ok_or_else(|| JobError::MissingOutput {
                dir: self.work_dir.clone(),
            })?;
        let size = tokio::fs::metadata(&path).await?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());

        let result = ResultFile {
            path: path.clone(),
            filename,
            size,
            quality: self.quality,
            audio_only: self.audio_only,
        };
        if self.table.complete(&self.id, result).is_err() {
            // Cleaned up while running: nobody can fetch the file anymore
            warn!(job = %self.id, "job removed during download, discarding output");
            discard_output(&path, &self.work_dir).await;
            return Ok(());
        }

        info!(job = %self.id, file = %path.display(), size, "download completed");
        Ok(())
    }

    async fn transfer(&self) -> Result<(), JobError> {
        let spec = TransferSpec::new(
            resolve_format(Some(self.quality.as_str()), self.audio_only),
            self.work_dir.clone(),
            self.retry,
        );
        debug!(job = %self.id, format = %spec.format, engine = self.engine.name(), "starting transfer");

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let transfer = self.engine.run_download(&self.url, &spec, tx);
        tokio::pin!(transfer);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.apply(&event),
                res = &mut transfer => break res,
            }
        };
        // events sent right before the engine returned
        while let Ok(event) = rx.try_recv() {
            self.apply(&event);
        }

        outcome.map_err(JobError::extraction)
    }

    fn apply(&self, event: &ProgressEvent) {
        if self
            .table
            .modify(&self.id, |s| apply_event(s, event))
            .is_err()
        {
            debug!(job = %self.id, "progress for a removed job dropped");
        }
    }

    async fn fail(&self, err: JobError) {
        let message = err.user_message();
        // the file scan failing after "finished" leaves progress where it was
        let keep_progress = matches!(err, JobError::MissingOutput { .. });
        error!(job = %self.id, error = %err, "download failed");

        let recorded = self.table.modify(&self.id, |s| {
            s.status = JobState::Error;
            if !keep_progress {
                s.progress = 0;
            }
            s.message = message;
            s.speed = None;
            s.eta = None;
        });
        if recorded.is_err() {
            // Cleaned up while running: leftovers belong to nobody now
            debug!(job = %self.id, "failure for a removed job, dropping work dir");
            discard_work_dir(&self.work_dir).await;
        }
    }
}

/// Translate one engine event into the job status.
///
/// Ignored unless the job is Downloading.
pub fn apply_event(status: &mut JobStatus, event: &ProgressEvent) {
    if status.status != JobState::Downloading {
        return;
    }

    match event {
        ProgressEvent::InProgress {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
            percent_str,
            speed_str,
            eta_str,
        } => {
            let percent = percent_complete(
                *downloaded_bytes,
                *total_bytes,
                *total_bytes_estimate,
                percent_str.as_deref(),
            )
            .max(status.progress);
            status.progress = percent;
            status.message = format!("Downloading... {}%", percent);
            status.speed = speed_str.clone();
            status.eta = eta_str.clone();
        }
        ProgressEvent::Finished => {
            status.progress = MAX_RUNNING_PROGRESS;
            status.message = "Processing and finalizing...".to_string();
            status.speed = None;
            status.eta = None;
        }
    }
}

/// Percent done from byte counts, else from the engine's own percent string.
///
/// Clamped to `0..=99`.
pub fn percent_complete(
    downloaded: u64,
    total: Option<u64>,
    estimate: Option<u64>,
    percent_str: Option<&str>,
) -> u8 {
    let raw = match total.filter(|t| *t > 0).or(estimate.filter(|t| *t > 0)) {
        Some(total) => downloaded as f64 / total as f64 * 100.0,
        None => percent_str
            .and_then(|p| p.trim().trim_end_matches('%').trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .unwrap_or(0.0),
    };
    raw.clamp(0.0, MAX_RUNNING_PROGRESS as f64) as u8
}

async fn discard_output(path: &Path, work_dir: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(file = %path.display(), error = %e, "failed to delete orphaned output");
    }
    if matches!(is_dir_empty(work_dir).await, Ok(true)) {
        let _ = tokio::fs::remove_dir(work_dir).await;
    }
}

async fn discard_work_dir(work_dir: &Path) {
    match tokio::fs::remove_dir_all(work_dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            warn!(dir = %work_dir.display(), error = %e, "failed to delete orphaned work dir");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{in_progress, ScriptedEngine};
    use uuid::Uuid;

    fn downloading() -> JobStatus {
        JobStatus {
            status: JobState::Downloading,
            ..JobStatus::default()
        }
    }

    fn worker(engine: ScriptedEngine, dir: &Path) -> (DownloadWorker, Arc<JobTable>, JobId) {
        let table = Arc::new(JobTable::new());
        let id = Uuid::new_v4();
        table.create_in(id, dir.to_path_buf());
        let worker = DownloadWorker {
            id,
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            quality: QualitySelector::Medium,
            audio_only: false,
            work_dir: dir.to_path_buf(),
            table: table.clone(),
            engine: Arc::new(engine),
            info_options: InfoOptions::default(),
            retry: RetryPolicy::default(),
        };
        (worker, table, id)
    }

    #[test]
    fn test_percent_sources() {
        assert_eq!(percent_complete(50, Some(100), Some(1000), None), 50);
        assert_eq!(percent_complete(50, None, Some(200), None), 25);
        assert_eq!(percent_complete(50, Some(0), Some(200), None), 25);
        assert_eq!(percent_complete(0, None, None, Some(" 42.7%")), 42);
        assert_eq!(percent_complete(0, None, None, Some("garbage")), 0);
        assert_eq!(percent_complete(0, None, None, None), 0);
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(percent_complete(150, Some(100), None, None), 99);
        assert_eq!(percent_complete(100, Some(100), None, None), 99);
        assert_eq!(percent_complete(0, None, None, Some("100%")), 99);
    }

    #[test]
    fn test_progress_monotonic_and_capped() {
        let mut status = downloading();
        let mut seen = Vec::new();
        for (done, total) in [(10, 100), (50, 100), (95, 100), (30, 100), (100, 100)] {
            apply_event(&mut status, &in_progress(done, total));
            seen.push(status.progress);
        }
        assert_eq!(seen, vec![10, 50, 95, 95, 99]);
        assert_eq!(status.message, "Downloading... 99%");
        assert_eq!(status.speed.as_deref(), Some("1.00MiB/s"));

        apply_event(&mut status, &ProgressEvent::Finished);
        assert_eq!(status.progress, 99);
        assert_eq!(status.message, "Processing and finalizing...");
        assert_eq!(status.speed, None);
        assert_eq!(status.eta, None);
    }

    #[test]
    fn test_events_ignored_outside_downloading() {
        let mut status = JobStatus {
            status: JobState::Error,
            message: "boom".to_string(),
            ..JobStatus::default()
        };
        apply_event(&mut status, &in_progress(50, 100));
        apply_event(&mut status, &ProgressEvent::Finished);
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "boom");
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new()
            .with_events(vec![
                in_progress(10, 100),
                in_progress(50, 100),
                in_progress(95, 100),
                ProgressEvent::Finished,
            ])
            .with_output("Test video.mp4", &[0u8; 2048]);
        let (worker, table, id) = worker(engine, dir.path());

        worker.run().await;

        let status = table.get(&id).unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.message, "Download completed successfully!");
        assert_eq!(status.title.as_deref(), Some("Test video"));
        assert_eq!(status.duration, Some(42));
        assert_eq!(status.file_size, Some(2048));
        assert_eq!(status.quality, Some(QualitySelector::Medium));

        let result = table.result(&id).unwrap();
        assert_eq!(result.size, 2048);
        assert_eq!(result.filename, "Test video.mp4");
        assert!(result.path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_transfer_spec_uses_work_dir_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new().with_output("a.m4a", b"abc"));
        let table = Arc::new(JobTable::new());
        let id = Uuid::new_v4();
        table.create_in(id, dir.path().to_path_buf());
        DownloadWorker {
            id,
            url: "https://youtu.be/abc".to_string(),
            quality: QualitySelector::High,
            audio_only: true,
            work_dir: dir.path().to_path_buf(),
            table: table.clone(),
            engine: engine.clone(),
            info_options: InfoOptions::default(),
            retry: RetryPolicy::default(),
        }
        .run()
        .await;

        let spec = engine.last_transfer().unwrap();
        assert_eq!(spec.format, "bestaudio[ext=m4a]/bestaudio/best");
        assert_eq!(spec.output_dir, dir.path());
        assert_eq!(spec.retry.retries, 5);
        assert_eq!(spec.retry.fragment_retries, 5);
        assert!(table.result(&id).unwrap().audio_only);
    }

    #[tokio::test]
    async fn test_classified_failure_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new()
            .with_events(vec![in_progress(40, 100)])
            .with_download_error("ERROR: unable to download video data: HTTP Error 403: Forbidden");
        let (worker, table, id) = worker(engine, dir.path());

        worker.run().await;

        let status = table.get(&id).unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(status.progress, 0);
        assert_eq!(
            status.message,
            "Access denied. This video might be restricted or require authentication."
        );
        assert_eq!(status.title.as_deref(), Some("Test video"));
        assert_eq!(status.duration, Some(42));
        assert!(table.result(&id).is_none());
    }

    #[tokio::test]
    async fn test_info_failure_uses_raw_message() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new().with_info_error("ERROR: something odd");
        let (worker, table, id) = worker(engine, dir.path());

        worker.run().await;

        let status = table.get(&id).unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(status.message, "ERROR: something odd");
        assert_eq!(status.title, None);
    }

    #[tokio::test]
    async fn test_missing_output_keeps_progress() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("clip.mp4.part"), b"partial")
            .await
            .unwrap();
        let engine = ScriptedEngine::new().with_events(vec![
            in_progress(60, 100),
            ProgressEvent::Finished,
        ]);
        let (worker, table, id) = worker(engine, dir.path());

        worker.run().await;

        let status = table.get(&id).unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(status.message, "Downloaded file not found");
        assert_eq!(status.progress, 99);
    }

    #[tokio::test]
    async fn test_removed_job_is_not_resurrected() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("ytdl_job");
        tokio::fs::create_dir(&work_dir).await.unwrap();
        let engine = ScriptedEngine::new().with_output("clip.mp4", b"data");
        let (worker, table, id) = worker(engine, &work_dir);
        table.remove(&id);

        worker.run().await;

        assert!(table.get(&id).is_err());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_removed_mid_flight_stays_removed() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("ytdl_job");
        tokio::fs::create_dir(&work_dir).await.unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let engine = ScriptedEngine::new()
            .with_info_gate(gate.clone())
            .with_output("clip.mp4", b"data");
        let (worker, table, id) = worker(engine, &work_dir);

        let handle = tokio::spawn(worker.run());
        while !matches!(table.get(&id).map(|s| s.status), Ok(JobState::Downloading)) {
            tokio::task::yield_now().await;
        }
        table.remove(&id);
        gate.notify_one();
        handle.await.unwrap();

        assert!(table.get(&id).is_err());
        assert!(table.is_empty());
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn test_failure_after_cleanup_drops_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("ytdl_job");
        tokio::fs::create_dir(&work_dir).await.unwrap();
        tokio::fs::write(work_dir.join("clip.mp4.part"), b"partial")
            .await
            .unwrap();

        let gate = Arc::new(tokio::sync::Notify::new());
        let engine = ScriptedEngine::new()
            .with_info_gate(gate.clone())
            .with_download_error("ERROR: Remote end closed connection");
        let (worker, table, id) = worker(engine, &work_dir);

        let handle = tokio::spawn(worker.run());
        while !matches!(table.get(&id).map(|s| s.status), Ok(JobState::Downloading)) {
            tokio::task::yield_now().await;
        }
        crate::jobs::cleanup::cleanup_now(&table, &id).await.unwrap();
        // partial file keeps the dir alive through the cleanup itself
        assert!(work_dir.exists());
        gate.notify_one();
        handle.await.unwrap();

        assert!(table.is_empty());
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_start_is_downloading_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, table, id) = worker(ScriptedEngine::new(), dir.path());
        assert_eq!(table.get(&id).unwrap().status, JobState::Pending);

        worker.start().unwrap();
        let status = table.get(&id).unwrap();
        assert_eq!(status.status, JobState::Downloading);
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "Initializing download...");
        assert_eq!(status.quality, Some(QualitySelector::Medium));
    }

    #[tokio::test]
    async fn test_running_worker_held_in_info_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let engine = ScriptedEngine::new().with_info_gate(gate.clone());
        let (worker, table, id) = worker(engine, dir.path());

        let handle = tokio::spawn(worker.run());
        while !matches!(table.get(&id).map(|s| s.status), Ok(JobState::Downloading)) {
            tokio::task::yield_now().await;
        }
        let status = table.get(&id).unwrap();
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "Extracting video information...");
        assert_eq!(status.title, None);

        gate.notify_one();
        handle.await.unwrap();
    }
}
