// Common data models for the extraction engine boundary

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Subset of yt-dlp's `--dump-json` document the service reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideoInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

impl RawVideoInfo {
    pub fn duration_seconds(&self) -> u64 {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(0)
    }
}

/// One stream as reported by the engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub height: Option<u32>,
    /// yt-dlp occasionally reports sizes as floats
    pub filesize: Option<f64>,
    pub fps: Option<f64>,
}

impl RawFormat {
    pub fn has_video(&self) -> bool {
        matches!(self.vcodec.as_deref(), Some(v) if v != "none")
    }
}

/// One row of the quality list returned by a metadata request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityEntry {
    pub quality: String,
    pub height: u32,
    pub format_id: Option<String>,
    pub ext: String,
    pub filesize: Option<u64>,
    pub fps: Option<f64>,
}

/// Video metadata returned by `POST /api/video-info`
#[derive(Debug, Clone, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub duration: u64,
    pub uploader: String,
    pub view_count: u64,
    pub thumbnail: Option<String>,
    pub formats: Vec<QualityEntry>,
}

/// Progress notification emitted by the engine while a transfer runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    InProgress {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
        percent_str: Option<String>,
        speed_str: Option<String>,
        eta_str: Option<String>,
    },
    /// Transfer done, post-processing may still follow
    Finished,
}

/// Options for an info-only (no download) engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoOptions {
    pub socket_timeout_secs: u32,
    pub retries: u32,
}

impl Default for InfoOptions {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Engine-internal retry budget for a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    pub file_access_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            fragment_retries: 5,
            extractor_retries: 3,
            file_access_retries: 3,
        }
    }
}

/// Everything the engine needs to run one transfer
#[derive(Debug, Clone)]
pub struct TransferSpec {
    /// yt-dlp format expression
    pub format: String,
    /// Private work directory of the job; the only place output may land
    pub output_dir: PathBuf,
    /// yt-dlp output template, relative to `output_dir`
    pub output_template: String,
    pub retry: RetryPolicy,
}

impl TransferSpec {
    pub const DEFAULT_TEMPLATE: &'static str = "%(title)s.%(ext)s";

    pub fn new(format: impl Into<String>, output_dir: PathBuf, retry: RetryPolicy) -> Self {
        Self {
            format: format.into(),
            output_dir,
            output_template: Self::DEFAULT_TEMPLATE.to_string(),
            retry,
        }
    }
}
