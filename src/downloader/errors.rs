// Error types for the extraction engine and the job lifecycle

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure surfaced by the extraction engine (yt-dlp)
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// yt-dlp binary could not be located or started
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Process plumbing failed (pipes, wait, spawn)
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Metadata call exceeded its wall-clock budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Engine output could not be understood
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Engine ran and reported an error of its own
    #[error("{0}")]
    Failed(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        if s.contains("No such file") || s.contains("command not found") {
            return Self::ToolNotFound(s);
        }
        Self::Failed(s)
    }
}

/// User-facing classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectionLost,
    AccessDenied,
    VideoUnavailable,
    PrivateVideo,
    Generic,
}

/// Checked in order; first substring hit wins.
const FAILURE_PATTERNS: [(&str, FailureKind); 4] = [
    ("Remote end closed connection", FailureKind::ConnectionLost),
    ("HTTP Error 403", FailureKind::AccessDenied),
    ("Video unavailable", FailureKind::VideoUnavailable),
    ("Private video", FailureKind::PrivateVideo),
];

impl FailureKind {
    /// Match a raw engine message against the known failure patterns
    pub fn diagnose(message: &str) -> Self {
        FAILURE_PATTERNS
            .iter()
            .find(|(pattern, _)| message.contains(pattern))
            .map(|(_, kind)| *kind)
            .unwrap_or(Self::Generic)
    }

    /// Replacement sentence shown to users, `None` for unclassified errors
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionLost => Some(
                "Connection lost during download. Please try again with a different quality \
                 or check your internet connection.",
            ),
            Self::AccessDenied => {
                Some("Access denied. This video might be restricted or require authentication.")
            }
            Self::VideoUnavailable => Some("This video is not available for download."),
            Self::PrivateVideo => Some("This is a private video and cannot be downloaded."),
            Self::Generic => None,
        }
    }
}

/// Errors of the job lifecycle, as seen by callers of the job manager
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad or missing request input, rejected before any job exists
    #[error("{0}")]
    Validation(String),

    /// Metadata or transfer failure; `message` is the raw engine text
    #[error("{message}")]
    Extraction { kind: FailureKind, message: String },

    /// Engine reported success but nothing usable landed in the work dir
    #[error("Downloaded file not found")]
    MissingOutput { dir: PathBuf },

    /// Unknown job id, or its result vanished from storage
    #[error("{0}")]
    NotFound(String),

    /// Explicit cleanup could not delete everything
    #[error("{0}")]
    Cleanup(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn extraction(err: EngineError) -> Self {
        let message = err.to_string();
        Self::Extraction {
            kind: FailureKind::diagnose(&message),
            message,
        }
    }

    /// Text recorded in a job's status when the worker fails with this error
    pub fn user_message(&self) -> String {
        match self {
            Self::Extraction { kind, message } => kind
                .user_message()
                .map(str::to_string)
                .unwrap_or_else(|| message.clone()),
            Self::Io(err) => {
                let message = err.to_string();
                FailureKind::diagnose(&message)
                    .user_message()
                    .map(str::to_string)
                    .unwrap_or(message)
            }
            other => other.to_string(),
        }
    }
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        Self::extraction(err)
    }
}
