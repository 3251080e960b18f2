use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::downloader::errors::EngineError;
use crate::downloader::models::{InfoOptions, ProgressEvent, RawVideoInfo, TransferSpec};
use crate::downloader::traits::{ExtractionEngine, ProgressSender};
use crate::downloader::utils::{self, run_output_with_timeout};

/// Marker that starts every line printed through our progress template
const PROGRESS_MARKER: &str = "ytdl-progress|";

/// Fields: status, downloaded, total, estimate, percent, speed, eta.
/// yt-dlp prints `NA` for fields it does not know.
const PROGRESS_TEMPLATE: &str = "download:ytdl-progress|%(progress.status)s\
|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s\
|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

/// Parse one stdout line of a running yt-dlp transfer
pub fn parse_ytdlp_progress(line: &str) -> Option<ProgressEvent> {
    // Fallback for the default progress line, e.g.
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*\S+(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
    }

    let line = line.trim();
    if let Some(pos) = line.find(PROGRESS_MARKER) {
        return parse_template_line(&line[pos + PROGRESS_MARKER.len()..]);
    }

    let caps = PROGRESS_RE.captures(line)?;
    Some(ProgressEvent::InProgress {
        downloaded_bytes: 0,
        total_bytes: None,
        total_bytes_estimate: None,
        percent_str: caps.get(1).map(|m| format!("{}%", m.as_str())),
        speed_str: caps.get(2).map(|m| m.as_str().to_string()),
        eta_str: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

fn parse_template_line(fields: &str) -> Option<ProgressEvent> {
    let parts: Vec<&str> = fields.split('|').map(str::trim).collect();
    let field = |i: usize| parts.get(i).copied().filter(|v| !v.is_empty() && *v != "NA");
    let bytes = |i: usize| {
        field(i)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    };

    match field(0)? {
        "finished" => Some(ProgressEvent::Finished),
        "downloading" => Some(ProgressEvent::InProgress {
            downloaded_bytes: bytes(1).unwrap_or(0),
            total_bytes: bytes(2),
            total_bytes_estimate: bytes(3),
            percent_str: field(4).map(str::to_string),
            speed_str: field(5).map(str::to_string),
            eta_str: field(6).map(str::to_string),
        }),
        _ => None,
    }
}

// Find yt-dlp executable in common paths
pub fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac, pip
        "/usr/bin/yt-dlp",          // distro package
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Last resort: hope it's in PATH
    "yt-dlp".to_string()
}

/// Extraction engine backed by the `yt-dlp` binary
pub struct YtDlpEngine {
    binary: String,
    config: EngineConfig,
}

impl YtDlpEngine {
    /// `ytdlp_path` overrides discovery
    pub fn new(ytdlp_path: Option<String>, config: EngineConfig) -> Self {
        let binary = ytdlp_path.unwrap_or_else(find_ytdlp);
        info!(binary = %binary, "using yt-dlp");
        Self { binary, config }
    }

    fn common_args(&self, args: &mut Vec<String>) {
        args.push("--user-agent".to_string());
        args.push(self.config.user_agent.clone());
        args.push("--add-header".to_string());
        args.push("Accept-Language:en-us,en;q=0.5".to_string());
        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
    }

    fn build_info_args(&self, url: &str, options: &InfoOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
            "--socket-timeout".to_string(),
            options.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            options.retries.to_string(),
            "--extractor-retries".to_string(),
            options.retries.to_string(),
        ];
        self.common_args(&mut args);
        args.push(url.to_string());
        args
    }

    fn build_download_args(&self, url: &str, spec: &TransferSpec) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            spec.format.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-color".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "-P".to_string(),
            spec.output_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            spec.output_template.clone(),
            "--retries".to_string(),
            spec.retry.retries.to_string(),
            "--fragment-retries".to_string(),
            spec.retry.fragment_retries.to_string(),
            "--extractor-retries".to_string(),
            spec.retry.extractor_retries.to_string(),
            "--file-access-retries".to_string(),
            spec.retry.file_access_retries.to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            "--http-chunk-size".to_string(),
            self.config.http_chunk_size.to_string(),
            "--concurrent-fragments".to_string(),
            self.config.concurrent_fragments.to_string(),
        ];
        self.common_args(&mut args);
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_info(
        &self,
        url: &str,
        options: &InfoOptions,
    ) -> Result<RawVideoInfo, EngineError> {
        let args = self.build_info_args(url, options);
        debug!("[yt-dlp] {} {}", self.binary, args.join(" "));

        let output =
            run_output_with_timeout(&self.binary, args, self.config.info_timeout_secs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(utils::error_summary(&stderr)));
        }

        serde_json::from_slice::<RawVideoInfo>(&output.stdout)
            .map_err(|e| EngineError::ParseError(format!("Invalid JSON: {}", e)))
    }

    async fn run_download(
        &self,
        url: &str,
        spec: &TransferSpec,
        progress: ProgressSender,
    ) -> Result<(), EngineError> {
        let args = self.build_download_args(url, spec);
        debug!("[yt-dlp] {} {}", self.binary, args.join(" "));

        let mut child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| utils::spawn_error(&self.binary, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::ExecutionError("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[yt-dlp] {}", line);
                collected.push(line);
            }
            collected.join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| EngineError::ExecutionError(format!("Failed to read stdout: {}", e)))?
        {
            match parse_ytdlp_progress(&line) {
                Some(event) => {
                    let _ = progress.send(event);
                }
                None => {
                    if line.contains("[Merger]") || line.contains("Destination") {
                        debug!("[yt-dlp] {}", line);
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::ExecutionError(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }

        let summary = utils::error_summary(&stderr_output);
        warn!(status = %status, error = %summary, "yt-dlp transfer failed");
        Err(EngineError::Failed(summary))
    }
}
