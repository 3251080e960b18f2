// Scripted extraction engine used by the unit tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::downloader::errors::EngineError;
use crate::downloader::models::{InfoOptions, ProgressEvent, RawVideoInfo, TransferSpec};
use crate::downloader::traits::{ExtractionEngine, ProgressSender};

pub struct ScriptedEngine {
    info: Result<RawVideoInfo, String>,
    events: Vec<ProgressEvent>,
    output: Option<(String, Vec<u8>)>,
    download_error: Option<String>,
    info_gate: Option<Arc<Notify>>,
    panic_on_download: bool,
    last_info_options: Mutex<Option<InfoOptions>>,
    last_transfer: Mutex<Option<TransferSpec>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            info: Ok(RawVideoInfo {
                title: Some("Test video".to_string()),
                duration: Some(42.0),
                uploader: Some("tester".to_string()),
                view_count: Some(7),
                ..RawVideoInfo::default()
            }),
            events: Vec::new(),
            output: None,
            download_error: None,
            info_gate: None,
            panic_on_download: false,
            last_info_options: Mutex::new(None),
            last_transfer: Mutex::new(None),
        }
    }

    pub fn with_info(mut self, info: RawVideoInfo) -> Self {
        self.info = Ok(info);
        self
    }

    pub fn with_info_error(mut self, message: &str) -> Self {
        self.info = Err(message.to_string());
        self
    }

    pub fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    /// File written into the job's work dir by a successful transfer
    pub fn with_output(mut self, filename: &str, bytes: &[u8]) -> Self {
        self.output = Some((filename.to_string(), bytes.to_vec()));
        self
    }

    pub fn with_download_error(mut self, message: &str) -> Self {
        self.download_error = Some(message.to_string());
        self
    }

    /// Hold `fetch_info` until the gate is notified
    pub fn with_info_gate(mut self, gate: Arc<Notify>) -> Self {
        self.info_gate = Some(gate);
        self
    }

    pub fn with_panic(mut self) -> Self {
        self.panic_on_download = true;
        self
    }

    pub fn last_info_options(&self) -> Option<InfoOptions> {
        *self.last_info_options.lock()
    }

    pub fn last_transfer(&self) -> Option<TransferSpec> {
        self.last_transfer.lock().clone()
    }
}

pub fn in_progress(downloaded: u64, total: u64) -> ProgressEvent {
    ProgressEvent::InProgress {
        downloaded_bytes: downloaded,
        total_bytes: Some(total),
        total_bytes_estimate: None,
        percent_str: None,
        speed_str: Some("1.00MiB/s".to_string()),
        eta_str: Some("00:05".to_string()),
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_info(
        &self,
        _url: &str,
        options: &InfoOptions,
    ) -> Result<RawVideoInfo, EngineError> {
        *self.last_info_options.lock() = Some(*options);
        if let Some(gate) = &self.info_gate {
            gate.notified().await;
        }
        self.info.clone().map_err(EngineError::Failed)
    }

    async fn run_download(
        &self,
        _url: &str,
        spec: &TransferSpec,
        progress: ProgressSender,
    ) -> Result<(), EngineError> {
        *self.last_transfer.lock() = Some(spec.clone());
        if self.panic_on_download {
            panic!("scripted engine panic");
        }
        for event in &self.events {
            let _ = progress.send(event.clone());
        }
        if let Some(message) = &self.download_error {
            return Err(EngineError::Failed(message.clone()));
        }
        if let Some((name, bytes)) = &self.output {
            tokio::fs::write(spec.output_dir.join(name), bytes)
                .await
                .map_err(|e| EngineError::ExecutionError(e.to_string()))?;
        }
        Ok(())
    }
}
