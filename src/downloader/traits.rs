// Extraction engine trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::errors::EngineError;
use super::models::{InfoOptions, ProgressEvent, RawVideoInfo, TransferSpec};

/// Channel the engine pushes progress events into, in emission order
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Media extraction capability (yt-dlp or a test double)
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Resolve metadata and stream list without downloading
    async fn fetch_info(&self, url: &str, options: &InfoOptions)
        -> Result<RawVideoInfo, EngineError>;

    /// Run one transfer into `spec.output_dir`.
    ///
    /// Emits zero or more `InProgress` events, then usually a `Finished`
    /// event, before returning. Send failures on `progress` are ignored: the
    /// receiving worker may already be gone.
    async fn run_download(
        &self,
        url: &str,
        spec: &TransferSpec,
        progress: ProgressSender,
    ) -> Result<(), EngineError>;
}
