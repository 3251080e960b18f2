// Downloader module - engine boundary, URL checks and format resolution

pub mod errors;
pub mod format_selector;
pub mod metadata;
pub mod models;
pub mod traits;
pub mod url_validator;
pub mod utils;

pub use errors::{EngineError, FailureKind, JobError};
pub use format_selector::{resolve_format, QualitySelector, QUALITY_OPTIONS};
pub use models::{ProgressEvent, RawVideoInfo, TransferSpec, VideoMetadata};
pub use traits::{ExtractionEngine, ProgressSender};
