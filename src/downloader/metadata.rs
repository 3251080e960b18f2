// Metadata lookup (info-only engine call)

use tracing::{debug, warn};

use super::errors::JobError;
use super::format_selector::build_quality_list;
use super::models::{InfoOptions, VideoMetadata};
use super::traits::ExtractionEngine;

/// Fetch title, counters and the quality list for `url` without downloading
pub async fn fetch_metadata(
    engine: &dyn ExtractionEngine,
    url: &str,
    options: &InfoOptions,
) -> Result<VideoMetadata, JobError> {
    debug!(engine = engine.name(), url, "fetching video metadata");

    let info = engine.fetch_info(url, options).await.map_err(|err| {
        warn!(engine = engine.name(), url, error = %err, "metadata extraction failed");
        JobError::extraction(err)
    })?;

    let formats = build_quality_list(&info.formats);
    Ok(VideoMetadata {
        duration: info.duration_seconds(),
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
        view_count: info.view_count.unwrap_or(0),
        thumbnail: info.thumbnail,
        formats,
    })
}
