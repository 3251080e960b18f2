// FormatSelector - quality selectors and the quality list
//
// Maps the abstract quality selector a client sends (`highest`, `high`,
// `medium`, `low`, `audio`, `auto`) to a yt-dlp format expression, and turns
// the raw stream list of a video into the deduplicated list shown to users.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::models::{QualityEntry, RawFormat};

/// At most this many entries are listed per video
pub const MAX_LISTED_QUALITIES: usize = 10;

/// Abstract quality selector accepted by `POST /api/download`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySelector {
    Highest,
    High,
    Medium,
    Low,
    Audio,
    #[default]
    Auto,
}

impl QualitySelector {
    pub const ALL: [QualitySelector; 6] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Audio,
        Self::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Audio => "audio",
            Self::Auto => "auto",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == value)
    }

    /// Unknown or missing selectors are corrected to `auto`, never rejected
    pub fn from_request(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }

    /// yt-dlp format expression for this selector
    pub fn format_expression(&self) -> &'static str {
        match self {
            Self::Highest => "best[height<=2160]/best",
            Self::High => "best[height<=1080]/best",
            Self::Medium => "best[height<=720]/best",
            Self::Low => "best[height<=480]/best",
            Self::Audio => "bestaudio[ext=m4a]/bestaudio/best",
            Self::Auto => "best[ext=mp4]/best",
        }
    }
}

impl fmt::Display for QualitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a selector to a format expression; `audio_only` always wins
pub fn resolve_format(selector: Option<&str>, audio_only: bool) -> &'static str {
    if audio_only {
        return QualitySelector::Audio.format_expression();
    }
    QualitySelector::from_request(selector).format_expression()
}

/// Quality option for UI display
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QualityOption {
    pub value: QualitySelector,
    pub label: &'static str,
    pub description: &'static str,
}

/// Static catalogue served by `GET /api/qualities`
pub const QUALITY_OPTIONS: [QualityOption; 6] = [
    QualityOption {
        value: QualitySelector::Highest,
        label: "4K (2160p)",
        description: "Highest available quality",
    },
    QualityOption {
        value: QualitySelector::High,
        label: "Full HD (1080p)",
        description: "High quality, good for most uses",
    },
    QualityOption {
        value: QualitySelector::Medium,
        label: "HD (720p)",
        description: "Medium quality, smaller file size",
    },
    QualityOption {
        value: QualitySelector::Low,
        label: "SD (480p)",
        description: "Lower quality, fastest download",
    },
    QualityOption {
        value: QualitySelector::Audio,
        label: "Audio Only",
        description: "Extract audio only (M4A format)",
    },
    QualityOption {
        value: QualitySelector::Auto,
        label: "Auto (Best)",
        description: "Automatically select best quality",
    },
];

/// Build the user-facing quality list from raw streams.
///
/// Only video streams with a known height count. The first stream seen for a
/// given height is kept; later ones with the same height are dropped, so their
/// `format_id` is not reachable through this list.
pub fn build_quality_list(formats: &[RawFormat]) -> Vec<QualityEntry> {
    let mut seen = HashSet::new();
    let mut entries: Vec<QualityEntry> = formats
        .iter()
        .filter(|f| f.has_video())
        .filter_map(|f| f.height.map(|h| (f, h)))
        .filter(|(_, height)| seen.insert(*height))
        .map(|(f, height)| QualityEntry {
            quality: format!("{}p", height),
            height,
            format_id: f.format_id.clone(),
            ext: f.ext.clone().unwrap_or_else(|| "mp4".to_string()),
            filesize: f
                .filesize
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(|s| s as u64),
            fps: f.fps,
        })
        .collect();

    // stable: equal heights cannot occur after dedup anyway
    entries.sort_by(|a, b| b.height.cmp(&a.height));
    entries.truncate(MAX_LISTED_QUALITIES);
    entries
}
