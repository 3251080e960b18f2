// Accepted YouTube URL shapes
//
// Patterns are anchored at the start only, so trailing query parameters
// (`&t=42s`, `?si=...`) are accepted.

use regex::Regex;

lazy_static::lazy_static! {
    static ref ACCEPTED_URLS: Vec<Regex> = [
        // watch page
        r"^(?:https?://)?(?:www\.)?youtube\.com/watch\?v=[\w-]+",
        // embed player
        r"^(?:https?://)?(?:www\.)?youtube\.com/embed/[\w-]+",
        // legacy flash player
        r"^(?:https?://)?(?:www\.)?youtube\.com/v/[\w-]+",
        // short link
        r"^(?:https?://)?youtu\.be/[\w-]+",
        // shorts
        r"^(?:https?://)?(?:www\.)?youtube\.com/shorts/[\w-]+",
        // mobile site
        r"^(?:https?://)?(?:m\.)?youtube\.com/watch\?v=[\w-]+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();
}

/// Check whether `url` is one of the supported YouTube URL shapes
pub fn is_acceptable(url: &str) -> bool {
    ACCEPTED_URLS.iter().any(|re| re.is_match(url))
}
