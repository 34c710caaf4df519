//! Post text and alt text assembly.

use crate::ingest::VideoSource;

/// Format a playback position as `H:MM:SS`, truncating to whole seconds.
///
/// Hours are not padded and keep counting past 24 (`25:00:00`).
pub fn format_timestamp(timestamp_seconds: f64) -> String {
    // NaN and negative positions clamp to zero
    let total = timestamp_seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Build the post text, optionally suffixed with the bracketed frame position.
pub fn build_caption(text: &str, include_timestamp: bool, timestamp_seconds: f64) -> String {
    if !include_timestamp {
        return text.to_string();
    }
    let stamp = format!("[{}]", format_timestamp(timestamp_seconds));
    if text.is_empty() {
        stamp
    } else {
        format!("{} {}", text, stamp)
    }
}

/// Describe the frame for screen readers.
pub fn build_alt_text(source: &VideoSource, timestamp_seconds: f64) -> String {
    format!(
        "Frame from {} at {:.2}s",
        source.name(),
        timestamp_seconds
    )
}
