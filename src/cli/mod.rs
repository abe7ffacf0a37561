//! Subcommand implementations for the `tasktrail` binary

pub mod classify;
pub mod find;
pub mod ingest;
pub mod related;
pub mod rename;
pub mod show;
pub mod tasks;

use chrono::{DateTime, Utc};

use crate::model::Timestamp;

/// UTC rendering of a millisecond timestamp
pub(crate) fn format_time(ms: Option<Timestamp>) -> String {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Cut `text` to `max` characters, marking the cut with "..."
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let text = text.lines().next().unwrap_or(text);
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
