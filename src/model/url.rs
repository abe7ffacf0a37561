//! URL and timestamp helpers used for page attribution

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use super::Timestamp;

fn origin_re() -> &'static Regex {
    static ORIGIN_RE: OnceLock<Regex> = OnceLock::new();
    ORIGIN_RE.get_or_init(|| Regex::new(r"(https?://[^/]*)/.*$").expect("valid origin regex"))
}

/// Truncate a URL down to its scheme and host, e.g.
/// `https://www.google.com/search?q=x` becomes `https://www.google.com`.
/// URLs without a path are returned unchanged.
pub fn truncate_url(url: &str) -> String {
    origin_re().replace(url, "$1").into_owned()
}

/// Key under which a query's results page is registered: the truncated
/// engine URL followed by the query text.
pub fn serp_key(url: &str, query: &str) -> String {
    format!("{}{}", truncate_url(url), query)
}

/// True if both millisecond timestamps fall on the same UTC calendar day.
pub fn same_day(t1: Timestamp, t2: Timestamp) -> bool {
    match (
        DateTime::<Utc>::from_timestamp_millis(t1),
        DateTime::<Utc>::from_timestamp_millis(t2),
    ) {
        (Some(a), Some(b)) => a.date_naive() == b.date_naive(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_url() {
        assert_eq!(
            truncate_url("https://www.google.com/search?q=cats"),
            "https://www.google.com"
        );
        assert_eq!(truncate_url("http://example.org/a/b/c"), "http://example.org");
        assert_eq!(truncate_url("http://example.org"), "http://example.org");
        assert_eq!(truncate_url("about:blank"), "about:blank");
    }

    #[test]
    fn test_serp_key() {
        assert_eq!(
            serp_key("https://www.google.com/search?q=cats", "cats"),
            "https://www.google.comcats"
        );
    }

    #[test]
    fn test_same_day() {
        // 2024-03-01T00:00:00Z
        let midnight = 1_709_251_200_000;
        assert!(same_day(midnight, midnight + 23 * 3_600_000));
        assert!(!same_day(midnight, midnight - 1));
        assert!(!same_day(midnight, i64::MAX));
    }
}
