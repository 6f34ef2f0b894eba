//! Timestamp formatting shared across the dispatch layer.

use chrono::{DateTime, Utc};

/// Formats a UTC instant the way SQLite's `datetime('now')` does
/// (`YYYY-MM-DD HH:MM:SS`), so code-written and default-written
/// timestamps compare lexicographically.
pub fn sql_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn matches_sqlite_format() {
        let at = Utc.with_ymd_and_hms(2025, 6, 2, 15, 4, 5).unwrap();
        assert_eq!(sql_timestamp(at), "2025-06-02 15:04:05");
    }
}
