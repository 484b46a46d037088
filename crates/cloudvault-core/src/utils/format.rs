use chrono::{DateTime, Local, Utc};

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;

/// Format a byte count as `B`, `Kb` or `Mb`
pub fn format_size(bytes: i64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} Kb", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} Mb", bytes as f64 / MIB as f64)
    }
}

/// Format a timestamp in local time, e.g. "May 12, 2024 08:30:00"
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local)
        .format("%b %d, %Y %H:%M:%S")
        .to_string()
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Case-insensitive substring match; an empty needle matches everything
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 Kb");
        assert_eq!(format_size(1536), "1.5 Kb");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 Mb");
    }

    #[test]
    fn test_format_date_has_year() {
        let date = Utc.with_ymd_and_hms(2024, 5, 12, 12, 0, 0).unwrap();
        assert!(format_date(&date).contains("2024"));
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Привет мир", 7), "Прив...");
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Report.PDF", "report"));
        assert!(contains_ignore_case("anything", ""));
        assert!(!contains_ignore_case("notes.txt", "pdf"));
    }
}
