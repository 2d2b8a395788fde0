// src/utils/text.rs

//! Text sanitization for ingested documents.
//!
//! Search results arrive with the backend's highlight markup embedded in
//! titles and court labels. Titles and court names are stripped and
//! whitespace-normalized before storage; headlines keep their markup (the
//! highlights are meaningful there). Dates from the backend are occasionally
//! garbled, so anything unparseable or in a future year is dropped.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Remove HTML tags and collapse whitespace runs.
pub fn strip_tags(text: &str) -> String {
    let without_tags = tag_pattern().replace_all(text, " ");
    normalize_whitespace(&without_tags)
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a backend-supplied `YYYY-MM-DD` date, rejecting unparseable values
/// and dates in a future year (a recurring backend data defect).
pub fn parse_judgment_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    if parsed.year() > today.year() {
        return None;
    }
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[test]
    fn test_strip_tags_basic() {
        assert_eq!(
            strip_tags("Department Of <b>Income</b> <b>Tax</b>"),
            "Department Of Income Tax"
        );
    }

    #[test]
    fn test_strip_tags_nested() {
        assert_eq!(strip_tags("<em><b>Test</b></em> Judgment"), "Test Judgment");
    }

    #[test]
    fn test_strip_tags_no_html_unchanged() {
        assert_eq!(
            strip_tags("Clean Title vs Another Party"),
            "Clean Title vs Another Party"
        );
    }

    #[test]
    fn test_strip_tags_normalizes_whitespace() {
        assert_eq!(strip_tags("A  <b>B</b>  C"), "A B C");
    }

    #[test]
    fn test_valid_date_passes() {
        assert_eq!(
            parse_judgment_date("2024-03-15", today()),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn test_current_year_accepted() {
        assert_eq!(
            parse_judgment_date("2026-01-15", today()),
            NaiveDate::from_ymd_opt(2026, 1, 15)
        );
    }

    #[test]
    fn test_future_year_rejected() {
        assert_eq!(parse_judgment_date("3015-03-30", today()), None);
        assert_eq!(parse_judgment_date("2205-10-03", today()), None);
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_judgment_date("", today()), None);
        assert_eq!(parse_judgment_date("not-a-date", today()), None);
        assert_eq!(parse_judgment_date("6648-09-02", today()), None);
    }
}
