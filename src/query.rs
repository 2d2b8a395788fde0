// src/query.rs

//! Search query construction.
//!
//! Builds the backend's `formInput` string from a watch configuration.
//! Entity and act terms are exact-phrase quoted; topic terms are split and
//! AND-combined with the backend's `ANDD` operator. A `fromdate:` clause is
//! always emitted: queries with open-ended date ranges are never produced.

use chrono::NaiveDate;

use crate::models::WatchKind;

/// Date format the search backend expects.
const DATE_FORMAT: &str = "%d-%m-%Y";

/// Build a query string for the search API.
///
/// `from_date` is the lower bound (the watch's last-polled date, or its
/// creation date if never polled). `to_date` is optional; omitted means
/// up to present.
pub fn build_query(
    kind: WatchKind,
    query_terms: &str,
    court_filter: &[String],
    from_date: NaiveDate,
    to_date: Option<NaiveDate>,
) -> String {
    let terms_part = match kind {
        WatchKind::Entity | WatchKind::Act => format!("\"{}\"", query_terms.trim()),
        WatchKind::Topic => topic_terms(query_terms),
    };

    let mut parts = vec![terms_part];
    if !court_filter.is_empty() {
        parts.push(format!("doctypes:{}", court_filter.join(",")));
    }
    parts.push(format!("fromdate:{}", from_date.format(DATE_FORMAT)));
    if let Some(to) = to_date {
        parts.push(format!("todate:{}", to.format(DATE_FORMAT)));
    }
    parts.join(" ")
}

/// Topic terms: comma-separated pieces each become an AND term (quoted when
/// multi-word); otherwise 1-2 words form a single term and 3+ words become
/// separate AND terms.
fn topic_terms(query_terms: &str) -> String {
    let stripped = query_terms.trim();
    if stripped.contains(',') {
        let pieces: Vec<&str> = stripped
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        return pieces
            .iter()
            .map(|t| {
                if t.contains(' ') {
                    format!("\"{t}\"")
                } else {
                    (*t).to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ANDD ");
    }

    let words: Vec<&str> = stripped.split_whitespace().collect();
    match words.len() {
        0 | 1 => stripped.to_string(),
        2 => format!("\"{stripped}\""),
        _ => words.join(" ANDD "),
    }
}
