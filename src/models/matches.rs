// src/models/matches.rs

//! Watch-match data structures.
//!
//! A match records that a specific watch's query surfaced a specific
//! judgment. The pair is unique forever: re-surfacing the same judgment on a
//! later poll never creates a second row, which is what keeps alerts
//! exactly-once per (watch, judgment).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A stored (watch, judgment) match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchMatch {
    pub id: String,
    pub watch_id: String,
    pub judgment_id: String,
    pub matched_at: DateTime<Utc>,

    /// Reserved. No scoring algorithm is implemented; always None.
    pub relevance_score: Option<f64>,

    /// Copy of the headline at match time
    pub snippet: Option<String>,

    pub is_notified: bool,
    pub notified_at: Option<DateTime<Utc>>,

    /// Failed delivery attempts so far
    pub retry_count: u32,
}

/// Fields for a match about to be conditionally inserted.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub watch_id: String,
    pub judgment_id: String,
    pub snippet: Option<String>,
}

/// Compact judgment fields carried into notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentSummary {
    pub id: String,
    pub title: Option<String>,
    pub court: Option<String>,
    pub judgment_date: Option<NaiveDate>,
    pub url: String,
}

/// An un-notified match joined with what the notifier needs to render it.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub match_id: String,
    pub watch_id: String,
    pub watch_name: String,
    pub judgment: JudgmentSummary,
    pub retry_count: u32,
}
