// src/models/watch.rs

//! Watch data structure.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Floor for the polling interval. Values below this are clamped, not
/// rejected.
pub const MIN_POLL_INTERVAL_MINUTES: u32 = 120;

/// What a watch monitors, which drives how its query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    /// A named party (company, person). Exact-phrase matching.
    Entity,
    /// A legal topic. Terms are AND-combined.
    Topic,
    /// A statute. Exact-phrase matching.
    Act,
}

/// A standing monitor that generates periodic search queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub id: String,

    /// Human-readable name, used in alert subjects
    pub name: String,

    #[serde(rename = "watch_type")]
    pub kind: WatchKind,

    /// Raw search terms as entered by the operator
    pub query_terms: String,

    /// Court codes to restrict the search to (empty = all courts)
    #[serde(default)]
    pub court_filter: Vec<String>,

    pub is_active: bool,

    pub polling_interval_minutes: u32,

    pub last_polled_at: Option<DateTime<Utc>>,

    pub last_poll_result_count: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl Watch {
    /// Polling interval with the floor applied.
    pub fn effective_interval_minutes(&self) -> u32 {
        self.polling_interval_minutes.max(MIN_POLL_INTERVAL_MINUTES)
    }

    /// Lower-bound date for the next query: last successful poll, or the
    /// watch's creation date if it has never been polled. Open-ended date
    /// ranges are never produced.
    pub fn query_floor_date(&self) -> NaiveDate {
        self.last_polled_at.unwrap_or(self.created_at).date_naive()
    }

    /// Whether the polling interval has elapsed since the last poll.
    pub fn interval_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_polled_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_minutes() >= i64::from(self.effective_interval_minutes())
            }
        }
    }
}

/// Global polling mode. Persisted in the store so a pause survives process
/// restarts and is visible to every timer, including the on-demand handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingMode {
    Running,
    Paused,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_watch() -> Watch {
        Watch {
            id: "w-1".to_string(),
            name: "Acme Corp".to_string(),
            kind: WatchKind::Entity,
            query_terms: "Acme Corp".to_string(),
            court_filter: vec![],
            is_active: true,
            polling_interval_minutes: 120,
            last_polled_at: None,
            last_poll_result_count: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_interval_floor() {
        let mut watch = sample_watch();
        watch.polling_interval_minutes = 15;
        assert_eq!(watch.effective_interval_minutes(), 120);

        watch.polling_interval_minutes = 480;
        assert_eq!(watch.effective_interval_minutes(), 480);
    }

    #[test]
    fn test_query_floor_date_never_polled() {
        let watch = sample_watch();
        assert_eq!(
            watch.query_floor_date(),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_query_floor_date_after_poll() {
        let mut watch = sample_watch();
        watch.last_polled_at = Some(Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap());
        assert_eq!(
            watch.query_floor_date(),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
        );
    }

    #[test]
    fn test_interval_elapsed() {
        let mut watch = sample_watch();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        // Never polled -> always due
        assert!(watch.interval_elapsed(now));

        // Polled 1 hour ago with a 2 hour interval -> not due
        watch.last_polled_at = Some(now - chrono::Duration::hours(1));
        assert!(!watch.interval_elapsed(now));

        // Polled 3 hours ago -> due
        watch.last_polled_at = Some(now - chrono::Duration::hours(3));
        assert!(watch.interval_elapsed(now));
    }

    #[test]
    fn test_kind_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&WatchKind::Entity).unwrap(),
            "\"entity\""
        );
        let kind: WatchKind = serde_json::from_str("\"act\"").unwrap();
        assert_eq!(kind, WatchKind::Act);
    }
}
