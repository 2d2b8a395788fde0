// src/storage/mod.rs

//! Storage abstractions for watches, judgments, and matches.
//!
//! The worker owns no schema; it depends on a store exposing conditional
//! inserts ("insert, ignore if the unique constraint fires"), conditional
//! updates, and filtered queries. Uniqueness of judgments (by external id or
//! the (case number, date) composite) and of (watch, judgment) pairs is
//! enforced by the backend, never by a read-then-write sequence here.
//!
//! Two backends:
//! - `MemoryStore`: in-process, for development and testing
//! - `RestStore`: PostgREST-style HTTP backend for production

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ApiCallRecord, DeliveryStatus, JudgmentDraft, NewMatch, NotificationLogEntry, PendingMatch,
    PollRequest, PollRequestStatus, PollingMode, Watch, WatchMatch,
};

// Re-export for convenience
pub use memory::MemoryStore;
pub use rest::RestStore;

/// Outcome of a conditional judgment insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentRef {
    /// Internal row id, whether just inserted or pre-existing
    pub id: String,
    /// True when this call created the row
    pub created: bool,
}

/// Append-only sink for search API call records.
#[async_trait]
pub trait UsageLog: Send + Sync {
    /// Record one API call attempt.
    async fn record_api_call(&self, record: &ApiCallRecord) -> Result<()>;
}

/// Persistent store the polling core runs against.
#[async_trait]
pub trait Store: UsageLog + Send + Sync {
    /// All watches with the active flag set.
    async fn active_watches(&self) -> Result<Vec<Watch>>;

    /// Fetch one watch by id, active or not.
    async fn watch(&self, id: &str) -> Result<Option<Watch>>;

    /// Record a completed poll on a watch.
    async fn update_watch_poll_state(
        &self,
        id: &str,
        polled_at: DateTime<Utc>,
        result_count: u32,
    ) -> Result<()>;

    /// Conditionally insert a judgment. If a row with the same dedup key
    /// already exists the insert is a no-op and the existing row is
    /// returned. Must be atomic under concurrent writers.
    async fn upsert_judgment(&self, draft: &JudgmentDraft) -> Result<JudgmentRef>;

    /// Conditionally insert a (watch, judgment) match. Returns None when the
    /// pair already exists. Must be atomic under concurrent writers.
    async fn insert_match(&self, new: &NewMatch) -> Result<Option<WatchMatch>>;

    /// Non-destructively merge keys into a judgment's metadata bag.
    async fn merge_judgment_metadata(
        &self,
        judgment_id: &str,
        patch: &serde_json::Value,
    ) -> Result<()>;

    /// Un-notified matches below the retry cap, oldest first, joined with
    /// the judgment summary and watch name the notifier renders.
    async fn pending_matches(&self, retry_limit: u32, limit: usize) -> Result<Vec<PendingMatch>>;

    /// Mark matches delivered.
    async fn mark_matches_notified(&self, ids: &[String], at: DateTime<Utc>) -> Result<()>;

    /// Increment the retry counter on matches whose delivery failed.
    async fn bump_match_retries(&self, ids: &[String]) -> Result<()>;

    /// All matches created since the given instant, notified or not.
    async fn matches_since(&self, since: DateTime<Utc>) -> Result<Vec<PendingMatch>>;

    /// Poll requests awaiting processing, oldest first.
    async fn pending_poll_requests(&self) -> Result<Vec<PollRequest>>;

    /// Advance a poll request's status.
    async fn set_poll_request_status(&self, id: &str, status: PollRequestStatus) -> Result<()>;

    /// Read the global polling mode. Defaults to Running when unset.
    async fn polling_mode(&self) -> Result<PollingMode>;

    /// Persist the global polling mode.
    async fn set_polling_mode(&self, mode: PollingMode) -> Result<()>;

    /// Append a notification log entry (id assigned by the caller).
    async fn insert_notification_log(&self, entry: &NotificationLogEntry) -> Result<()>;

    /// Record the outcome of a notification attempt.
    async fn update_notification_log(
        &self,
        id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}
