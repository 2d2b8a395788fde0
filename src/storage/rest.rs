// src/storage/rest.rs

//! REST storage backend.
//!
//! Speaks PostgREST conventions against a hosted Postgres service. Uniqueness
//! is enforced by database constraints; conditional inserts use
//! `on_conflict` plus `Prefer: resolution=ignore-duplicates`, so a duplicate
//! insert returns an empty representation instead of an error and the
//! check-and-insert race cannot occur.
//!
//! ## Expected tables
//!
//! ```text
//! watches            (id, name, watch_type, query_terms, court_filter, is_active,
//!                     polling_interval_minutes, last_polled_at,
//!                     last_poll_result_count, created_at)
//! judgments          (id, external_id UNIQUE, title, court, judgment_date,
//!                     case_number, doc_size, num_cites, headline, url,
//!                     metadata, first_seen_at,
//!                     UNIQUE (case_number, judgment_date))
//! watch_matches      (id, watch_id, judgment_id, matched_at, relevance_score,
//!                     snippet, is_notified, notified_at, retry_count,
//!                     UNIQUE (watch_id, judgment_id))
//! poll_requests      (id, watch_id, status, created_at)
//! notification_log   (id, match_id, channel, recipient, status, error,
//!                     sent_at, retry_count)
//! api_call_log       (endpoint, request_url, watch_id, http_status,
//!                     result_count, response_time_ms, error_message, called_at)
//! worker_state       (key UNIQUE, value)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{
    ApiCallRecord, DedupKey, DeliveryStatus, JudgmentDraft, JudgmentSummary, NewMatch,
    NotificationLogEntry, PendingMatch, PollRequest, PollRequestStatus, PollingMode, RestConfig,
    Watch, WatchMatch,
};
use crate::storage::{JudgmentRef, Store, UsageLog};

const POLLING_MODE_KEY: &str = "polling_mode";

/// PostgREST-backed storage.
#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
}

/// Match row with the embedded resources the notifier needs.
#[derive(Debug, Deserialize)]
struct JoinedMatchRow {
    #[serde(flatten)]
    row: WatchMatch,
    judgments: Option<JudgmentSummary>,
    watches: Option<WatchNameRow>,
}

#[derive(Debug, Deserialize)]
struct WatchNameRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StateRow {
    value: String,
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    metadata: Option<serde_json::Value>,
}

impl RestStore {
    /// Build a store from config. The service key is sent both as `apikey`
    /// and as a bearer token, as the hosted service expects.
    pub fn new(config: &RestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|e| AppError::config(format!("invalid service key: {e}")))?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|e| AppError::config(format!("invalid service key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::store(format!("store returned {status}: {body}")))
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let response = self.http.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Conditional insert returning the representation, or an empty vec when
    /// the unique constraint absorbed the row.
    async fn insert_ignore_duplicates<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<T>> {
        let response = self
            .http
            .post(url)
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn patch(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        let response = self.http.patch(url).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    fn draft_body(draft: &JudgmentDraft) -> serde_json::Value {
        json!({
            "external_id": draft.external_id,
            "title": draft.title,
            "court": draft.court,
            "judgment_date": draft.judgment_date,
            "case_number": draft.case_number,
            "doc_size": draft.doc_size,
            "num_cites": draft.num_cites,
            "headline": draft.headline,
            "url": draft.url,
            "metadata": {},
        })
    }

    fn joined_select() -> &'static str {
        "select=*,judgments(id,title,court,judgment_date,url),watches(name)"
    }

    fn to_pending(rows: Vec<JoinedMatchRow>) -> Vec<PendingMatch> {
        rows.into_iter()
            .filter_map(|r| {
                let judgment = r.judgments?;
                Some(PendingMatch {
                    match_id: r.row.id,
                    watch_id: r.row.watch_id,
                    watch_name: r
                        .watches
                        .map(|w| w.name)
                        .unwrap_or_else(|| "Unknown Watch".to_string()),
                    judgment,
                    retry_count: r.row.retry_count,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UsageLog for RestStore {
    async fn record_api_call(&self, record: &ApiCallRecord) -> Result<()> {
        let response = self
            .http
            .post(self.table_url("api_call_log"))
            .json(record)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for RestStore {
    async fn active_watches(&self) -> Result<Vec<Watch>> {
        let url = format!(
            "{}?is_active=eq.true&select=*&order=created_at.asc",
            self.table_url("watches")
        );
        self.get_rows(&url).await
    }

    async fn watch(&self, id: &str) -> Result<Option<Watch>> {
        let url = format!("{}?id=eq.{id}&select=*", self.table_url("watches"));
        let mut rows: Vec<Watch> = self.get_rows(&url).await?;
        Ok(rows.drain(..).next())
    }

    async fn update_watch_poll_state(
        &self,
        id: &str,
        polled_at: DateTime<Utc>,
        result_count: u32,
    ) -> Result<()> {
        let url = format!("{}?id=eq.{id}", self.table_url("watches"));
        self.patch(
            &url,
            &json!({
                "last_polled_at": polled_at,
                "last_poll_result_count": result_count,
            }),
        )
        .await
    }

    async fn upsert_judgment(&self, draft: &JudgmentDraft) -> Result<JudgmentRef> {
        let base = self.table_url("judgments");
        let body = Self::draft_body(draft);

        let Some(key) = draft.dedup_key() else {
            // No dedup identity: a plain insert, always new.
            let response = self
                .http
                .post(&base)
                .header("Prefer", "return=representation")
                .json(&body)
                .send()
                .await?;
            let mut rows: Vec<IdRow> = Self::check(response).await?.json().await?;
            let row = rows
                .drain(..)
                .next()
                .ok_or_else(|| AppError::store("insert returned no representation"))?;
            return Ok(JudgmentRef {
                id: row.id,
                created: true,
            });
        };

        let (conflict_target, resolve_filter) = match &key {
            DedupKey::External(id) => ("external_id".to_string(), format!("external_id=eq.{id}")),
            DedupKey::Composite(case, date) => (
                "case_number,judgment_date".to_string(),
                format!("case_number=eq.{case}&judgment_date=eq.{date}"),
            ),
        };

        let url = format!("{base}?on_conflict={conflict_target}");
        let mut rows: Vec<IdRow> = self.insert_ignore_duplicates(&url, &body).await?;
        if let Some(row) = rows.drain(..).next() {
            return Ok(JudgmentRef {
                id: row.id,
                created: true,
            });
        }

        // Constraint absorbed the insert; resolve the existing row.
        let lookup = format!("{base}?{resolve_filter}&select=id");
        let mut existing: Vec<IdRow> = self.get_rows(&lookup).await?;
        let row = existing
            .drain(..)
            .next()
            .ok_or_else(|| AppError::store("conflicting judgment row not found"))?;
        Ok(JudgmentRef {
            id: row.id,
            created: false,
        })
    }

    async fn insert_match(&self, new: &NewMatch) -> Result<Option<WatchMatch>> {
        let url = format!(
            "{}?on_conflict=watch_id,judgment_id",
            self.table_url("watch_matches")
        );
        let body = json!({
            "watch_id": new.watch_id,
            "judgment_id": new.judgment_id,
            "snippet": new.snippet,
            "is_notified": false,
            "retry_count": 0,
        });
        let mut rows: Vec<WatchMatch> = self.insert_ignore_duplicates(&url, &body).await?;
        Ok(rows.drain(..).next())
    }

    async fn merge_judgment_metadata(
        &self,
        judgment_id: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        let base = self.table_url("judgments");
        let lookup = format!("{base}?id=eq.{judgment_id}&select=metadata");
        let mut rows: Vec<MetadataRow> = self.get_rows(&lookup).await?;
        let mut bag = rows
            .drain(..)
            .next()
            .and_then(|r| r.metadata)
            .unwrap_or_else(|| json!({}));
        if let (Some(map), Some(additions)) = (bag.as_object_mut(), patch.as_object()) {
            for (k, v) in additions {
                map.insert(k.clone(), v.clone());
            }
        }
        self.patch(
            &format!("{base}?id=eq.{judgment_id}"),
            &json!({ "metadata": bag }),
        )
        .await
    }

    async fn pending_matches(&self, retry_limit: u32, limit: usize) -> Result<Vec<PendingMatch>> {
        let url = format!(
            "{}?is_notified=eq.false&retry_count=lt.{retry_limit}&order=matched_at.asc&limit={limit}&{}",
            self.table_url("watch_matches"),
            Self::joined_select(),
        );
        let rows: Vec<JoinedMatchRow> = self.get_rows(&url).await?;
        Ok(Self::to_pending(rows))
    }

    async fn mark_matches_notified(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}?id=in.({})",
            self.table_url("watch_matches"),
            ids.join(",")
        );
        self.patch(&url, &json!({ "is_notified": true, "notified_at": at }))
            .await
    }

    async fn bump_match_retries(&self, ids: &[String]) -> Result<()> {
        // PostgREST has no atomic increment; read the current counters and
        // write them back individually. Retry counters only ever grow, so a
        // lost increment merely delays the cap by one cycle.
        for id in ids {
            let url = format!(
                "{}?id=eq.{id}&select=retry_count",
                self.table_url("watch_matches")
            );
            #[derive(Deserialize)]
            struct RetryRow {
                retry_count: u32,
            }
            let mut rows: Vec<RetryRow> = self.get_rows(&url).await?;
            let Some(row) = rows.drain(..).next() else {
                continue;
            };
            self.patch(
                &format!("{}?id=eq.{id}", self.table_url("watch_matches")),
                &json!({ "retry_count": row.retry_count + 1 }),
            )
            .await?;
        }
        Ok(())
    }

    async fn matches_since(&self, since: DateTime<Utc>) -> Result<Vec<PendingMatch>> {
        let url = format!(
            "{}?matched_at=gte.{}&order=matched_at.asc&{}",
            self.table_url("watch_matches"),
            since.to_rfc3339(),
            Self::joined_select(),
        );
        let rows: Vec<JoinedMatchRow> = self.get_rows(&url).await?;
        Ok(Self::to_pending(rows))
    }

    async fn pending_poll_requests(&self) -> Result<Vec<PollRequest>> {
        let url = format!(
            "{}?status=eq.pending&select=*&order=created_at.asc",
            self.table_url("poll_requests")
        );
        self.get_rows(&url).await
    }

    async fn set_poll_request_status(&self, id: &str, status: PollRequestStatus) -> Result<()> {
        let url = format!("{}?id=eq.{id}", self.table_url("poll_requests"));
        self.patch(&url, &json!({ "status": status })).await
    }

    async fn polling_mode(&self) -> Result<PollingMode> {
        let url = format!(
            "{}?key=eq.{POLLING_MODE_KEY}&select=value",
            self.table_url("worker_state")
        );
        let mut rows: Vec<StateRow> = self.get_rows(&url).await?;
        match rows.drain(..).next() {
            Some(row) if row.value == "paused" => Ok(PollingMode::Paused),
            _ => Ok(PollingMode::Running),
        }
    }

    async fn set_polling_mode(&self, mode: PollingMode) -> Result<()> {
        let value = match mode {
            PollingMode::Running => "running",
            PollingMode::Paused => "paused",
        };
        let url = format!("{}?on_conflict=key", self.table_url("worker_state"));
        let response = self
            .http
            .post(&url)
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "key": POLLING_MODE_KEY, "value": value }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert_notification_log(&self, entry: &NotificationLogEntry) -> Result<()> {
        let response = self
            .http
            .post(self.table_url("notification_log"))
            .json(entry)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_notification_log(
        &self,
        id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let url = format!("{}?id=eq.{id}", self.table_url("notification_log"));
        self.patch(
            &url,
            &json!({ "status": status, "error": error, "sent_at": sent_at }),
        )
        .await
    }
}
