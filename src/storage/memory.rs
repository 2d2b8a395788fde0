// src/storage/memory.rs

//! In-memory store for development and testing.
//!
//! All state lives behind one `RwLock`, so each write is a single critical
//! section: the dedup-index check and the insert happen under the same lock,
//! which gives the conditional-insert operations the atomicity the matcher
//! relies on.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    ApiCallRecord, DedupKey, DeliveryStatus, Judgment, JudgmentDraft, JudgmentSummary, NewMatch,
    NotificationLogEntry, PendingMatch, PollRequest, PollRequestStatus, PollingMode, Watch,
    WatchMatch,
};
use crate::storage::{JudgmentRef, Store, UsageLog};

#[derive(Default)]
struct Inner {
    watches: HashMap<String, Watch>,
    judgments: HashMap<String, Judgment>,
    dedup_index: HashMap<DedupKey, String>,
    matches: HashMap<String, WatchMatch>,
    pair_index: HashSet<(String, String)>,
    poll_requests: Vec<PollRequest>,
    notification_log: Vec<NotificationLogEntry>,
    api_calls: Vec<ApiCallRecord>,
    mode: Option<PollingMode>,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a watch. Dev/test helper; production watches come from the
    /// operator-facing surface, not this worker.
    pub async fn insert_watch(&self, watch: Watch) {
        self.inner.write().await.watches.insert(watch.id.clone(), watch);
    }

    /// Seed a poll request.
    pub async fn insert_poll_request(&self, request: PollRequest) {
        self.inner.write().await.poll_requests.push(request);
    }

    pub async fn judgments(&self) -> Vec<Judgment> {
        self.inner.read().await.judgments.values().cloned().collect()
    }

    pub async fn matches(&self) -> Vec<WatchMatch> {
        self.inner.read().await.matches.values().cloned().collect()
    }

    pub async fn poll_requests(&self) -> Vec<PollRequest> {
        self.inner.read().await.poll_requests.clone()
    }

    pub async fn api_calls(&self) -> Vec<ApiCallRecord> {
        self.inner.read().await.api_calls.clone()
    }

    pub async fn notification_log(&self) -> Vec<NotificationLogEntry> {
        self.inner.read().await.notification_log.clone()
    }

    fn pending_view(inner: &Inner, m: &WatchMatch) -> Option<PendingMatch> {
        let judgment = inner.judgments.get(&m.judgment_id)?;
        let watch_name = inner
            .watches
            .get(&m.watch_id)
            .map(|w| w.name.clone())
            .unwrap_or_else(|| "Unknown Watch".to_string());
        Some(PendingMatch {
            match_id: m.id.clone(),
            watch_id: m.watch_id.clone(),
            watch_name,
            judgment: JudgmentSummary {
                id: judgment.id.clone(),
                title: judgment.title.clone(),
                court: judgment.court.clone(),
                judgment_date: judgment.judgment_date,
                url: judgment.url.clone(),
            },
            retry_count: m.retry_count,
        })
    }
}

#[async_trait]
impl UsageLog for MemoryStore {
    async fn record_api_call(&self, record: &ApiCallRecord) -> Result<()> {
        self.inner.write().await.api_calls.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_watches(&self) -> Result<Vec<Watch>> {
        let inner = self.inner.read().await;
        let mut watches: Vec<Watch> = inner
            .watches
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect();
        watches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(watches)
    }

    async fn watch(&self, id: &str) -> Result<Option<Watch>> {
        Ok(self.inner.read().await.watches.get(id).cloned())
    }

    async fn update_watch_poll_state(
        &self,
        id: &str,
        polled_at: DateTime<Utc>,
        result_count: u32,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let watch = inner
            .watches
            .get_mut(id)
            .ok_or_else(|| AppError::store(format!("watch {id} not found")))?;
        watch.last_polled_at = Some(polled_at);
        watch.last_poll_result_count = Some(result_count);
        Ok(())
    }

    async fn upsert_judgment(&self, draft: &JudgmentDraft) -> Result<JudgmentRef> {
        let mut inner = self.inner.write().await;

        let key = draft.dedup_key();
        if let Some(key) = &key {
            if let Some(existing) = inner.dedup_index.get(key) {
                return Ok(JudgmentRef {
                    id: existing.clone(),
                    created: false,
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let judgment = Judgment {
            id: id.clone(),
            external_id: draft.external_id,
            title: draft.title.clone(),
            court: draft.court.clone(),
            judgment_date: draft.judgment_date,
            case_number: draft.case_number.clone(),
            doc_size: draft.doc_size,
            num_cites: draft.num_cites,
            headline: draft.headline.clone(),
            url: draft.url.clone(),
            metadata: serde_json::Value::Object(Default::default()),
            first_seen_at: Utc::now(),
        };
        inner.judgments.insert(id.clone(), judgment);
        if let Some(key) = key {
            inner.dedup_index.insert(key, id.clone());
        }
        Ok(JudgmentRef { id, created: true })
    }

    async fn insert_match(&self, new: &NewMatch) -> Result<Option<WatchMatch>> {
        let mut inner = self.inner.write().await;

        let pair = (new.watch_id.clone(), new.judgment_id.clone());
        if !inner.pair_index.insert(pair) {
            return Ok(None);
        }

        let created = WatchMatch {
            id: Uuid::new_v4().to_string(),
            watch_id: new.watch_id.clone(),
            judgment_id: new.judgment_id.clone(),
            matched_at: Utc::now(),
            relevance_score: None,
            snippet: new.snippet.clone(),
            is_notified: false,
            notified_at: None,
            retry_count: 0,
        };
        inner.matches.insert(created.id.clone(), created.clone());
        Ok(Some(created))
    }

    async fn merge_judgment_metadata(
        &self,
        judgment_id: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let judgment = inner
            .judgments
            .get_mut(judgment_id)
            .ok_or_else(|| AppError::store(format!("judgment {judgment_id} not found")))?;
        if let (Some(bag), Some(additions)) =
            (judgment.metadata.as_object_mut(), patch.as_object())
        {
            for (k, v) in additions {
                bag.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn pending_matches(&self, retry_limit: u32, limit: usize) -> Result<Vec<PendingMatch>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<&WatchMatch> = inner
            .matches
            .values()
            .filter(|m| !m.is_notified && m.retry_count < retry_limit)
            .collect();
        pending.sort_by(|a, b| a.matched_at.cmp(&b.matched_at).then(a.id.cmp(&b.id)));
        Ok(pending
            .into_iter()
            .take(limit)
            .filter_map(|m| Self::pending_view(&inner, m))
            .collect())
    }

    async fn mark_matches_notified(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(m) = inner.matches.get_mut(id) {
                m.is_notified = true;
                m.notified_at = Some(at);
            }
        }
        Ok(())
    }

    async fn bump_match_retries(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(m) = inner.matches.get_mut(id) {
                m.retry_count += 1;
            }
        }
        Ok(())
    }

    async fn matches_since(&self, since: DateTime<Utc>) -> Result<Vec<PendingMatch>> {
        let inner = self.inner.read().await;
        let mut recent: Vec<&WatchMatch> = inner
            .matches
            .values()
            .filter(|m| m.matched_at >= since)
            .collect();
        recent.sort_by(|a, b| a.matched_at.cmp(&b.matched_at).then(a.id.cmp(&b.id)));
        Ok(recent
            .into_iter()
            .filter_map(|m| Self::pending_view(&inner, m))
            .collect())
    }

    async fn pending_poll_requests(&self) -> Result<Vec<PollRequest>> {
        let inner = self.inner.read().await;
        Ok(inner
            .poll_requests
            .iter()
            .filter(|r| r.status == PollRequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_poll_request_status(&self, id: &str, status: PollRequestStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .poll_requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::store(format!("poll request {id} not found")))?;
        request.status = status;
        Ok(())
    }

    async fn polling_mode(&self) -> Result<PollingMode> {
        Ok(self.inner.read().await.mode.unwrap_or(PollingMode::Running))
    }

    async fn set_polling_mode(&self, mode: PollingMode) -> Result<()> {
        self.inner.write().await.mode = Some(mode);
        Ok(())
    }

    async fn insert_notification_log(&self, entry: &NotificationLogEntry) -> Result<()> {
        self.inner.write().await.notification_log.push(entry.clone());
        Ok(())
    }

    async fn update_notification_log(
        &self,
        id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .notification_log
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::store(format!("notification log entry {id} not found")))?;
        entry.status = status;
        entry.error = error;
        entry.sent_at = sent_at;
        Ok(())
    }
}
