// src/pipeline/dispatch.rs

//! Notification dispatch.
//!
//! Batches pending matches per watch (one message per watch, never one per
//! judgment), delivers over every enabled channel, and records each attempt
//! in the notification log. Matches stay un-notified until a channel
//! delivers, so the next dispatch tick naturally retries them; a retry cap
//! converts persistent failures into permanently parked, logged rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DeliveryStatus, NotificationLogEntry, NotifyConfig, PendingMatch,
};
use crate::services::{AlertMessage, Transport};
use crate::storage::Store;

/// Dispatches alerts for pending matches and the daily digest.
pub struct Notifier {
    store: Arc<dyn Store>,
    transports: Vec<Arc<dyn Transport>>,
    retry_limit: u32,
    batch_limit: usize,
    digest_enabled: bool,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn Store>,
        transports: Vec<Arc<dyn Transport>>,
        config: &NotifyConfig,
    ) -> Self {
        Self {
            store,
            transports,
            retry_limit: config.retry_limit,
            batch_limit: config.batch_limit,
            digest_enabled: config.digest.enabled,
        }
    }

    /// Deliver alerts for every watch with pending matches.
    pub async fn dispatch_pending(&self) -> Result<()> {
        if self.transports.is_empty() {
            return Ok(());
        }

        let pending = self
            .store
            .pending_matches(self.retry_limit, self.batch_limit)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }

        for (_watch_id, group) in group_by_watch(pending) {
            let watch_name = group[0].watch_name.clone();
            let match_ids: Vec<String> = group.iter().map(|m| m.match_id.clone()).collect();
            let message = render_alert(&watch_name, &group);
            // Log entries reference the match only when the batch has one
            let match_ref = (group.len() == 1).then(|| group[0].match_id.clone());

            let mut delivered = false;
            for transport in &self.transports {
                if self
                    .deliver_logged(transport.as_ref(), &message, match_ref.clone(), group[0].retry_count)
                    .await
                {
                    delivered = true;
                }
            }

            if delivered {
                self.store
                    .mark_matches_notified(&match_ids, Utc::now())
                    .await?;
                log::info!(
                    "Marked {} matches notified for {watch_name}",
                    match_ids.len()
                );
            } else {
                self.store.bump_match_retries(&match_ids).await?;
                log::warn!(
                    "All channels failed for {watch_name} ({} matches); retry counters bumped",
                    match_ids.len()
                );
            }
        }
        Ok(())
    }

    /// One combined summary of the last 24 hours across all watches,
    /// independent of the per-match notified flag (and never flipping it).
    pub async fn send_daily_digest(&self) -> Result<()> {
        if !self.digest_enabled || self.transports.is_empty() {
            return Ok(());
        }

        let since = Utc::now() - Duration::hours(24);
        let recent = self.store.matches_since(since).await?;
        if recent.is_empty() {
            return Ok(());
        }

        let total = recent.len();
        let groups = group_by_watch(recent);
        let message = render_digest(total, &groups);
        for transport in &self.transports {
            self.deliver_logged(transport.as_ref(), &message, None, 0).await;
        }
        Ok(())
    }

    /// Critical operator alert. Best-effort: failures are logged, never
    /// propagated, because the caller is already handling a fatal condition.
    pub async fn send_admin_alert(&self, subject: &str, body: &str) {
        let message = AlertMessage {
            subject: format!("[LexWatch CRITICAL] {subject}"),
            body: body.to_string(),
        };
        for transport in &self.transports {
            self.deliver_logged(transport.as_ref(), &message, None, 0).await;
        }
    }

    /// Attempt one delivery, writing the log entry before and the outcome
    /// after. Returns whether delivery succeeded.
    async fn deliver_logged(
        &self,
        transport: &dyn Transport,
        message: &AlertMessage,
        match_id: Option<String>,
        retry_count: u32,
    ) -> bool {
        let entry = NotificationLogEntry {
            id: Uuid::new_v4().to_string(),
            match_id,
            channel: transport.channel(),
            recipient: transport.recipient(),
            status: DeliveryStatus::Pending,
            error: None,
            sent_at: None,
            retry_count,
        };
        if let Err(e) = self.store.insert_notification_log(&entry).await {
            log::warn!("Failed to write notification log entry: {e}");
        }

        match transport.send(message).await {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .update_notification_log(
                        &entry.id,
                        DeliveryStatus::Sent,
                        None,
                        Some(Utc::now()),
                    )
                    .await
                {
                    log::warn!("Failed to update notification log entry: {e}");
                }
                log::info!("Sent {} alert: {}", transport.channel(), message.subject);
                true
            }
            Err(e) => {
                let detail = e.to_string();
                if let Err(log_err) = self
                    .store
                    .update_notification_log(
                        &entry.id,
                        DeliveryStatus::Failed,
                        Some(detail.clone()),
                        None,
                    )
                    .await
                {
                    log::warn!("Failed to update notification log entry: {log_err}");
                }
                log::error!("{} delivery failed: {detail}", transport.channel());
                false
            }
        }
    }
}

/// Group pending matches by watch id. BTreeMap keeps dispatch order
/// deterministic.
fn group_by_watch(matches: Vec<PendingMatch>) -> BTreeMap<String, Vec<PendingMatch>> {
    let mut groups: BTreeMap<String, Vec<PendingMatch>> = BTreeMap::new();
    for m in matches {
        groups.entry(m.watch_id.clone()).or_default().push(m);
    }
    groups
}

fn render_alert(watch_name: &str, matches: &[PendingMatch]) -> AlertMessage {
    let mut lines = vec![
        "LexWatch — Judgment Alert".to_string(),
        format!("Watch: {watch_name}"),
        format!("{} new judgment(s) matched", matches.len()),
        String::new(),
        "=".repeat(40),
        String::new(),
    ];
    for (i, m) in matches.iter().enumerate() {
        lines.push(format!(
            "  {}. {}",
            i + 1,
            m.judgment.title.as_deref().unwrap_or("Unknown")
        ));
        lines.push(format!(
            "     Court: {}",
            m.judgment.court.as_deref().unwrap_or("Unknown")
        ));
        if let Some(date) = m.judgment.judgment_date {
            lines.push(format!("     Date:  {date}"));
        }
        lines.push(format!("     Link:  {}", m.judgment.url));
        lines.push(String::new());
    }
    lines.push("=".repeat(40));

    AlertMessage {
        subject: format!(
            "[LexWatch] {watch_name}: {} new judgment(s)",
            matches.len()
        ),
        body: lines.join("\n"),
    }
}

fn render_digest(total: usize, groups: &BTreeMap<String, Vec<PendingMatch>>) -> AlertMessage {
    let mut lines = vec![
        "LexWatch — Daily Digest".to_string(),
        format!(
            "{total} judgment(s) matched across {} watch(es) in the last 24 hours",
            groups.len()
        ),
        String::new(),
    ];
    for matches in groups.values() {
        lines.push(format!("{} ({})", matches[0].watch_name, matches.len()));
        for m in matches {
            lines.push(format!(
                "  - {}",
                m.judgment.title.as_deref().unwrap_or("Unknown")
            ));
        }
        lines.push(String::new());
    }

    AlertMessage {
        subject: format!("[LexWatch] Daily digest: {total} new judgment(s)"),
        body: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Mutex;

    use crate::error::AppError;
    use crate::models::{ChannelKind, JudgmentDraft, NewMatch, Watch, WatchKind};
    use crate::storage::MemoryStore;

    /// Transport double that records or rejects deliveries.
    struct FakeTransport {
        channel: ChannelKind,
        fail: bool,
        sent: Mutex<Vec<AlertMessage>>,
    }

    impl FakeTransport {
        fn recording(channel: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail: false,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn failing(channel: ChannelKind) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail: true,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn channel(&self) -> ChannelKind {
            self.channel
        }

        fn recipient(&self) -> String {
            "test@example.com".to_string()
        }

        async fn send(&self, message: &AlertMessage) -> crate::error::Result<()> {
            if self.fail {
                return Err(AppError::notify("transport down"));
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn sample_watch(id: &str, name: &str) -> Watch {
        Watch {
            id: id.to_string(),
            name: name.to_string(),
            kind: WatchKind::Entity,
            query_terms: name.to_string(),
            court_filter: vec![],
            is_active: true,
            polling_interval_minutes: 120,
            last_polled_at: None,
            last_poll_result_count: None,
            created_at: chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    async fn seed_match(store: &MemoryStore, watch_id: &str, tid: i64) -> String {
        let judgment = store
            .upsert_judgment(&JudgmentDraft {
                external_id: Some(tid),
                title: Some(format!("Case {tid} vs State")),
                court: Some("Supreme Court".to_string()),
                judgment_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 1),
                case_number: None,
                doc_size: None,
                num_cites: None,
                headline: None,
                url: format!("https://example.org/doc/{tid}/"),
            })
            .await
            .unwrap();
        store
            .insert_match(&NewMatch {
                watch_id: watch_id.to_string(),
                judgment_id: judgment.id,
                snippet: None,
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn notifier(
        store: Arc<MemoryStore>,
        transports: Vec<Arc<dyn Transport>>,
    ) -> Notifier {
        Notifier::new(store, transports, &NotifyConfig::default())
    }

    #[tokio::test]
    async fn test_dispatch_batches_one_message_per_watch() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        seed_match(&store, "w-1", 1).await;
        seed_match(&store, "w-1", 2).await;

        let transport = FakeTransport::recording(ChannelKind::Email);
        let notifier = notifier(Arc::clone(&store), vec![transport.clone() as Arc<dyn Transport>]);
        notifier.dispatch_pending().await.unwrap();

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[LexWatch] Acme Corp: 2 new judgment(s)");
        assert!(sent[0].body.contains("Case 1 vs State"));
        assert!(sent[0].body.contains("Case 2 vs State"));
    }

    #[tokio::test]
    async fn test_dispatch_marks_notified_on_success() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        seed_match(&store, "w-1", 1).await;

        let transport = FakeTransport::recording(ChannelKind::Email);
        let notifier = notifier(Arc::clone(&store), vec![transport.clone() as Arc<dyn Transport>]);
        notifier.dispatch_pending().await.unwrap();

        let matches = store.matches().await;
        assert!(matches[0].is_notified);
        assert!(matches[0].notified_at.is_some());

        let log = store.notification_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, DeliveryStatus::Sent);
        assert!(log[0].sent_at.is_some());

        // Nothing left pending: the next dispatch sends nothing
        notifier.dispatch_pending().await.unwrap();
        assert_eq!(transport.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_leaves_unnotified_and_bumps_retries() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        seed_match(&store, "w-1", 1).await;

        let transport = FakeTransport::failing(ChannelKind::Email);
        let notifier = notifier(Arc::clone(&store), vec![transport as Arc<dyn Transport>]);
        notifier.dispatch_pending().await.unwrap();

        let matches = store.matches().await;
        assert!(!matches[0].is_notified);
        assert_eq!(matches[0].retry_count, 1);

        let log = store.notification_log().await;
        assert_eq!(log[0].status, DeliveryStatus::Failed);
        assert!(log[0].error.is_some());
    }

    #[tokio::test]
    async fn test_retry_cap_parks_matches() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        seed_match(&store, "w-1", 1).await;

        let notifier = notifier(Arc::clone(&store), vec![FakeTransport::failing(ChannelKind::Email) as Arc<dyn Transport>]);
        for _ in 0..4 {
            notifier.dispatch_pending().await.unwrap();
        }

        // Three attempts hit the cap; the fourth selects nothing
        let matches = store.matches().await;
        assert_eq!(matches[0].retry_count, 3);
        assert!(!matches[0].is_notified);
        assert_eq!(store.notification_log().await.len(), 3);
    }

    #[tokio::test]
    async fn test_one_failing_watch_does_not_block_another() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        store.insert_watch(sample_watch("w-2", "Beta Ltd")).await;
        seed_match(&store, "w-1", 1).await;
        let beta_match = seed_match(&store, "w-2", 2).await;

        let transport = FakeTransport::recording(ChannelKind::Email);
        let notifier = notifier(Arc::clone(&store), vec![transport.clone() as Arc<dyn Transport>]);
        notifier.dispatch_pending().await.unwrap();

        // Both watches alerted; mark w-2 as if its later delivery failed:
        // already-notified matches must not be re-selected next run
        assert_eq!(transport.sent.lock().await.len(), 2);
        let matches = store.matches().await;
        assert!(matches.iter().all(|m| m.is_notified));
        assert!(matches.iter().any(|m| m.id == beta_match));

        notifier.dispatch_pending().await.unwrap();
        assert_eq!(transport.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_any_channel_success_marks_notified() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        seed_match(&store, "w-1", 1).await;

        let email = FakeTransport::failing(ChannelKind::Email);
        let slack = FakeTransport::recording(ChannelKind::Slack);
        let notifier = notifier(Arc::clone(&store), vec![email as Arc<dyn Transport>, slack.clone()]);
        notifier.dispatch_pending().await.unwrap();

        let matches = store.matches().await;
        assert!(matches[0].is_notified);
        assert_eq!(matches[0].retry_count, 0);
        assert_eq!(slack.sent.lock().await.len(), 1);

        // Both attempts audited, one failed one sent
        let log = store.notification_log().await;
        assert_eq!(log.len(), 2);
        assert!(log.iter().any(|e| e.status == DeliveryStatus::Failed));
        assert!(log.iter().any(|e| e.status == DeliveryStatus::Sent));
    }

    #[tokio::test]
    async fn test_digest_includes_notified_matches_without_flipping_flags() {
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1", "Acme Corp")).await;
        let match_id = seed_match(&store, "w-1", 1).await;
        store
            .mark_matches_notified(&[match_id], Utc::now())
            .await
            .unwrap();
        seed_match(&store, "w-1", 2).await;

        let transport = FakeTransport::recording(ChannelKind::Email);
        let notifier = notifier(Arc::clone(&store), vec![transport.clone() as Arc<dyn Transport>]);
        notifier.send_daily_digest().await.unwrap();

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[LexWatch] Daily digest: 2 new judgment(s)");

        // The digest is informational: the un-notified match stays pending
        let matches = store.matches().await;
        assert_eq!(matches.iter().filter(|m| m.is_notified).count(), 1);
    }

    #[tokio::test]
    async fn test_admin_alert_never_fails() {
        let store = Arc::new(MemoryStore::new());
        let notifier = notifier(
            Arc::clone(&store),
            vec![FakeTransport::failing(ChannelKind::Email) as Arc<dyn Transport>],
        );
        // Must not panic or error even with a dead transport
        notifier
            .send_admin_alert("Search API Authentication Failure", "Polling paused.")
            .await;

        let log = store.notification_log().await;
        assert_eq!(log[0].status, DeliveryStatus::Failed);
    }
}
