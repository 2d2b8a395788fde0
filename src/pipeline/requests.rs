// src/pipeline/requests.rs

//! On-demand "poll now" queue.
//!
//! A lightweight second consumer of the same single-watch pipeline, driven
//! by operator-created poll requests instead of the interval schedule. The
//! forced poll updates `last_polled_at` exactly like a scheduled one, which
//! pushes the watch's next scheduled poll further out; accepted behavior.

use crate::error::Result;
use crate::models::{PollRequestStatus, PollingMode};
use crate::pipeline::poll::PollEngine;
use crate::storage::Store;

/// Process every pending poll request.
///
/// Requests progress pending -> processing -> done | failed, and a failure
/// on one request never blocks the rest. While polling is paused the whole
/// check is a no-op and requests stay pending.
pub async fn check_poll_requests(store: &dyn Store, engine: &PollEngine) -> Result<()> {
    if store.polling_mode().await? == PollingMode::Paused {
        log::debug!("Polling is paused; leaving poll requests pending.");
        return Ok(());
    }

    let requests = store.pending_poll_requests().await?;
    for request in requests {
        if let Err(e) = store
            .set_poll_request_status(&request.id, PollRequestStatus::Processing)
            .await
        {
            log::error!("Failed to claim poll request {}: {e}", request.id);
            continue;
        }

        let watch = match store.watch(&request.watch_id).await {
            Ok(Some(watch)) => watch,
            Ok(None) => {
                log::warn!(
                    "Poll request {} targets unknown watch {}",
                    request.id,
                    request.watch_id
                );
                finish(store, &request.id, PollRequestStatus::Failed).await;
                continue;
            }
            Err(e) => {
                log::error!("Failed to load watch for poll request {}: {e}", request.id);
                finish(store, &request.id, PollRequestStatus::Failed).await;
                continue;
            }
        };

        // The interval check is skipped here: this is the operator
        // saying "now".
        match engine.poll_watch(&watch).await {
            Ok(matches) => {
                log::info!(
                    "On-demand poll of watch {} complete ({} new match(es))",
                    watch.name,
                    matches.len()
                );
                finish(store, &request.id, PollRequestStatus::Done).await;
            }
            Err(e) if e.is_auth() => {
                engine.handle_auth_failure().await;
                finish(store, &request.id, PollRequestStatus::Failed).await;
                break;
            }
            Err(e) => {
                log::error!("On-demand poll of watch {} failed: {e}", watch.id);
                finish(store, &request.id, PollRequestStatus::Failed).await;
            }
        }
    }
    Ok(())
}

async fn finish(store: &dyn Store, request_id: &str, status: PollRequestStatus) {
    if let Err(e) = store.set_poll_request_status(request_id, status).await {
        log::error!("Failed to update poll request {request_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::{Config, PollRequest, Watch, WatchKind};
    use crate::pipeline::dispatch::Notifier;
    use crate::services::SearchClient;
    use crate::storage::MemoryStore;

    fn sample_watch(id: &str) -> Watch {
        Watch {
            id: id.to_string(),
            name: format!("Watch {id}"),
            kind: WatchKind::Entity,
            query_terms: "Acme Corp".to_string(),
            court_filter: vec![],
            is_active: true,
            polling_interval_minutes: 120,
            // Polled moments ago: a scheduled cycle would skip this watch
            last_polled_at: Some(Utc::now()),
            last_poll_result_count: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn request(id: &str, watch_id: &str) -> PollRequest {
        PollRequest {
            id: id.to_string(),
            watch_id: watch_id.to_string(),
            status: PollRequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn engine_for(server: &MockServer, store: Arc<MemoryStore>) -> PollEngine {
        let mut config = Config::default();
        config.search.base_url = server.uri();
        config.search.api_token = "token".to_string();
        config.search.max_attempts = 1;
        config.search.rate_limit_gap_ms = 1;
        let config = Arc::new(config);

        let client = Arc::new(
            SearchClient::new(
                &config.search,
                Arc::clone(&store) as Arc<dyn crate::storage::UsageLog>,
            )
            .unwrap(),
        );
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&store) as Arc<dyn Store>,
            vec![],
            &config.notify,
        ));
        PollEngine::new(store, client, notifier, config)
    }

    #[tokio::test]
    async fn test_pending_request_polled_to_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "docs": [ { "tid": 1, "title": "Case 1" } ],
                "found": 1,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1")).await;
        store.insert_poll_request(request("pr-1", "w-1")).await;
        let engine = engine_for(&server, Arc::clone(&store));

        check_poll_requests(store.as_ref(), &engine).await.unwrap();

        let requests = store.poll_requests().await;
        assert_eq!(requests[0].status, PollRequestStatus::Done);
        // The forced poll bypassed the interval check and recorded the match
        assert_eq!(store.matches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_watch_marks_failed() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        store.insert_poll_request(request("pr-1", "missing")).await;
        let engine = engine_for(&server, Arc::clone(&store));

        check_poll_requests(store.as_ref(), &engine).await.unwrap();

        let requests = store.poll_requests().await;
        assert_eq!(requests[0].status, PollRequestStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_poll_marks_failed_but_continues() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1")).await;
        store.insert_watch(sample_watch("w-2")).await;
        store.insert_poll_request(request("pr-1", "w-1")).await;
        store.insert_poll_request(request("pr-2", "w-2")).await;
        let engine = engine_for(&server, Arc::clone(&store));

        check_poll_requests(store.as_ref(), &engine).await.unwrap();

        let requests = store.poll_requests().await;
        assert!(requests
            .iter()
            .all(|r| r.status == PollRequestStatus::Failed));
    }

    #[tokio::test]
    async fn test_paused_mode_leaves_requests_pending() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1")).await;
        store.insert_poll_request(request("pr-1", "w-1")).await;
        store
            .set_polling_mode(PollingMode::Paused)
            .await
            .unwrap();
        let engine = engine_for(&server, Arc::clone(&store));

        check_poll_requests(store.as_ref(), &engine).await.unwrap();

        let requests = store.poll_requests().await;
        assert_eq!(requests[0].status, PollRequestStatus::Pending);
        assert!(store.api_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_pauses_and_stops_queue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store.insert_watch(sample_watch("w-1")).await;
        store.insert_watch(sample_watch("w-2")).await;
        store.insert_poll_request(request("pr-1", "w-1")).await;
        store.insert_poll_request(request("pr-2", "w-2")).await;
        let engine = engine_for(&server, Arc::clone(&store));

        check_poll_requests(store.as_ref(), &engine).await.unwrap();

        assert_eq!(
            store.polling_mode().await.unwrap(),
            PollingMode::Paused
        );
        let requests = store.poll_requests().await;
        assert_eq!(requests[0].status, PollRequestStatus::Failed);
        // The second request was never attempted
        assert_eq!(requests[1].status, PollRequestStatus::Pending);
    }
}
