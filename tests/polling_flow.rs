// tests/polling_flow.rs

//! End-to-end polling flow: search backend -> matcher -> store -> alerts,
//! with the search API and the Slack webhook both mocked at the HTTP layer.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lexwatch::models::{Config, SlackConfig, Watch, WatchKind};
use lexwatch::pipeline::{Notifier, PollEngine};
use lexwatch::services::{SearchClient, SlackTransport, Transport};
use lexwatch::storage::{MemoryStore, Store, UsageLog};

fn watch(id: &str, name: &str, terms: &str) -> Watch {
    Watch {
        id: id.to_string(),
        name: name.to_string(),
        kind: WatchKind::Entity,
        query_terms: terms.to_string(),
        court_filter: vec![],
        is_active: true,
        polling_interval_minutes: 120,
        last_polled_at: None,
        last_poll_result_count: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn doc_json(tid: i64, title: &str) -> serde_json::Value {
    serde_json::json!({
        "tid": tid,
        "title": title,
        "docsource": "Supreme Court of India",
        "publishdate": "2026-02-01",
        "headline": "...",
        "numcites": 1,
        "docsize": 10_000,
    })
}

struct Harness {
    store: Arc<MemoryStore>,
    engine: PollEngine,
    notifier: Arc<Notifier>,
}

fn harness(api: &MockServer, hooks: &MockServer) -> Harness {
    let mut config = Config::default();
    config.search.base_url = api.uri();
    config.search.api_token = "token".to_string();
    config.search.max_attempts = 1;
    config.search.rate_limit_gap_ms = 1;
    let config = Arc::new(config);

    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(
        SearchClient::new(&config.search, Arc::clone(&store) as Arc<dyn UsageLog>).unwrap(),
    );
    let slack = Arc::new(
        SlackTransport::new(&SlackConfig {
            enabled: true,
            webhook_url: format!("{}/hook", hooks.uri()),
        })
        .unwrap(),
    );
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&store) as Arc<dyn Store>,
        vec![slack as Arc<dyn Transport>],
        &config.notify,
    ));
    let engine = PollEngine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        client,
        Arc::clone(&notifier),
        config,
    );

    Harness {
        store,
        engine,
        notifier,
    }
}

async fn webhook_post_count(hooks: &MockServer) -> usize {
    hooks
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/hook")
        .count()
}

#[tokio::test]
async fn full_cycle_alerts_once_and_dedups_across_watches() {
    let api = MockServer::start().await;
    let hooks = MockServer::start().await;

    // Both watches surface judgment 100; each also has a unique result.
    Mock::given(method("POST"))
        .and(path("/search/"))
        .and(body_string_contains("Acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "docs": [doc_json(100, "Shared Case"), doc_json(101, "Acme Case")],
            "found": 2,
        })))
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/search/"))
        .and(body_string_contains("Beta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "docs": [doc_json(100, "Shared Case"), doc_json(102, "Beta Case")],
            "found": 2,
        })))
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&hooks)
        .await;

    let h = harness(&api, &hooks);
    h.store.insert_watch(watch("w-acme", "Acme Corp", "Acme Corp")).await;
    h.store.insert_watch(watch("w-beta", "Beta Ltd", "Beta Ltd")).await;

    // First cycle: both watches polled, overlap deduplicated, one alert
    // per watch dispatched at cycle end.
    let outcome = h.engine.run_cycle().await.unwrap();
    assert_eq!(outcome.polled, 2);
    assert_eq!(outcome.new_matches, 4);

    assert_eq!(h.store.judgments().await.len(), 3);
    assert_eq!(h.store.matches().await.len(), 4);
    assert!(h.store.matches().await.iter().all(|m| m.is_notified));
    assert_eq!(webhook_post_count(&hooks).await, 2);

    // Re-polling re-surfaces everything the backend already returned;
    // nothing new is recorded and nothing is re-alerted.
    let acme = h.store.watch("w-acme").await.unwrap().unwrap();
    let again = h.engine.poll_watch(&acme).await.unwrap();
    assert!(again.is_empty());

    h.notifier.dispatch_pending().await.unwrap();
    assert_eq!(h.store.matches().await.len(), 4);
    assert_eq!(webhook_post_count(&hooks).await, 2);
}

#[tokio::test]
async fn failed_delivery_retries_on_next_dispatch() {
    let api = MockServer::start().await;
    let hooks = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "docs": [doc_json(200, "Retry Case")],
            "found": 1,
        })))
        .mount(&api)
        .await;
    // Webhook down for the first delivery, healthy afterwards
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .up_to_n_times(1)
        .mount(&hooks)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&hooks)
        .await;

    let h = harness(&api, &hooks);
    h.store.insert_watch(watch("w-1", "Acme Corp", "Acme Corp")).await;

    h.engine.run_cycle().await.unwrap();

    // First dispatch (at cycle end) failed: match stays pending
    let matches = h.store.matches().await;
    assert_eq!(matches.len(), 1);
    assert!(!matches[0].is_notified);
    assert_eq!(matches[0].retry_count, 1);

    // The next dispatch tick picks the same row up and succeeds
    h.notifier.dispatch_pending().await.unwrap();
    let matches = h.store.matches().await;
    assert!(matches[0].is_notified);
}
