// src/pipeline/poll.rs

//! Polling engine.
//!
//! One cycle: select active watches whose interval has elapsed, run each
//! through build-query -> search -> record-matches, update poll state, then
//! trigger notification dispatch. A failing watch never halts the cycle;
//! transient backend trouble (429/5xx/timeout) backs off that one watch.
//! The single exception is an auth failure: the shared credential is invalid
//! for every watch, so it pauses all polling globally until an operator
//! intervenes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Config, PollingMode, Watch};
use crate::pipeline::dispatch::Notifier;
use crate::pipeline::matcher::{record_matches, CreatedMatch};
use crate::query::build_query;
use crate::services::{SearchClient, SearchDoc};
use crate::storage::Store;

/// Summary of one polling cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Watches due this cycle
    pub due: usize,
    /// Watches polled to completion
    pub polled: usize,
    /// New matches recorded across all watches
    pub new_matches: usize,
    /// Whether this cycle tripped (or found) the global pause
    pub paused: bool,
}

/// Orchestrates polling across watches.
pub struct PollEngine {
    store: Arc<dyn Store>,
    client: Arc<SearchClient>,
    notifier: Arc<Notifier>,
    config: Arc<Config>,

    /// Watch-local backoff expiries after transient backend errors.
    /// Kept in memory: rate limits are temporary, and losing the map on
    /// restart only costs one extra attempt.
    backoffs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PollEngine {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<SearchClient>,
        notifier: Arc<Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            config,
            backoffs: Mutex::new(HashMap::new()),
        }
    }

    /// Execute one full polling cycle across all due watches.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome::default();

        if !self.config.polling.enabled {
            log::info!("Polling disabled in config. Skipping cycle.");
            return Ok(outcome);
        }
        if self.store.polling_mode().await? == PollingMode::Paused {
            log::info!("Polling is paused. Skipping cycle until an operator resumes.");
            outcome.paused = true;
            return Ok(outcome);
        }

        let now = Utc::now();
        let watches = self.store.active_watches().await?;
        let mut due = Vec::new();
        for watch in watches {
            if watch.interval_elapsed(now) && !self.in_backoff(&watch.id, now).await {
                due.push(watch);
            }
        }
        outcome.due = due.len();
        log::info!("Polling cycle: {} watch(es) due", due.len());

        for watch in &due {
            match self.poll_watch(watch).await {
                Ok(matches) => {
                    outcome.polled += 1;
                    outcome.new_matches += matches.len();
                }
                Err(e) if e.is_auth() => {
                    self.handle_auth_failure().await;
                    outcome.paused = true;
                    break;
                }
                Err(e) if e.is_transient() => {
                    self.apply_backoff(watch, now).await;
                    log::warn!("Transient error polling watch {}: {e}", watch.id);
                }
                Err(e) => {
                    log::error!("Error polling watch {}: {e}", watch.id);
                }
            }
        }

        if let Err(e) = self.notifier.dispatch_pending().await {
            log::error!("Error dispatching notifications after cycle: {e}");
        }

        Ok(outcome)
    }

    /// Run the single-watch pipeline: build the query, fetch every result
    /// page, record matches, update the watch's poll state. Shared by the
    /// cycle and the on-demand handler (which skips the due check).
    pub async fn poll_watch(&self, watch: &Watch) -> Result<Vec<CreatedMatch>> {
        let query = build_query(
            watch.kind,
            &watch.query_terms,
            &watch.court_filter,
            watch.query_floor_date(),
            None,
        );
        log::debug!("Watch {} query: {query}", watch.id);

        let docs = self.fetch_all_pages(watch, &query).await?;
        let matches = record_matches(
            self.store.as_ref(),
            &watch.id,
            &docs,
            &self.config.search.public_base_url,
        )
        .await;

        if self.config.polling.fetch_details {
            self.enrich_matches(&matches).await;
        }

        if let Err(e) = self
            .store
            .update_watch_poll_state(&watch.id, Utc::now(), docs.len() as u32)
            .await
        {
            log::error!("Failed to update poll state for watch {}: {e}", watch.id);
        }

        if !matches.is_empty() {
            log::info!("Watch {}: {} new match(es)", watch.name, matches.len());
        }
        Ok(matches)
    }

    /// Pause all polling and alert the operator. Called on any auth failure,
    /// from the cycle or the on-demand handler.
    pub async fn handle_auth_failure(&self) {
        log::error!("Search API auth failure (403): pausing ALL polling.");
        if let Err(e) = self.store.set_polling_mode(PollingMode::Paused).await {
            log::error!("Failed to persist paused mode: {e}");
        }
        self.notifier
            .send_admin_alert(
                "Search API Authentication Failure (403)",
                "The judgment search API rejected the configured credential.\n\
                 ALL polling has been paused.\n\n\
                 Verify the API token (LEXWATCH_API_TOKEN), then resume polling.",
            )
            .await;
    }

    /// Fetch page 0, then further pages only while the backend reports more
    /// results than received, bounded by `max_pages`. Pages are sequential
    /// per watch; page 0 always lands first.
    async fn fetch_all_pages(&self, watch: &Watch, query: &str) -> Result<Vec<SearchDoc>> {
        let first = self.client.search(query, 0, Some(&watch.id)).await?;
        let total = first.total_found;
        let mut docs = first.docs;

        let mut page = 1u32;
        while (docs.len() as u64) < total && page < self.config.search.max_pages {
            let next = self.client.search(query, page, Some(&watch.id)).await?;
            if next.docs.is_empty() {
                break;
            }
            docs.extend(next.docs);
            page += 1;
        }
        Ok(docs)
    }

    /// Best-effort docmeta enrichment for newly matched judgments. Bounded
    /// concurrency; the shared rate gate still spaces the actual calls.
    async fn enrich_matches(&self, matches: &[CreatedMatch]) {
        let targets = matches
            .iter()
            .filter_map(|c| c.external_id.map(|tid| (tid, c.record.judgment_id.clone())));

        stream::iter(targets)
            .for_each_concurrent(2, |(external_id, judgment_id)| async move {
                match self.client.doc_meta(external_id).await {
                    Ok(meta) => {
                        if let Err(e) = self
                            .store
                            .merge_judgment_metadata(&judgment_id, &meta)
                            .await
                        {
                            log::warn!("Failed to merge metadata for doc {external_id}: {e}");
                        }
                    }
                    Err(e) => log::warn!("Failed to fetch metadata for doc {external_id}: {e}"),
                }
            })
            .await;
    }

    async fn in_backoff(&self, watch_id: &str, now: DateTime<Utc>) -> bool {
        let mut backoffs = self.backoffs.lock().await;
        match backoffs.get(watch_id) {
            Some(until) if now < *until => true,
            Some(_) => {
                backoffs.remove(watch_id);
                false
            }
            None => false,
        }
    }

    /// Push the watch's next eligible poll out by double its interval.
    async fn apply_backoff(&self, watch: &Watch, now: DateTime<Utc>) {
        let minutes = i64::from(watch.effective_interval_minutes()) * 2;
        let until = now + Duration::minutes(minutes);
        log::warn!(
            "Watch {} backing off until {} (doubled interval: {minutes} min)",
            watch.id,
            until.to_rfc3339()
        );
        self.backoffs.lock().await.insert(watch.id.clone(), until);
    }

    #[cfg(test)]
    pub(crate) async fn backoff_until(&self, watch_id: &str) -> Option<DateTime<Utc>> {
        self.backoffs.lock().await.get(watch_id).copied()
    }
}
