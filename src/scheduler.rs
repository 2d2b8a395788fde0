// src/scheduler.rs

//! Worker entry point and timers.
//!
//! Four independent schedules run against the same store and the same
//! search-client rate gate: the main polling cycle, notification dispatch,
//! the on-demand poll-request check, and a once-per-day digest. The rate
//! gate is the only cross-task mutual exclusion; everything else is
//! idempotent row updates. Every tick body catches and logs its errors;
//! nothing here may crash the long-running process.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::{check_poll_requests, Notifier, PollEngine};
use crate::services::{EmailTransport, SearchClient, SlackTransport, Transport};
use crate::storage::{MemoryStore, RestStore, Store, UsageLog};

/// Seconds between digest-due checks.
const DIGEST_TICK_SECS: u64 = 60;

/// The wired-up worker components, sharing one store.
pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub engine: Arc<PollEngine>,
    pub notifier: Arc<Notifier>,
}

/// Build the store selected in config and wire the engine and notifier
/// around it.
pub fn build_runtime(config: Arc<Config>) -> Result<Runtime> {
    match config.storage.backend.as_str() {
        "memory" => wire(config.clone(), Arc::new(MemoryStore::new())),
        "rest" => {
            let store = Arc::new(RestStore::new(&config.storage.rest)?);
            wire(config.clone(), store)
        }
        other => Err(AppError::config(format!("unknown storage backend: {other}"))),
    }
}

/// Build every enabled notification transport.
pub fn build_transports(config: &Config) -> Result<Vec<Arc<dyn Transport>>> {
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    if config.notify.email.enabled {
        transports.push(Arc::new(EmailTransport::new(&config.notify.email)?));
    }
    if config.notify.slack.enabled {
        transports.push(Arc::new(SlackTransport::new(&config.notify.slack)?));
    }
    if transports.is_empty() {
        log::warn!("No notification channels enabled; matches will accumulate unnotified.");
    }
    Ok(transports)
}

fn wire<S: Store + 'static>(config: Arc<Config>, backing: Arc<S>) -> Result<Runtime> {
    let usage: Arc<dyn UsageLog> = Arc::clone(&backing) as Arc<dyn UsageLog>;
    let store: Arc<dyn Store> = backing;

    let client = Arc::new(SearchClient::new(&config.search, usage)?);
    let transports = build_transports(&config)?;
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&store),
        transports,
        &config.notify,
    ));
    let engine = Arc::new(PollEngine::new(
        Arc::clone(&store),
        client,
        Arc::clone(&notifier),
        config,
    ));
    Ok(Runtime {
        store,
        engine,
        notifier,
    })
}

/// Whether the digest should fire on this tick: the configured local time
/// has passed today and today's digest has not been sent yet.
pub fn digest_due(
    now_time: NaiveTime,
    today: NaiveDate,
    last_sent: Option<NaiveDate>,
    hour: u32,
    minute: u32,
) -> bool {
    if last_sent == Some(today) {
        return false;
    }
    (now_time.hour(), now_time.minute()) >= (hour, minute)
}

/// Run the worker until interrupted.
pub async fn run_worker(config: Config) -> Result<()> {
    config.validate()?;
    let config = Arc::new(config);

    let Runtime {
        store,
        engine,
        notifier,
    } = build_runtime(Arc::clone(&config))?;

    log::info!(
        "Worker starting: cycle every {} min, dispatch every {} min, requests every {} s",
        config.polling.cycle_minutes,
        config.polling.dispatch_minutes,
        config.polling.request_check_secs,
    );

    // Main polling cycle
    let cycle_engine = Arc::clone(&engine);
    let cycle_minutes = config.polling.cycle_minutes;
    let cycle_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60 * cycle_minutes));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match cycle_engine.run_cycle().await {
                Ok(outcome) => log::info!(
                    "Cycle done: {}/{} watches polled, {} new match(es)",
                    outcome.polled,
                    outcome.due,
                    outcome.new_matches
                ),
                Err(e) => log::error!("Polling cycle failed: {e}"),
            }
        }
    });

    // Notification dispatch
    let dispatch_notifier = Arc::clone(&notifier);
    let dispatch_minutes = config.polling.dispatch_minutes;
    let dispatch_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60 * dispatch_minutes));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = dispatch_notifier.dispatch_pending().await {
                log::error!("Notification dispatch failed: {e}");
            }
        }
    });

    // On-demand poll requests
    let request_engine = Arc::clone(&engine);
    let request_store = Arc::clone(&store);
    let request_secs = config.polling.request_check_secs;
    let request_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(request_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = check_poll_requests(request_store.as_ref(), &request_engine).await {
                log::error!("Poll request check failed: {e}");
            }
        }
    });

    // Daily digest
    let digest_notifier = Arc::clone(&notifier);
    let digest_config = config.notify.digest.clone();
    let digest_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(DIGEST_TICK_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sent: Option<NaiveDate> = None;
        loop {
            ticker.tick().await;
            let now = Local::now();
            if digest_due(
                now.time(),
                now.date_naive(),
                last_sent,
                digest_config.hour,
                digest_config.minute,
            ) {
                match digest_notifier.send_daily_digest().await {
                    Ok(()) => last_sent = Some(now.date_naive()),
                    Err(e) => log::error!("Daily digest failed: {e}"),
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown signal received, stopping worker.");

    cycle_task.abort();
    dispatch_task.abort();
    request_task.abort();
    digest_task.abort();
    Ok(())
}
