// src/services/search.rs

//! Search backend client.
//!
//! Wraps the judgment search API with the guardrails every caller needs:
//! - every request is bounded by a timeout
//! - a single shared rate gate spaces outbound calls across all concurrent
//!   callers (the external contract is aggregate, not per-caller)
//! - 5xx and timeouts are retried with exponential backoff; 4xx never are
//! - every attempt, success or failure, is written to the usage log

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ApiCallRecord, SearchApiConfig};
use crate::storage::UsageLog;

/// Shared admission gate enforcing a minimum gap between outbound calls.
///
/// Implemented as a mutual-exclusion slot: a caller holds the lock while it
/// sleeps out the remainder of the gap, so bursts are smoothed rather than
/// permitted up to a quota and then blocked.
pub struct RateGate {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the minimum gap since the previous admission has elapsed,
    /// then claim the slot.
    pub async fn admit(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// One page of search results.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub docs: Vec<SearchDoc>,

    /// Total results the backend reports for the query
    #[serde(default, rename = "found")]
    pub total_found: u64,
}

/// One raw result document, field names as the backend sends them.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDoc {
    /// Stable document id
    pub tid: Option<i64>,

    pub title: Option<String>,

    /// Court label
    pub docsource: Option<String>,

    /// Judgment date, `YYYY-MM-DD`
    pub publishdate: Option<String>,

    /// Snippet with highlight markup
    pub headline: Option<String>,

    pub numcites: Option<u32>,

    pub docsize: Option<u64>,

    /// Case number, present for documents sourced without a stable id
    #[serde(default)]
    pub case_number: Option<String>,
}

/// Async client for the search API.
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    gate: RateGate,
    max_attempts: u32,
    usage: Arc<dyn UsageLog>,
}

impl SearchClient {
    pub fn new(config: &SearchApiConfig, usage: Arc<dyn UsageLog>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Token {}", config.api_token))
            .map_err(|e| AppError::config(format!("invalid API token: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            gate: RateGate::new(Duration::from_millis(config.rate_limit_gap_ms)),
            max_attempts: config.max_attempts.max(1),
            usage,
        })
    }

    /// Search one page of results.
    pub async fn search(
        &self,
        form_input: &str,
        page: u32,
        watch_id: Option<&str>,
    ) -> Result<SearchPage> {
        let url = format!("{}/search/", self.base_url);
        let params = [
            ("formInput", form_input.to_string()),
            ("pagenum", page.to_string()),
        ];
        let body = self.request("search", &url, &params, watch_id).await?;
        serde_json::from_value(body).map_err(|e| AppError::Malformed(e.to_string()))
    }

    /// Fetch extended metadata for one document.
    pub async fn doc_meta(&self, doc_id: i64) -> Result<serde_json::Value> {
        let url = format!("{}/docmeta/{doc_id}/", self.base_url);
        self.request("docmeta", &url, &[], None).await
    }

    /// POST with rate limiting, bounded retries, classification, and
    /// mandatory usage logging.
    ///
    /// `max_attempts` bounds total attempts: with the default of 3, a
    /// persistently failing call makes exactly three requests (backing off
    /// 2s then 4s) before surfacing an error.
    async fn request(
        &self,
        endpoint: &str,
        url: &str,
        params: &[(&str, String)],
        watch_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        let mut last_err: Option<AppError> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let backoff = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
            self.gate.admit().await;

            let start = Instant::now();
            let response = self.http.post(url).form(params).send().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let error = if e.is_timeout() {
                        AppError::Timeout("request timed out".to_string())
                    } else {
                        AppError::Http(e)
                    };
                    self.log_attempt(endpoint, url, watch_id, None, None, elapsed_ms, Some(&error))
                        .await;
                    last_err = Some(error);
                    continue;
                }
            };

            let status = response.status().as_u16();
            match status {
                403 => {
                    let error = AppError::Auth("search API returned 403".to_string());
                    self.log_attempt(
                        endpoint, url, watch_id, Some(status), None, elapsed_ms, Some(&error),
                    )
                    .await;
                    return Err(error);
                }
                429 => {
                    let error = AppError::RateLimited("search API returned 429".to_string());
                    self.log_attempt(
                        endpoint, url, watch_id, Some(status), None, elapsed_ms, Some(&error),
                    )
                    .await;
                    return Err(error);
                }
                400..=499 => {
                    let error = AppError::Api {
                        status,
                        message: "client error".to_string(),
                    };
                    self.log_attempt(
                        endpoint, url, watch_id, Some(status), None, elapsed_ms, Some(&error),
                    )
                    .await;
                    return Err(error);
                }
                500..=599 => {
                    let error = AppError::Server {
                        status,
                        message: "server error".to_string(),
                    };
                    self.log_attempt(
                        endpoint, url, watch_id, Some(status), None, elapsed_ms, Some(&error),
                    )
                    .await;
                    last_err = Some(error);
                    continue;
                }
                _ => {}
            }

            let body = match response.json::<serde_json::Value>().await {
                Ok(body) => body,
                Err(e) => {
                    let error = AppError::Malformed(e.to_string());
                    self.log_attempt(
                        endpoint, url, watch_id, Some(status), None, elapsed_ms, Some(&error),
                    )
                    .await;
                    return Err(error);
                }
            };

            let result_count = body
                .get("docs")
                .and_then(|docs| docs.as_array())
                .map(|docs| docs.len() as u32);
            self.log_attempt(endpoint, url, watch_id, Some(status), result_count, elapsed_ms, None)
                .await;
            return Ok(body);
        }

        Err(last_err.unwrap_or_else(|| AppError::Server {
            status: 0,
            message: "no attempt made".to_string(),
        }))
    }

    /// Append one usage record. Failures are logged and swallowed: losing a
    /// usage row must never fail the search call itself.
    #[allow(clippy::too_many_arguments)]
    async fn log_attempt(
        &self,
        endpoint: &str,
        url: &str,
        watch_id: Option<&str>,
        http_status: Option<u16>,
        result_count: Option<u32>,
        response_time_ms: u64,
        error: Option<&AppError>,
    ) {
        let record = ApiCallRecord {
            endpoint: endpoint.to_string(),
            request_url: url.to_string(),
            watch_id: watch_id.map(str::to_string),
            http_status,
            result_count,
            response_time_ms,
            error_message: error.map(|e| e.to_string()),
            called_at: Utc::now(),
        };
        if let Err(e) = self.usage.record_api_call(&record).await {
            log::warn!("Failed to record API call: {e}");
        }
    }
}
