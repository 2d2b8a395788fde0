// src/models/notification.rs

//! Audit records: notification deliveries and search API usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Slack,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Slack => write!(f, "slack"),
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Retrying,
}

/// Audit record of one delivery attempt. Created before the attempt, updated
/// with the outcome, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: String,

    /// Source match; None for digests, which span many matches
    pub match_id: Option<String>,

    pub channel: ChannelKind,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// One record per search API call attempt, success or failure. The usage
/// log is the operator's only cost-visibility mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub endpoint: String,
    pub request_url: String,
    pub watch_id: Option<String>,
    pub http_status: Option<u16>,
    pub result_count: Option<u32>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub called_at: DateTime<Utc>,
}
