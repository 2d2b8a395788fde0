// src/models/mod.rs

//! Domain models for the worker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod judgment;
mod matches;
mod notification;
mod poll_request;
mod watch;

// Re-export all public types
pub use config::{
    Config, DigestConfig, EmailConfig, LoggingConfig, NotifyConfig, PollingConfig, RestConfig,
    SearchApiConfig, SlackConfig, StorageConfig,
};
pub use judgment::{DedupKey, Judgment, JudgmentDraft};
pub use matches::{JudgmentSummary, NewMatch, PendingMatch, WatchMatch};
pub use notification::{
    ApiCallRecord, ChannelKind, DeliveryStatus, NotificationLogEntry,
};
pub use poll_request::{PollRequest, PollRequestStatus};
pub use watch::{PollingMode, Watch, WatchKind, MIN_POLL_INTERVAL_MINUTES};
