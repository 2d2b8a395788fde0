// src/models/poll_request.rs

//! On-demand poll request queue entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an on-demand poll request. Progression is monotonic:
/// pending -> processing -> done | failed. Terminal states are never
/// revived; retrying means creating a fresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollRequestStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl PollRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// An operator request to poll one watch immediately, outside its interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub id: String,
    pub watch_id: String,
    pub status: PollRequestStatus,
    pub created_at: DateTime<Utc>,
}
