// src/pipeline/mod.rs

//! Pipeline entry points for the worker.
//!
//! - `PollEngine`: the main cycle over due watches
//! - `record_matches`: reconcile search results against seen judgments
//! - `Notifier`: batched alert dispatch and the daily digest
//! - `check_poll_requests`: the on-demand "poll now" queue

pub mod dispatch;
pub mod matcher;
pub mod poll;
pub mod requests;

pub use dispatch::Notifier;
pub use matcher::{record_matches, CreatedMatch};
pub use poll::{CycleOutcome, PollEngine};
pub use requests::check_poll_requests;
