// src/services/transport.rs

//! Alert delivery seam.
//!
//! The notifier renders one message per watch and hands it to every enabled
//! transport. Transports report success or failure synchronously; retry
//! policy lives in the notifier, not here.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ChannelKind;

/// A rendered alert, channel-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// One delivery channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which channel this transport writes to the notification log as.
    fn channel(&self) -> ChannelKind;

    /// Recipient label for the notification log (address list or webhook).
    fn recipient(&self) -> String;

    /// Deliver one message.
    async fn send(&self, message: &AlertMessage) -> Result<()>;
}
