// src/services/slack.rs

//! Slack incoming-webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{ChannelKind, SlackConfig};
use crate::services::transport::{AlertMessage, Transport};

/// Posts alerts to a Slack incoming webhook as block-formatted messages.
pub struct SlackTransport {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackTransport {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        if config.webhook_url.trim().is_empty() {
            return Err(AppError::config("slack transport has no webhook_url"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            webhook_url: config.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn recipient(&self) -> String {
        self.webhook_url.clone()
    }

    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let payload = json!({
            "text": message.subject,
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": message.subject }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": message.body }
                }
            ]
        });

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::notify(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notify(format!(
                "webhook returned {status}: {body}"
            )));
        }
        Ok(())
    }
}
