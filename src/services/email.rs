// src/services/email.rs

//! SMTP email transport.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{AppError, Result};
use crate::models::{ChannelKind, EmailConfig};
use crate::services::transport::{AlertMessage, Transport};

/// Sends alerts as plain-text email over SMTP.
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailTransport {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| AppError::config(format!("invalid from_address: {e}")))?;

        let mut recipients = Vec::with_capacity(config.recipients.len());
        for address in &config.recipients {
            let mailbox = address
                .parse()
                .map_err(|e| AppError::config(format!("invalid recipient {address}: {e}")))?;
            recipients.push(mailbox);
        }
        if recipients.is_empty() {
            return Err(AppError::config("email transport has no recipients"));
        }

        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::notify(e))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| AppError::notify(e))?
        };
        let mailer = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            mailer,
            from,
            recipients,
        })
    }
}

#[async_trait]
impl Transport for EmailTransport {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn recipient(&self) -> String {
        self.recipients
            .iter()
            .map(|m| m.email.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(&message.subject);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        let email = builder
            .body(message.body.clone())
            .map_err(|e| AppError::notify(e))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::notify(e))?;
        Ok(())
    }
}
