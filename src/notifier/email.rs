use super::{format, NotificationChannel};
use crate::config::SmtpConfig;
use crate::models::Application;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const DEFAULT_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FROM_NAME: &str = "VIP Leads";

/// Mails a plain-text + HTML summary of each application through an authenticated relay.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl EmailChannel {
    /// `Ok(None)` when server, username, password or recipient is missing.
    pub fn from_config(config: &SmtpConfig) -> Result<Option<Self>> {
        let (server, username, password, recipient) = match (
            required(&config.server),
            required(&config.username),
            required(&config.password),
            required(&config.recipient),
        ) {
            (Some(server), Some(username), Some(password), Some(recipient)) => {
                (server, username, password, recipient)
            }
            _ => return Ok(None),
        };

        let port = config.port.unwrap_or(DEFAULT_PORT);
        let builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(server)
                .with_context(|| format!("Invalid SMTP relay: {server}"))?
        } else if config.use_tls.unwrap_or(true) {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
                .with_context(|| format!("Invalid SMTP relay: {server}"))?
        } else {
            log::warn!("SMTP relay {server} configured without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server)
        };

        let timeout = config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let transport = builder
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(timeout)))
            .build();

        let from_address = required(&config.from_email).unwrap_or(username);
        let from_name = required(&config.from_name).unwrap_or(DEFAULT_FROM_NAME);
        let from = Mailbox::new(
            Some(from_name.to_string()),
            from_address
                .parse::<Address>()
                .with_context(|| format!("Invalid sender address: {from_address}"))?,
        );
        let to = Mailbox::new(
            None,
            recipient
                .parse::<Address>()
                .with_context(|| format!("Invalid recipient address: {recipient}"))?,
        );

        Ok(Some(Self {
            transport,
            from,
            to,
        }))
    }

    pub fn build_message(&self, application: &Application) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format::subject(application))
            .multipart(MultiPart::alternative_plain_html(
                format::plain_text(application),
                format::html(application),
            ))
            .context("Failed to build notification email")
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, application: &Application) -> Result<()> {
        let message = self.build_message(application)?;
        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}
