use super::{format, NotificationChannel};
use crate::config::TelegramConfig;
use crate::models::Application;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Posts new applications to a chat through the bot API `sendMessage` method.
pub struct TelegramChannel {
    client: Client,
    endpoint: Url,
    chat_id: String,
    parse_mode: String,
}

impl TelegramChannel {
    /// `Ok(None)` when the token or chat id is missing, so the channel stays disabled.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        let (token, chat_id) = match (
            config.bot_token.as_deref().filter(|t| !t.is_empty()),
            config.chat_id.as_deref().filter(|c| !c.is_empty()),
        ) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            _ => return Ok(None),
        };

        let base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        // A trailing slash keeps any path prefix on the base (e.g. a proxy mount) in the join
        let base = format!("{}/", base.trim_end_matches('/'));
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join(&format!("./bot{token}/sendMessage")))
            .with_context(|| format!("Invalid chat API base URL: {base}"))?;

        let timeout = config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(concat!("vip-leads/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build chat API client")?;

        Ok(Some(Self {
            client,
            endpoint,
            chat_id: chat_id.to_string(),
            parse_mode: config
                .parse_mode
                .clone()
                .unwrap_or_else(|| "HTML".to_string()),
        }))
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, application: &Application) -> Result<()> {
        let text = format::chat_message(application);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: &self.parse_mode,
        };

        self.client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .context("chat API request failed")?
            .error_for_status()
            .context("chat API rejected the message")?;

        Ok(())
    }
}
