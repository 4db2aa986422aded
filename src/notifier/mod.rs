pub mod email;
pub mod format;
pub mod telegram;

use crate::config::Config;
use crate::models::Application;
use async_trait::async_trait;
use log::{error, info, warn};

pub use email::EmailChannel;
pub use telegram::TelegramChannel;

/// One outbound medium for new-application alerts.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, application: &Application) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct NotificationReport {
    pub deliveries: Vec<(String, Delivery)>,
}

impl NotificationReport {
    pub fn sent(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|(_, d)| *d == Delivery::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.sent()
    }
}

/// Best-effort fan-out: one attempt per channel, failures are logged and swallowed.
#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build every channel whose settings are complete. Incomplete or broken settings
    /// disable that channel only.
    pub fn from_config(config: &Config) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        match config.smtp.as_ref().map(EmailChannel::from_config) {
            Some(Ok(Some(channel))) => channels.push(Box::new(channel)),
            Some(Err(e)) => error!("Email notifications disabled: {e:#}"),
            _ => warn!("Email configuration is incomplete. Skipping email notifications."),
        }

        match config.telegram.as_ref().map(TelegramChannel::from_config) {
            Some(Ok(Some(channel))) => channels.push(Box::new(channel)),
            Some(Err(e)) => error!("Telegram notifications disabled: {e:#}"),
            _ => warn!("Telegram configuration is incomplete. Skipping notifications."),
        }

        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver to each channel in turn. Never fails: a broken channel cannot affect the
    /// others or the caller.
    pub async fn notify(&self, application: &Application) -> NotificationReport {
        let mut report = NotificationReport::default();

        for channel in &self.channels {
            let delivery = match channel.send(application).await {
                Ok(()) => {
                    info!(
                        "{} notification sent for application #{}",
                        channel.name(),
                        application.id
                    );
                    Delivery::Sent
                }
                Err(e) => {
                    error!(
                        "Error sending {} notification for application #{}: {e:#}",
                        channel.name(),
                        application.id
                    );
                    Delivery::Failed(format!("{e:#}"))
                }
            };
            report
                .deliveries
                .push((channel.name().to_string(), delivery));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SmtpConfig, TelegramConfig};
    use crate::models::ApplicationStatus;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeChannel {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationChannel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _application: &Application) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} is down", self.name);
            }
            Ok(())
        }
    }

    fn application() -> Application {
        Application {
            id: 1,
            name: "Jane Doe".to_string(),
            phone: "+79001234567".to_string(),
            email: None,
            service_type: None,
            message: None,
            ip_address: "10.0.0.1".to_string(),
            created_at: Utc::now(),
            status: ApplicationStatus::New,
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = Notifier::new(vec![
            Box::new(FakeChannel {
                name: "email",
                fail: true,
                calls: calls.clone(),
            }),
            Box::new(FakeChannel {
                name: "telegram",
                fail: false,
                calls: calls.clone(),
            }),
        ]);

        let report = notifier.notify(&application()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.sent(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.deliveries[1], ("telegram".to_string(), Delivery::Sent));
        assert!(matches!(&report.deliveries[0].1, Delivery::Failed(msg) if msg.contains("email is down")));
    }

    #[tokio::test]
    async fn test_no_channels_configured() {
        let notifier = Notifier::from_config(&Config::default());
        assert!(notifier.channel_names().is_empty());

        let report = notifier.notify(&application()).await;
        assert!(report.deliveries.is_empty());
    }

    #[test]
    fn test_from_config_picks_complete_channels() {
        let config = Config {
            smtp: Some(SmtpConfig {
                server: Some("smtp.example.com".to_string()),
                ..Default::default()
            }),
            telegram: Some(TelegramConfig {
                bot_token: Some("123:abc".to_string()),
                chat_id: Some("-100500".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let notifier = Notifier::from_config(&config);
        assert_eq!(notifier.channel_names(), vec!["telegram"]);
    }

    #[tokio::test]
    async fn test_unreachable_chat_api_is_absorbed() {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("-100500".to_string()),
            api_base: Some("http://127.0.0.1:9".to_string()),
            timeout_seconds: Some(2),
            parse_mode: None,
        };
        let channel = TelegramChannel::from_config(&config).unwrap().unwrap();
        let notifier = Notifier::new(vec![Box::new(channel)]);

        let report = notifier.notify(&application()).await;
        assert_eq!(report.failed(), 1);
    }
}
