use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub submissions: SubmissionConfig,
    pub smtp: Option<SmtpConfig>,
    pub telegram: Option<TelegramConfig>,
    pub admin: Option<AdminConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Honour X-Forwarded-For / X-Real-IP when resolving the client address
    #[serde(default = "default_trust_proxy_headers")]
    pub trust_proxy_headers: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_trust_proxy_headers() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            trust_proxy_headers: default_trust_proxy_headers(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "instance/applications.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Trailing window during which a phone or IP may submit only once
    pub limit_minutes: u32,
    pub max_message_length: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            limit_minutes: 15,
            max_message_length: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: Option<String>,       // SMTP relay hostname
    pub port: Option<u16>,            // SMTP port (default: 587 for STARTTLS, 465 for SSL)
    pub username: Option<String>,     // SMTP login
    pub password: Option<String>,     // SMTP password
    pub use_tls: Option<bool>,        // Use STARTTLS (default: true)
    pub from_email: Option<String>,   // From address (default: username)
    pub from_name: Option<String>,    // From display name (default: "VIP Leads")
    pub recipient: Option<String>,    // Mailbox that receives new application alerts
    pub timeout_seconds: Option<u64>, // Connection timeout (default: 30)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: Option<String>,     // default: https://api.telegram.org
    pub timeout_seconds: Option<u64>, // default: 10
    pub parse_mode: Option<String>,   // default: HTML
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: Option<String>,
    /// Either a `salt$digest` PBKDF2 hash produced by `--hash-password` or a plain value
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Layer deployment variables on top of the file values. Empty values are ignored;
    /// unparsable ones are skipped and returned as messages for the caller to report.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("DATABASE") {
            self.database.path = path;
        }
        if let Some(minutes) = get("SUBMISSION_LIMIT_MINUTES") {
            match minutes.parse::<u32>() {
                Ok(minutes) => self.submissions.limit_minutes = minutes,
                Err(e) => {
                    problems.push(format!("Ignoring SUBMISSION_LIMIT_MINUTES={minutes}: {e}"))
                }
            }
        }

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.get_or_insert_with(Default::default).bot_token = Some(token);
        }
        if let Some(chat_id) = get("TELEGRAM_CHAT_ID") {
            self.telegram.get_or_insert_with(Default::default).chat_id = Some(chat_id);
        }

        if let Some(server) = get("MAIL_SERVER") {
            self.smtp.get_or_insert_with(Default::default).server = Some(server);
        }
        if let Some(port) = get("MAIL_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.smtp.get_or_insert_with(Default::default).port = Some(port),
                Err(e) => problems.push(format!("Ignoring MAIL_PORT={port}: {e}")),
            }
        }
        if let Some(use_tls) = get("MAIL_USE_TLS") {
            self.smtp.get_or_insert_with(Default::default).use_tls =
                Some(use_tls.eq_ignore_ascii_case("true"));
        }
        if let Some(username) = get("MAIL_USERNAME") {
            self.smtp.get_or_insert_with(Default::default).username = Some(username);
        }
        if let Some(password) = get("MAIL_PASSWORD") {
            self.smtp.get_or_insert_with(Default::default).password = Some(password);
        }
        if let Some(recipient) = get("ADMIN_EMAIL") {
            self.smtp.get_or_insert_with(Default::default).recipient = Some(recipient);
        }

        if let Some(username) = get("ADMIN_USERNAME") {
            self.admin.get_or_insert_with(Default::default).username = Some(username);
        }
        if let Some(password) = get("ADMIN_PASSWORD") {
            self.admin.get_or_insert_with(Default::default).password = Some(password);
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.logging = Some(LoggingConfig {
                level: level.to_lowercase(),
            });
        }

        problems
    }

    pub fn example() -> Self {
        Self {
            smtp: Some(SmtpConfig {
                server: Some("smtp.example.com".to_string()),
                port: Some(587),
                username: Some("notifications@example.com".to_string()),
                password: Some("change-me".to_string()),
                use_tls: Some(true),
                from_email: None,
                from_name: Some("VIP Leads".to_string()),
                recipient: Some("office@example.com".to_string()),
                timeout_seconds: Some(30),
            }),
            telegram: Some(TelegramConfig {
                bot_token: None,
                chat_id: None,
                api_base: None,
                timeout_seconds: Some(10),
                parse_mode: Some("HTML".to_string()),
            }),
            admin: Some(AdminConfig {
                username: Some("admin".to_string()),
                password: None,
            }),
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
            ..Self::default()
        }
    }
}
