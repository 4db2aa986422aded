use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an application. The only transition is `New -> Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    New,
    Processed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::New => "new",
            ApplicationStatus::Processed => "processed",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ApplicationStatus::New),
            "processed" => Ok(ApplicationStatus::Processed),
            other => Err(anyhow::anyhow!("unknown application status: {other}")),
        }
    }
}

/// A validated submission that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub total: u64,
    pub new: u64,
    pub processed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationPage {
    pub items: Vec<Application>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u32,
}

/// Practice areas offered on the contact form: (slug, display name)
pub const SERVICE_CATALOG: &[(&str, &str)] = &[
    ("bankruptcy", "Банкротство"),
    ("real-estate", "Споры по недвижимости"),
    ("administrative", "Административные споры"),
    ("tax", "Налоговые споры"),
    ("corporate", "Корпоративное право"),
    ("family", "Семейные споры"),
    ("other", "Другое"),
];

/// Human readable name for a service tag; unknown tags are returned unchanged.
pub fn service_display_name(tag: &str) -> &str {
    SERVICE_CATALOG
        .iter()
        .find(|(slug, _)| *slug == tag)
        .map(|(_, name)| *name)
        .unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "new".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::New
        );
        assert_eq!(
            "processed".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::Processed
        );
        assert!("archived".parse::<ApplicationStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::Processed).unwrap(),
            "\"processed\""
        );
    }

    #[test]
    fn test_service_display_name() {
        assert_eq!(service_display_name("bankruptcy"), "Банкротство");
        assert_eq!(service_display_name("family"), "Семейные споры");
        assert_eq!(service_display_name("Банкротство"), "Банкротство");
    }
}
