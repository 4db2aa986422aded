use crate::store::ApplicationStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub can_submit: bool,
    pub recent_count: usize,
    pub limit_minutes: u32,
    pub next_allowed: Option<DateTime<Utc>>,
}

/// Trailing-window check recomputed from stored applications on every call.
///
/// The check and the later insert are not atomic: two submissions racing within the
/// same instant can both pass.
pub struct RateLimiter {
    store: Arc<dyn ApplicationStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    /// `true` when no application with this phone or IP was created in the last `window_minutes`.
    pub fn allowed(&self, identifier: &str, window_minutes: u32) -> Result<bool> {
        self.allowed_at(identifier, window_minutes, Utc::now())
    }

    pub fn allowed_at(
        &self,
        identifier: &str,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let recent = self.recent(identifier, window_minutes, now)?;
        Ok(recent.is_empty())
    }

    pub fn info(&self, identifier: &str, window_minutes: u32) -> Result<RateLimitInfo> {
        let recent = self.recent(identifier, window_minutes, Utc::now())?;
        let next_allowed = recent
            .iter()
            .max()
            .map(|latest| *latest + window(window_minutes));

        Ok(RateLimitInfo {
            can_submit: recent.is_empty(),
            recent_count: recent.len(),
            limit_minutes: window_minutes,
            next_allowed,
        })
    }

    fn recent(
        &self,
        identifier: &str,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        if window_minutes == 0 {
            return Ok(Vec::new());
        }
        let cutoff = now - window(window_minutes);
        let recent = self.store.recent_submissions(identifier, cutoff)?;
        Ok(recent.into_iter().filter(|ts| *ts <= now).collect())
    }
}

fn window(minutes: u32) -> Duration {
    Duration::minutes(i64::from(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewApplication;
    use crate::store::SqliteStore;

    fn seeded_store(created_at: DateTime<Utc>) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .insert_at(
                &NewApplication {
                    name: "Иван Иванов".to_string(),
                    phone: "+79001234567".to_string(),
                    email: None,
                    service_type: None,
                    message: None,
                    ip_address: "10.0.0.1".to_string(),
                },
                created_at,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_blocks_within_window() {
        let now = Utc::now();
        let limiter = RateLimiter::new(seeded_store(now - Duration::minutes(3)));

        assert!(!limiter.allowed_at("+79001234567", 15, now).unwrap());
        assert!(!limiter.allowed_at("10.0.0.1", 15, now).unwrap());
        assert!(limiter.allowed_at("+79007654321", 15, now).unwrap());
        assert!(limiter.allowed_at("10.0.0.2", 15, now).unwrap());
    }

    #[test]
    fn test_allows_after_window_expires() {
        let created = Utc::now();
        let limiter = RateLimiter::new(seeded_store(created));

        assert!(!limiter
            .allowed_at("+79001234567", 15, created + Duration::minutes(14))
            .unwrap());
        assert!(limiter
            .allowed_at("+79001234567", 15, created + Duration::minutes(16))
            .unwrap());
    }

    #[test]
    fn test_zero_window_disables_limit() {
        let now = Utc::now();
        let limiter = RateLimiter::new(seeded_store(now));
        assert!(limiter.allowed_at("+79001234567", 0, now).unwrap());
    }

    #[test]
    fn test_info_reports_next_allowed() {
        let created = Utc::now() - Duration::minutes(5);
        let limiter = RateLimiter::new(seeded_store(created));

        let info = limiter.info("+79001234567", 15).unwrap();
        assert!(!info.can_submit);
        assert_eq!(info.recent_count, 1);
        assert_eq!(info.limit_minutes, 15);
        let next = info.next_allowed.unwrap();
        let expected = created + Duration::minutes(15);
        assert!((next - expected).num_milliseconds().abs() < 1);

        let clear = limiter.info("+79000000000", 15).unwrap();
        assert!(clear.can_submit);
        assert!(clear.next_allowed.is_none());
    }
}
