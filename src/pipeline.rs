use crate::config::SubmissionConfig;
use crate::models::Application;
use crate::notifier::Notifier;
use crate::rate_limiter::RateLimiter;
use crate::store::ApplicationStore;
use crate::validation::{RawSubmission, ValidationErrors, Validator};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    RateChecked,
    Stored,
    Notified,
    Acknowledged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::RateChecked => "rate_checked",
            Stage::Stored => "stored",
            Stage::Notified => "notified",
            Stage::Acknowledged => "acknowledged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    Phone,
    Ip,
}

#[derive(Debug)]
pub enum SubmissionError {
    /// Input failed validation; every violated rule is listed.
    Invalid(ValidationErrors),
    RateLimited { scope: LimitScope, minutes: u32 },
    /// The application could not be persisted (or the limit could not be checked).
    Storage(anyhow::Error),
}

impl SubmissionError {
    /// Message safe to show to the person filling in the form.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Invalid(_) => "Проверьте правильность заполнения формы".to_string(),
            SubmissionError::RateLimited {
                scope: LimitScope::Phone,
                minutes,
            } => format!("Вы можете отправлять заявки не чаще чем раз в {minutes} минут."),
            SubmissionError::RateLimited {
                scope: LimitScope::Ip,
                minutes,
            } => format!(
                "Слишком много запросов с вашего IP. Попробуйте через {minutes} минут."
            ),
            SubmissionError::Storage(_) => {
                "Произошла ошибка при отправке заявки. Попробуйте позже.".to_string()
            }
        }
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::Invalid(errors) => write!(f, "invalid submission: {errors}"),
            SubmissionError::RateLimited { scope, minutes } => {
                write!(f, "rate limited by {scope:?} for {minutes} minutes")
            }
            SubmissionError::Storage(e) => write!(f, "storage failure: {e:#}"),
        }
    }
}

impl std::error::Error for SubmissionError {}

#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub id: i64,
    pub message: String,
    #[serde(skip)]
    pub application: Application,
}

/// validate → rate-limit → persist → notify → acknowledge.
pub struct SubmissionPipeline {
    validator: Validator,
    rate_limiter: RateLimiter,
    store: Arc<dyn ApplicationStore>,
    notifier: Notifier,
    limit_minutes: u32,
}

impl SubmissionPipeline {
    pub fn new(
        config: &SubmissionConfig,
        store: Arc<dyn ApplicationStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            validator: Validator::new(config.max_message_length),
            rate_limiter: RateLimiter::new(store.clone()),
            store,
            notifier,
            limit_minutes: config.limit_minutes,
        }
    }

    pub async fn submit(
        &self,
        raw: &RawSubmission,
        ip_address: &str,
    ) -> Result<Acknowledgement, SubmissionError> {
        debug!("submission from {ip_address}: {}", Stage::Received);

        let new_application = self
            .validator
            .validate(raw, ip_address)
            .map_err(|errors| {
                info!("Rejected submission from {ip_address}: {errors}");
                SubmissionError::Invalid(errors)
            })?;
        debug!("submission from {ip_address}: {}", Stage::Validated);

        self.check_limit(&new_application.phone, LimitScope::Phone)?;
        self.check_limit(&new_application.ip_address, LimitScope::Ip)?;
        debug!("submission from {ip_address}: {}", Stage::RateChecked);

        let application = self.store.create(&new_application).map_err(|e| {
            error!("Error creating application from {ip_address}: {e:#}");
            SubmissionError::Storage(e)
        })?;
        info!(
            "New application submitted: ID={}, Name={}, Phone={}, IP={}",
            application.id, application.name, application.phone, application.ip_address
        );
        debug!("application #{}: {}", application.id, Stage::Stored);

        let report = self.notifier.notify(&application).await;
        debug!(
            "application #{}: {} ({} sent, {} failed)",
            application.id,
            Stage::Notified,
            report.sent(),
            report.failed()
        );

        debug!("application #{}: {}", application.id, Stage::Acknowledged);
        Ok(Acknowledgement {
            id: application.id,
            message: "Ваша заявка успешно отправлена! Мы свяжемся с вами в ближайшее время."
                .to_string(),
            application,
        })
    }

    fn check_limit(&self, identifier: &str, scope: LimitScope) -> Result<(), SubmissionError> {
        match self.rate_limiter.allowed(identifier, self.limit_minutes) {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(
                    "Security event: rate_limit - {scope:?} {identifier} submitted within {} minutes",
                    self.limit_minutes
                );
                Err(SubmissionError::RateLimited {
                    scope,
                    minutes: self.limit_minutes,
                })
            }
            Err(e) => {
                error!("Error checking submission limit for {identifier}: {e:#}");
                Err(SubmissionError::Storage(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApplicationPage, ApplicationStats, ApplicationStatus, NewApplication,
    };
    use crate::notifier::NotificationChannel;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline(store: Arc<dyn ApplicationStore>) -> SubmissionPipeline {
        SubmissionPipeline::new(&SubmissionConfig::default(), store, Notifier::default())
    }

    fn raw(name: &str, phone: &str) -> RawSubmission {
        RawSubmission {
            name: Some(name.to_string()),
            phone: Some(phone.to_string()),
            email: Some("ivan@example.com".to_string()),
            service_type: Some("bankruptcy".to_string()),
            message: Some("Нужна консультация".to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_submission_is_stored_as_new() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = pipeline(store.clone());

        let ack = pipeline
            .submit(&raw("Иван Иванов", "+79001234567"), "10.0.0.1")
            .await
            .unwrap();

        let stored = store.get(ack.id).unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::New);
        assert_eq!(stored.name, "Иван Иванов");
        assert_eq!(stored.service_type.as_deref(), Some("bankruptcy"));
        assert_eq!(stored.ip_address, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_same_phone_is_rate_limited() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = pipeline(store.clone());

        pipeline
            .submit(&raw("Иван Иванов", "+79001234567"), "10.0.0.1")
            .await
            .unwrap();

        let mut second = raw("Jane Doe", "+7 900 123-45-67");
        second.message = Some("Другой текст".to_string());
        let err = pipeline.submit(&second, "10.0.0.2").await.unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::RateLimited {
                scope: LimitScope::Phone,
                minutes: 15
            }
        ));
        assert!(err.user_message().contains("15"));
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_same_ip_is_rate_limited() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = pipeline(store.clone());

        pipeline
            .submit(&raw("Иван Иванов", "+79001234567"), "10.0.0.1")
            .await
            .unwrap();
        let err = pipeline
            .submit(&raw("Jane Doe", "89007654321"), "10.0.0.1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::RateLimited {
                scope: LimitScope::Ip,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = pipeline(store.clone());

        let err = pipeline
            .submit(&raw("", "123"), "10.0.0.1")
            .await
            .unwrap_err();

        match err {
            SubmissionError::Invalid(errors) => {
                assert!(errors.has_field("name"));
                assert!(errors.has_field("phone"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.stats().unwrap().total, 0);
    }

    struct DownChannel {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationChannel for DownChannel {
        fn name(&self) -> &str {
            "telegram"
        }

        async fn send(&self, _application: &Application) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_submission() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let attempts = Arc::new(AtomicUsize::new(0));
        let notifier = Notifier::new(vec![Box::new(DownChannel {
            attempts: attempts.clone(),
        })]);
        let pipeline =
            SubmissionPipeline::new(&SubmissionConfig::default(), store.clone(), notifier);

        let ack = pipeline
            .submit(&raw("Иван Иванов", "+79001234567"), "10.0.0.1")
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let stored = store.get(ack.id).unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::New);
        assert_eq!(stored.phone, "+79001234567");
    }

    struct BrokenStore;

    impl ApplicationStore for BrokenStore {
        fn create(&self, _application: &NewApplication) -> anyhow::Result<Application> {
            anyhow::bail!("disk full")
        }
        fn get(&self, _id: i64) -> anyhow::Result<Option<Application>> {
            Ok(None)
        }
        fn list(
            &self,
            _status: Option<ApplicationStatus>,
            _page: u32,
            _per_page: u32,
        ) -> anyhow::Result<ApplicationPage> {
            anyhow::bail!("disk full")
        }
        fn mark_processed(&self, _id: i64) -> anyhow::Result<Option<Application>> {
            Ok(None)
        }
        fn recent_submissions(
            &self,
            _identifier: &str,
            _since: DateTime<Utc>,
        ) -> anyhow::Result<Vec<DateTime<Utc>>> {
            Ok(Vec::new())
        }
        fn stats(&self) -> anyhow::Result<ApplicationStats> {
            Ok(ApplicationStats::default())
        }
        fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_generically() {
        let pipeline = pipeline(Arc::new(BrokenStore));

        let err = pipeline
            .submit(&raw("Иван Иванов", "+79001234567"), "10.0.0.1")
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::Storage(_)));
        assert!(!err.user_message().contains("disk full"));
    }
}
