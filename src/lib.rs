pub mod admin;
pub mod config;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod rate_limiter;
pub mod server;
pub mod store;
pub mod validation;

pub use config::Config;
pub use models::{Application, ApplicationStatus, NewApplication};
pub use notifier::Notifier;
pub use pipeline::{SubmissionError, SubmissionPipeline};
pub use rate_limiter::RateLimiter;
pub use store::{ApplicationStore, SqliteStore};
pub use validation::{RawSubmission, Validator};
