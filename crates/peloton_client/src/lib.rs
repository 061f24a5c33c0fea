//! `PelotonClient` trait, typed workout model and a reqwest-based implementation.

use async_trait::async_trait;
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod model;
pub mod retry;
pub mod transforms;

pub use model::{Activity, Instructor, Sample, SampleSeries, Summary};

#[derive(Debug, Error)]
pub enum PelotonError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding {what}: {reason}")]
    Decode { what: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
}

impl PelotonError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => PelotonError::NotFound(body),
            401 | 403 => PelotonError::Auth(body),
            _ => PelotonError::Status { status, body },
        }
    }

    /// Transport failures and server-side errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PelotonError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            PelotonError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Source of workouts and their telemetry.
///
/// The three per-workout facets are separate calls; callers must not assume
/// they succeed or fail together.
#[async_trait]
pub trait PelotonClient: Send + Sync + 'static {
    /// Ids of the `limit` most recent workouts, newest first.
    async fn list_recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, PelotonError>;
    async fn get_workout(&self, workout_id: &str) -> Result<Activity, PelotonError>;
    async fn get_workout_summary(&self, workout_id: &str) -> Result<Summary, PelotonError>;
    async fn get_workout_samples(&self, workout_id: &str) -> Result<SampleSeries, PelotonError>;
}
