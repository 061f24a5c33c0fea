//! HTTP client implementation for the Peloton API.
//!
//! This module provides a reqwest-based implementation of the [`PelotonClient`](crate::PelotonClient) trait.

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::transforms::{
    self, LoginPayload, PerformanceGraphPayload, SummaryPayload, WorkoutListPayload,
    WorkoutPayload,
};
use crate::{Activity, PelotonClient, PelotonError, SampleSeries, Summary};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

const SESSION_COOKIE: &str = "peloton_session_id";
const PAGE_SIZE: u32 = 50;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated session for the Peloton API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestPelotonClient {
    base_url: String,
    user_id: String,
    session_id: SecretString,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ReqwestPelotonClient {
    /// Build a reqwest client honouring the configured timeout.
    fn http_client(timeout: Duration) -> Result<reqwest::Client, PelotonError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("peloton-to-garmin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PelotonError::Http)
    }

    /// Log in with email and password and return a client bound to the session.
    ///
    /// # Arguments
    /// * `config` - credentials, base URL and request timeout
    pub async fn login(config: &Config) -> Result<Self, PelotonError> {
        let client = Self::http_client(config.request_timeout)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let url = format!("{base_url}/auth/login");
        let body = serde_json::json!({
            "username_or_email": config.email,
            "password": config.password.expose_secret(),
        });

        let resp = client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(256).collect();
            // a rejected login is always a credentials problem
            return Err(match status.as_u16() {
                400 | 401 | 403 => PelotonError::Auth(snippet),
                code => PelotonError::from_status(code, snippet),
            });
        }
        let payload: LoginPayload = decode(resp, "login response").await?;
        tracing::info!(user_id = %payload.user_id, "logged in to Peloton");

        Ok(Self {
            base_url,
            user_id: payload.user_id,
            session_id: SecretString::new(payload.session_id.into()),
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client for an already established session.
    pub fn with_session(
        base_url: &str,
        user_id: impl Into<String>,
        session_id: SecretString,
    ) -> Result<Self, PelotonError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            session_id,
            client: Self::http_client(DEFAULT_TIMEOUT)?,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).header(
            reqwest::header::COOKIE,
            format!("{SESSION_COOKIE}={}", self.session_id.expose_secret()),
        )
    }

    /// GET `url` with `query`, retrying transport and server errors.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, PelotonError> {
        self.retry
            .retry_async_if(
                move || async move {
                    let resp = self.get_request(url).query(query).send().await?;
                    if !resp.status().is_success() {
                        return Err(error_from_response(resp).await);
                    }
                    decode(resp, what).await
                },
                PelotonError::is_retryable,
            )
            .await
    }
}

/// Extract error information from a failed response.
async fn error_from_response(resp: reqwest::Response) -> PelotonError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let body_snippet: String = body.chars().take(256).collect();
    PelotonError::from_status(status, body_snippet)
}

/// Read the body as text first so decode failures can carry a body snippet.
async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    what: &str,
) -> Result<T, PelotonError> {
    let text = resp.text().await?;
    serde_json::from_str::<T>(&text).map_err(|e| {
        let body_snippet: String = text.chars().take(512).collect();
        PelotonError::Decode {
            what: what.to_string(),
            reason: format!("{e} - body: {body_snippet}"),
        }
    })
}

#[async_trait]
impl PelotonClient for ReqwestPelotonClient {
    async fn list_recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, PelotonError> {
        let url = format!("{}/api/user/{}/workouts", self.base_url, self.user_id);
        let mut ids: Vec<String> = Vec::new();
        let mut page = 0u32;
        // the server pages at `page * limit`, so the page size must not change mid-listing
        let page_size = limit.clamp(1, PAGE_SIZE);

        while (ids.len() as u32) < limit {
            let query = [
                ("sort_by", "-created".to_string()),
                ("page", page.to_string()),
                ("limit", page_size.to_string()),
            ];
            let payload: WorkoutListPayload =
                self.get_json(&url, &query, "workout list").await?;
            if payload.data.is_empty() {
                break;
            }
            ids.extend(payload.data.into_iter().map(|w| w.id));
            page += 1;
            if payload.page_count.is_some_and(|count| page >= count) {
                break;
            }
        }

        ids.truncate(limit as usize);
        tracing::debug!(count = ids.len(), limit, "listed recent workouts");
        Ok(ids)
    }

    async fn get_workout(&self, workout_id: &str) -> Result<Activity, PelotonError> {
        let url = format!("{}/api/workout/{}", self.base_url, workout_id);
        let query = [(
            "joins",
            "peloton,peloton.ride,peloton.ride.instructor".to_string(),
        )];
        let payload: WorkoutPayload = self.get_json(&url, &query, "workout").await?;
        transforms::workout_to_activity(workout_id, payload)
    }

    async fn get_workout_summary(&self, workout_id: &str) -> Result<Summary, PelotonError> {
        let url = format!("{}/api/workout/{}/summary", self.base_url, workout_id);
        let payload: SummaryPayload = self.get_json(&url, &[], "workout summary").await?;
        Ok(transforms::summary_from_payload(payload))
    }

    async fn get_workout_samples(&self, workout_id: &str) -> Result<SampleSeries, PelotonError> {
        let url = format!(
            "{}/api/workout/{}/performance_graph",
            self.base_url, workout_id
        );
        let query = [("every_n", "1".to_string())];
        let payload: PerformanceGraphPayload =
            self.get_json(&url, &query, "performance graph").await?;
        transforms::performance_graph_to_samples(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_session_trims_trailing_slash() {
        let client = ReqwestPelotonClient::with_session(
            "http://localhost/",
            "u1",
            SecretString::new("sess".into()),
        )
        .expect("client");
        assert_eq!(client.base_url, "http://localhost");
        assert_eq!(client.user_id(), "u1");
    }

    #[test]
    fn session_cookie_is_attached() {
        let client = ReqwestPelotonClient::with_session(
            "http://localhost",
            "u1",
            SecretString::new("sess".into()),
        )
        .expect("client");
        let req = client
            .get_request("http://localhost/api/me")
            .build()
            .expect("request");
        let cookie = req
            .headers()
            .get(reqwest::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        assert_eq!(cookie.as_deref(), Some("peloton_session_id=sess"));
    }
}
