//! Google Cloud Storage sink.
//!
//! Objects are uploaded through the JSON API media upload endpoint under
//! `<prefix>/<name>`. Access tokens come either from configuration or from
//! the GCE / Cloud Run metadata server, cached until shortly before expiry.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ExportError;
use crate::sink::{Sink, check_name, user_component};

pub const DEFAULT_API_BASE: &str = "https://storage.googleapis.com";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);
/// Assumed lifetime when the metadata server omits or overstates `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub enum TokenSource {
    Static(SecretString),
    MetadataServer { url: String },
}

impl TokenSource {
    pub fn metadata_server() -> Self {
        TokenSource::MetadataServer {
            url: METADATA_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: Option<u64>,
}

pub struct GcsSink {
    client: reqwest::Client,
    api_base: String,
    bucket: String,
    prefix: String,
    token: TokenSource,
    cached: Mutex<Option<(SecretString, Instant)>>,
}

impl GcsSink {
    /// `timeout` bounds every token and upload request.
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        token: TokenSource,
        timeout: Duration,
    ) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("peloton-to-garmin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::Write(format!("storage client: {e}")))?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
            token,
            cached: Mutex::new(None),
        })
    }

    /// Per-user prefix inside `bucket`.
    pub fn for_user(
        bucket: impl Into<String>,
        user: &str,
        token: TokenSource,
        timeout: Duration,
    ) -> Result<Self, ExportError> {
        Self::new(bucket, user_component(user), token, timeout)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn object_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    async fn access_token(&self) -> Result<SecretString, ExportError> {
        let url = match &self.token {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::MetadataServer { url } => url,
        };

        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let resp = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ExportError::Write(format!("metadata token request: {e}")))?;
        if !resp.status().is_success() {
            return Err(ExportError::Write(format!(
                "metadata token request returned {}",
                resp.status()
            )));
        }
        let payload: MetadataToken = resp
            .json()
            .await
            .map_err(|e| ExportError::Write(format!("metadata token decode: {e}")))?;

        let lifetime = payload
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
        let now = Instant::now();
        let expires_at = now
            .checked_add(lifetime.saturating_sub(EXPIRY_SLACK))
            .unwrap_or_else(|| now + DEFAULT_TOKEN_LIFETIME.saturating_sub(EXPIRY_SLACK));
        let token = SecretString::new(payload.access_token.into());
        *cached = Some((token.clone(), expires_at));
        tracing::debug!(?lifetime, "refreshed storage access token");
        Ok(token)
    }
}

#[async_trait]
impl Sink for GcsSink {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), ExportError> {
        check_name(name)?;
        let token = self.access_token().await?;
        let object = self.object_name(name);
        let url = format!("{}/upload/storage/v1/b/{}/o", self.api_base, self.bucket);

        let resp = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object.as_str())])
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| ExportError::Write(format!("upload {object}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body_snippet: String = body.chars().take(256).collect();
            return Err(ExportError::Write(format!(
                "upload {object} returned {status}: {body_snippet}"
            )));
        }
        tracing::debug!(bucket = %self.bucket, %object, bytes = content.len(), "uploaded object");
        Ok(())
    }

    fn location(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.prefix)
    }
}
