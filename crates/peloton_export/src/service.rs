//! Login + sink selection + run, for one user.

use peloton_client::PelotonClient;
use peloton_client::config::Config;
use peloton_client::http_client::ReqwestPelotonClient;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::{ExportConfig, SinkTarget};
use crate::error::ExportError;
use crate::gcs::{self, GcsSink, TokenSource};
use crate::pipeline::{Pipeline, RunReport};
use crate::sink::{LocalDirSink, Sink};

/// Runs exports for any user against the configured sink.
#[derive(Clone)]
pub struct ExportService {
    config: ExportConfig,
    gcs_api_base: String,
    cancel: Option<watch::Receiver<bool>>,
}

impl ExportService {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            gcs_api_base: gcs::DEFAULT_API_BASE.to_string(),
            cancel: None,
        }
    }

    pub fn with_gcs_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.gcs_api_base = api_base.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sink scoped to `user`: a sub-directory or a bucket prefix.
    pub fn sink_for(&self, user: &str) -> Result<Arc<dyn Sink>, ExportError> {
        Ok(match &self.config.target {
            SinkTarget::LocalDir(base) => Arc::new(LocalDirSink::for_user(base, user)),
            SinkTarget::Gcs {
                bucket,
                access_token,
                timeout,
            } => {
                let token = access_token
                    .clone()
                    .map_or_else(TokenSource::metadata_server, TokenSource::Static);
                Arc::new(
                    GcsSink::for_user(bucket.clone(), user, token, *timeout)?
                        .with_api_base(self.gcs_api_base.clone()),
                )
            }
        })
    }

    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<ReqwestPelotonClient, ExportError> {
        let mut config = Config::new(email, password);
        if let Some(base_url) = &self.config.base_url {
            config = config.with_base_url(base_url.clone());
        }
        Ok(ReqwestPelotonClient::login(&config).await?)
    }

    /// Export the configured number of recent workouts for one user.
    ///
    /// Login and listing failures are returned as errors; everything after
    /// that is reported per activity in the [`RunReport`].
    pub async fn export(&self, email: &str, password: SecretString) -> Result<RunReport, ExportError> {
        let client: Arc<dyn PelotonClient> = Arc::new(self.login(email, password).await?);
        self.export_with(client, email).await
    }

    /// Same as [`ExportService::export`] with an already authenticated source.
    pub async fn export_with(
        &self,
        source: Arc<dyn PelotonClient>,
        user: &str,
    ) -> Result<RunReport, ExportError> {
        let sink = self.sink_for(user)?;
        info!(location = %sink.location(), count = self.config.num_activities, "starting export");
        let mut pipeline = Pipeline::new(source, sink);
        if let Some(cancel) = &self.cancel {
            pipeline = pipeline.with_cancellation(cancel.clone());
        }
        pipeline
            .export_recent(self.config.num_activities, self.config.concurrency)
            .await
    }
}
