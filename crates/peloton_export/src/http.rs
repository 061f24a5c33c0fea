//! HTTP trigger: run an export for the credentials posted in a form.

use axum::debug_handler;
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ExportError;
use crate::pipeline::RunReportRecord;
use crate::service::ExportService;

pub struct AppState {
    pub service: ExportService,
    pub metrics: PrometheusHandle,
    /// Greeting target for `GET /`.
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportForm {
    email: Option<String>,
    password: Option<String>,
}

#[debug_handler]
async fn hello(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    format!("Hello {}!\n", state.target)
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[debug_handler]
async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([("content-type", "text/plain; version=0.0.4")], body)
}

fn required(value: Option<String>, field: &str) -> Result<String, (StatusCode, String)> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("missing form field: {field}")))
}

#[debug_handler]
async fn run_export(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ExportForm>,
) -> Result<Json<RunReportRecord>, (StatusCode, String)> {
    let email = required(form.email, "email")?;
    let password = SecretString::new(required(form.password, "password")?.into());

    let report = state
        .service
        .export(email.trim(), password)
        .await
        .map_err(map_err)?;
    tracing::info!(%report, "export request finished");
    Ok(Json(report.to_record()))
}

fn map_err(e: ExportError) -> (StatusCode, String) {
    match e {
        ExportError::Fetch(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
        ExportError::InvalidInput(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        ExportError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        ExportError::Write(_) | ExportError::Xml(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/peloton", post(run_export))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peloton_client::PelotonError;

    #[test]
    fn required_rejects_blank_fields() {
        assert_eq!(required(None, "email").unwrap_err().0, StatusCode::BAD_REQUEST);
        assert_eq!(
            required(Some("  ".into()), "email").unwrap_err().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(required(Some("a@b".into()), "email").unwrap(), "a@b");
    }

    #[test]
    fn login_failures_map_to_bad_gateway() {
        let (status, body) = map_err(ExportError::Fetch(PelotonError::Auth("bad".into())));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("authentication failed"));
    }
}
