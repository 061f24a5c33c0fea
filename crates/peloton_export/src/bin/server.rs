use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use peloton_export::http::{AppState, router};
use peloton_export::{ExportConfig, ExportService, logging};

/// `ADDRESS` when set and valid, else `0.0.0.0:$PORT` (default 8080).
fn listen_addr_from<F>(mut get: F) -> SocketAddr
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(addr) = get("ADDRESS").and_then(|s| s.parse().ok()) {
        return addr;
    }
    let port = get("PORT")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from(([0, 0, 0, 0], port))
}

#[cfg(test)]
#[allow(clippy::items_after_test_module)]
mod tests {
    use super::*;

    #[test]
    fn address_wins_over_port() {
        let addr = listen_addr_from(|k| match k {
            "ADDRESS" => Some("127.0.0.1:9000".into()),
            "PORT" => Some("1234".into()),
            _ => None,
        });
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn port_defaults_to_8080() {
        assert_eq!(listen_addr_from(|_| None).port(), 8080);
        let addr = listen_addr_from(|k| (k == "PORT").then(|| "3000".to_string()));
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 3000)));
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = ExportConfig::from_env()?;
    let log_env = logging::init(config.log_file.as_deref())?;
    info!(%log_env, "peloton-export:http: log filter");

    let handle = PrometheusBuilder::new().install_recorder()?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        service: ExportService::new(config).with_cancellation(cancel_rx),
        metrics: handle,
        target: std::env::var("TARGET").unwrap_or_else(|_| "World".to_string()),
    });
    let app = router(state);

    let addr = listen_addr_from(|k| std::env::var(k).ok());
    info!(%addr, "starting HTTP server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service());
    if let Err(e) = server
        .with_graceful_shutdown(async move {
            if signal::ctrl_c().await.is_err() {
                tracing::warn!("failed to install ctrl+c handler");
                std::future::pending::<()>().await;
            }
            info!("shutting down; pending activities will not be started");
            let _ = cancel_tx.send(true);
        })
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
