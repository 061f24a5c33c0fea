//! tracing subscriber setup for both binaries.

use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive from `PELOTON_EXPORT_LOG_LEVEL`, falling back to
/// `RUST_LOG`, default `info`.
pub fn filter_directive<F>(mut get: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    get("PELOTON_EXPORT_LOG_LEVEL")
        .or_else(|| get("RUST_LOG"))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber: compact output on stderr and, when
/// `log_file` is set, a second plain-text layer appending to that file.
///
/// Returns the filter directive in effect.
pub fn init(log_file: Option<&Path>) -> std::io::Result<String> {
    let log_env = filter_directive(|k| std::env::var(k).ok());
    let env_filter = EnvFilter::try_new(&log_env).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .map_err(std::io::Error::other)?;
    Ok(log_env)
}
