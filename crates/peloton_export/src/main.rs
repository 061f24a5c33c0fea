use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

use peloton_export::{ExportConfig, ExportService, SinkTarget, logging};

/// Export recent Peloton workouts as TCX files.
#[derive(Parser, Debug)]
#[command(name = "peloton-export", version, about)]
struct Args {
    /// Peloton login email
    #[arg(long, env = "PELOTON_EMAIL")]
    email: Option<String>,

    /// Peloton password
    #[arg(long, env = "PELOTON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Email as first positional argument; wins over --email
    #[arg(value_name = "EMAIL")]
    email_arg: Option<String>,

    #[arg(value_name = "PASSWORD")]
    password_arg: Option<String>,

    #[arg(value_name = "LOG_FILE")]
    log_file_arg: Option<PathBuf>,

    /// How many recent workouts to export
    #[arg(long, env = "NUM_ACTIVITIES", default_value_t = peloton_export::config::DEFAULT_NUM_ACTIVITIES)]
    num_activities: u32,

    /// Base directory; files land in <dir>/<email>/
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = peloton_export::config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Upload to this Cloud Storage bucket instead of the local directory
    #[arg(long, env = "GCS_BUCKET")]
    gcs_bucket: Option<String>,

    /// Bearer token for Cloud Storage; the metadata server is used otherwise
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    gcs_access_token: Option<String>,

    /// Per-request bound for Cloud Storage calls
    #[arg(long, env = "GCS_TIMEOUT_SECS", default_value_t = peloton_export::gcs::DEFAULT_TIMEOUT.as_secs())]
    gcs_timeout_secs: u64,

    /// Also append logs to this file
    #[arg(long, env = "PELOTON_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Activities exported at once
    #[arg(long, env = "EXPORT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    #[arg(long, env = "PELOTON_BASE_URL", hide = true)]
    base_url: Option<String>,
}

impl Args {
    fn export_config(&self) -> ExportConfig {
        let target = match &self.gcs_bucket {
            Some(bucket) if !bucket.trim().is_empty() => SinkTarget::Gcs {
                bucket: bucket.clone(),
                access_token: self
                    .gcs_access_token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .map(|t| SecretString::new(t.into())),
                timeout: Duration::from_secs(self.gcs_timeout_secs),
            },
            _ => SinkTarget::LocalDir(self.output_dir.clone()),
        };
        ExportConfig {
            num_activities: self.num_activities,
            target,
            concurrency: self.concurrency.max(1),
            log_file: self.log_file_arg.clone().or_else(|| self.log_file.clone()),
            base_url: self.base_url.clone(),
        }
    }

    fn credentials(&self) -> Result<(String, SecretString), String> {
        let email = self.email_arg.clone().or_else(|| self.email.clone());
        let password = self.password_arg.clone().or_else(|| self.password.clone());
        match (email, password) {
            (Some(e), Some(p)) if !e.trim().is_empty() && !p.is_empty() => {
                Ok((e.trim().to_string(), SecretString::new(p.into())))
            }
            _ => Err("a Peloton email and password are required (--email/--password, PELOTON_EMAIL/PELOTON_PASSWORD or positional)".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.export_config();

    let log_env = logging::init(config.log_file.as_deref()).context("failed to initialise logging")?;
    tracing::info!(%log_env, "peloton-export: log filter");

    let (email, password) = match args.credentials() {
        Ok(c) => c,
        Err(msg) => {
            tracing::error!(%msg, "missing credentials; aborting");
            std::process::exit(1);
        }
    };

    // ctrl-c stops new activities; in-flight ones finish
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; not starting further activities");
            let _ = cancel_tx.send(true);
        }
    });

    let service = ExportService::new(config).with_cancellation(cancel_rx);
    let report = service
        .export(&email, password)
        .await
        .context("export did not start")?;

    println!("{report}");
    if report.all_failed() {
        std::process::exit(2);
    }
    Ok(())
}
