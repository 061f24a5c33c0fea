//! Export settings shared by the CLI and the HTTP trigger.

use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExportError;

pub const DEFAULT_NUM_ACTIVITIES: u32 = 5;
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Where finished documents are written.
#[derive(Clone, Debug)]
pub enum SinkTarget {
    /// `<dir>/<user>/<name>`
    LocalDir(PathBuf),
    /// `gs://<bucket>/<user>/<name>`
    Gcs {
        bucket: String,
        /// Static bearer token; the metadata server is used when absent.
        access_token: Option<SecretString>,
        /// Bound on each token and upload request.
        timeout: Duration,
    },
}

#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub num_activities: u32,
    pub target: SinkTarget,
    /// Activities processed at once; `1` keeps the run sequential.
    pub concurrency: usize,
    pub log_file: Option<PathBuf>,
    /// Overrides the Peloton API base URL.
    pub base_url: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            num_activities: DEFAULT_NUM_ACTIVITIES,
            target: SinkTarget::LocalDir(PathBuf::from(DEFAULT_OUTPUT_DIR)),
            concurrency: 1,
            log_file: None,
            base_url: None,
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, ExportError> {
    match non_empty(raw) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ExportError::InvalidInput(format!("invalid {key}: {raw}"))),
        None => Ok(None),
    }
}

impl ExportConfig {
    pub fn from_env() -> Result<Self, ExportError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads settings through `get` instead of the process environment.
    ///
    /// A GCS bucket takes precedence over the output directory.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ExportError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let num_activities =
            parse_number("NUM_ACTIVITIES", get("NUM_ACTIVITIES"))?.unwrap_or(DEFAULT_NUM_ACTIVITIES);
        let concurrency = parse_number::<usize>("EXPORT_CONCURRENCY", get("EXPORT_CONCURRENCY"))?
            .unwrap_or(1)
            .max(1);

        let target = match non_empty(get("GCS_BUCKET")) {
            Some(bucket) => SinkTarget::Gcs {
                bucket,
                access_token: non_empty(get("GCS_ACCESS_TOKEN"))
                    .map(|t| SecretString::new(t.into())),
                timeout: parse_number::<u64>("GCS_TIMEOUT_SECS", get("GCS_TIMEOUT_SECS"))?
                    .map_or(crate::gcs::DEFAULT_TIMEOUT, Duration::from_secs),
            },
            None => SinkTarget::LocalDir(PathBuf::from(
                non_empty(get("OUTPUT_DIRECTORY")).unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into()),
            )),
        };

        Ok(Self {
            num_activities,
            target,
            concurrency,
            log_file: non_empty(get("PELOTON_LOG_FILE")).map(PathBuf::from),
            base_url: non_empty(get("PELOTON_BASE_URL")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ExportConfig::from_env_with(env(&[])).unwrap();
        assert_eq!(cfg.num_activities, 5);
        assert_eq!(cfg.concurrency, 1);
        assert!(matches!(cfg.target, SinkTarget::LocalDir(ref p) if p == &PathBuf::from("output")));
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn bucket_wins_over_directory() {
        let cfg = ExportConfig::from_env_with(env(&[
            ("GCS_BUCKET", "rides"),
            ("OUTPUT_DIRECTORY", "/data"),
            ("NUM_ACTIVITIES", "12"),
        ]))
        .unwrap();
        assert_eq!(cfg.num_activities, 12);
        match cfg.target {
            SinkTarget::Gcs {
                bucket,
                access_token,
                timeout,
            } => {
                assert_eq!(bucket, "rides");
                assert!(access_token.is_none());
                assert_eq!(timeout, crate::gcs::DEFAULT_TIMEOUT);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_number() {
        let err = ExportConfig::from_env_with(env(&[("NUM_ACTIVITIES", "lots")])).unwrap_err();
        assert!(matches!(err, ExportError::InvalidInput(_)));
    }

    #[test]
    fn storage_timeout_is_configurable() {
        let cfg = ExportConfig::from_env_with(env(&[
            ("GCS_BUCKET", "rides"),
            ("GCS_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert!(matches!(
            cfg.target,
            SinkTarget::Gcs { timeout, .. } if timeout == Duration::from_secs(5)
        ));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let cfg = ExportConfig::from_env_with(env(&[("EXPORT_CONCURRENCY", "0")])).unwrap();
        assert_eq!(cfg.concurrency, 1);
    }
}
