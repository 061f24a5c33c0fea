use crate::PelotonError;
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.onepeloton.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub email: String,
    pub password: SecretString,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_env() -> Result<Self, PelotonError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, PelotonError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let email = get("PELOTON_EMAIL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PelotonError::Config("PELOTON_EMAIL missing".into()))?;
        let password = get("PELOTON_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PelotonError::Config("PELOTON_PASSWORD missing".into()))?;
        let base_url = get("PELOTON_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let request_timeout = match get("PELOTON_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| PelotonError::Config(format!("invalid PELOTON_TIMEOUT_SECS: {raw}")))?,
            None => Duration::from_secs(30),
        };
        Ok(Self {
            email,
            password: SecretString::new(password.into()),
            base_url,
            request_timeout,
        })
    }
}
