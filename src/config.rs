//! Client configuration

use crate::error::{ClientError, Result};
use std::time::Duration;

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `https://jobs.example.com/api`
    pub base_url: String,

    /// Path of the token refresh endpoint, relative to `base_url`
    pub refresh_path: String,

    /// Path of the logout endpoint, relative to `base_url`
    pub logout_path: String,

    /// Path of the current-user endpoint, relative to `base_url`
    pub me_path: String,

    /// Per-request timeout
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Also treat 403 as a reason to refresh the session.
    /// Default: false (only 401 triggers a refresh)
    pub refresh_on_forbidden: bool,

    /// Tracked requests older than this are dropped by the sweeper
    /// Default: 30 seconds
    pub stale_request_after: Duration,

    /// How often the sweeper runs
    /// Default: 30 seconds
    pub sweep_interval: Duration,

    /// Refresh this long before the access token expires
    /// Default: 60 seconds
    pub refresh_before_expiry: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
            me_path: "/me".to_string(),
            request_timeout: Duration::from_secs(10),
            refresh_on_forbidden: false,
            stale_request_after: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
            refresh_before_expiry: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Build a config from `JOBBOARD_*` environment variables, using defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("JOBBOARD_API_BASE_URL") {
            Some(url) => Self::new(url),
            None => Self::default(),
        };

        if let Some(path) = lookup("JOBBOARD_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(path) = lookup("JOBBOARD_LOGOUT_PATH") {
            config.logout_path = path;
        }
        if let Some(secs) = lookup("JOBBOARD_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                ClientError::Configuration(format!("JOBBOARD_REQUEST_TIMEOUT_SECS: {e}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("JOBBOARD_REFRESH_ON_FORBIDDEN") {
            config.refresh_on_forbidden = parse_flag(&flag).ok_or_else(|| {
                ClientError::Configuration(format!(
                    "JOBBOARD_REFRESH_ON_FORBIDDEN: expected true/false, got {flag:?}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_refresh_on_forbidden(mut self, enabled: bool) -> Self {
        self.refresh_on_forbidden = enabled;
        self
    }

    pub fn with_stale_request_after(mut self, age: Duration) -> Self {
        self.stale_request_after = age;
        self
    }

    pub fn with_refresh_before_expiry(mut self, lead: Duration) -> Self {
        self.refresh_before_expiry = lead;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Configuration(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(ClientError::Configuration(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Join a path onto the base URL. Absolute URLs are passed through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
