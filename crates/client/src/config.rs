//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARTSYNC_API_URL` - Base URL of the storefront REST API
//!
//! ## Optional
//! - `CARTSYNC_STORAGE_DIR` - Directory for persisted cart/auth state (default: .cartsync)
//! - `CARTSYNC_HTTP_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)
//! - `CARTSYNC_REFRESH_PATH` - Token refresh endpoint path (default: /auth/refresh)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_STORAGE_DIR: &str = ".cartsync";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
const MAX_TIMEOUT_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API connection settings
    pub api: ApiConfig,
    /// Directory holding persisted storage files
    pub storage_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// REST API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL; endpoint paths are joined onto it.
    pub base_url: Url,
    /// Path of the token refresh endpoint.
    pub refresh_path: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Settings for `base_url` with default refresh path and timeout.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = parse_base_url(&get_required_env("CARTSYNC_API_URL")?)?;
        let timeout_secs = get_env_or_default(
            "CARTSYNC_HTTP_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("CARTSYNC_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        let timeout = validate_timeout(timeout_secs)?;
        let refresh_path = normalize_path(&get_env_or_default(
            "CARTSYNC_REFRESH_PATH",
            DEFAULT_REFRESH_PATH,
        ));

        Ok(Self {
            api: ApiConfig {
                base_url,
                refresh_path,
                timeout,
            },
            storage_dir: PathBuf::from(get_env_or_default(
                "CARTSYNC_STORAGE_DIR",
                DEFAULT_STORAGE_DIR,
            )),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse the API base URL. A trailing slash is added so `Url::join` keeps
/// any path prefix (e.g. `/api/v1`).
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar("CARTSYNC_API_URL".to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "CARTSYNC_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Reject zero and absurdly long timeouts.
fn validate_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidEnvVar(
            "CARTSYNC_HTTP_TIMEOUT_SECS".to_string(),
            format!("must be between 1 and {MAX_TIMEOUT_SECS} (got {secs})"),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Ensure an endpoint path starts with exactly one slash.
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim().trim_start_matches('/'))
}
