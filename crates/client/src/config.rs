//! Client configuration.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_API_URL` - Base URL of the remote storefront API
//!
//! ## Optional
//! - `STOREFRONT_USER_AGENT` - User-Agent header (default: GoldenPapaya/1.0)

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// How long a successful fetch is trusted before the stores consult the
/// server again.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

const DEFAULT_USER_AGENT: &str = "GoldenPapaya/1.0";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote API. Always ends with a trailing slash so
    /// request paths join predictably.
    pub base_url: Url,
    /// User-Agent header sent on every request.
    pub user_agent: String,
    /// Freshness window for the collection stores. Configurable for tests;
    /// production uses [`DEFAULT_FRESHNESS_WINDOW`].
    pub freshness_window: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given API base URL.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            base_url,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `STOREFRONT_API_URL` is missing or not a
    /// valid URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let raw = std::env::var("STOREFRONT_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("STOREFRONT_API_URL".to_owned()))?;
        let base_url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar("STOREFRONT_API_URL".to_owned(), e.to_string()))?;

        let mut config = Self::new(base_url);
        if let Ok(user_agent) = std::env::var("STOREFRONT_USER_AGENT") {
            config.user_agent = user_agent;
        }
        Ok(config)
    }

    /// Override the freshness window (tests only; production keeps the
    /// 30-second default).
    #[must_use]
    pub const fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }
}
