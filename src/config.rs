//! Configuration management for Birdcall.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{BirdcallError, Result};

/// Main configuration for a Birdcall client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirdcallConfig {
    /// API credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Use app-only (bearer token) authentication instead of user context
    #[serde(default)]
    pub application_only: bool,

    /// Remote endpoints
    #[serde(default)]
    pub urls: Urls,

    /// Headers sent with every request unless overridden per request
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    /// Request scheduling configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for BirdcallConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            application_only: false,
            urls: Urls::default(),
            headers: default_headers(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// API credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub consumer_key: Option<String>,
    #[serde(default)]
    pub consumer_secret: Option<String>,
    #[serde(default)]
    pub access_token_key: Option<String>,
    #[serde(default)]
    pub access_token_secret: Option<String>,
    /// A previously issued app-only token; skips the token exchange when set
    #[serde(default)]
    pub bearer_token: Option<String>,
}

/// Remote endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Urls {
    /// Base URL every relative request path is appended to
    #[serde(default = "default_rest_base")]
    pub rest_base: String,

    /// Endpoint for the app-only token exchange
    #[serde(default = "default_app_auth")]
    pub app_auth: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            rest_base: default_rest_base(),
            app_auth: default_app_auth(),
        }
    }
}

fn default_rest_base() -> String {
    "https://api.twitter.com/1.1".to_string()
}

fn default_app_auth() -> String {
    "https://api.twitter.com/oauth2/token".to_string()
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), "*/*".to_string());
    headers.insert("Connection".to_string(), "close".to_string());
    headers.insert(
        "User-Agent".to_string(),
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );
    headers
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between drain ticks
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,

    /// Requests moved to in-flight per drain tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batch size used once the drain rate has been reduced
    #[serde(default = "default_reduced_batch_size")]
    pub reduced_batch_size: usize,

    /// Dispatch on enqueue when nothing older is waiting
    #[serde(default = "default_true")]
    pub eager_dispatch: bool,

    /// Switch to the reduced batch size when a 429 comes back
    #[serde(default)]
    pub escalate_on_rate_limit: bool,

    /// Give up on a request after this many 429 responses (unbounded when unset)
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,

    /// Deadline for a single transport call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds between bulk rate-limit refreshes
    #[serde(default = "default_rate_limit_refresh")]
    pub rate_limit_refresh_secs: u64,

    /// Seconds between remote configuration refreshes
    #[serde(default = "default_remote_config_refresh")]
    pub remote_config_refresh_secs: u64,

    /// Run the two refresh jobs when the scheduler starts
    #[serde(default = "default_true")]
    pub refresh_jobs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval(),
            batch_size: default_batch_size(),
            reduced_batch_size: default_reduced_batch_size(),
            eager_dispatch: true,
            escalate_on_rate_limit: false,
            max_rate_limit_retries: None,
            request_timeout_secs: default_request_timeout(),
            rate_limit_refresh_secs: default_rate_limit_refresh(),
            remote_config_refresh_secs: default_remote_config_refresh(),
            refresh_jobs: true,
        }
    }
}

impl SchedulerConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_refresh(&self) -> Duration {
        Duration::from_secs(self.rate_limit_refresh_secs)
    }

    pub fn remote_config_refresh(&self) -> Duration {
        Duration::from_secs(self.remote_config_refresh_secs)
    }
}

fn default_drain_interval() -> u64 {
    60
}

fn default_batch_size() -> usize {
    50
}

fn default_reduced_batch_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_refresh() -> u64 {
    15 * 60
}

fn default_remote_config_refresh() -> u64 {
    24 * 60 * 60
}

impl BirdcallConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BirdcallError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file layered under `BIRDCALL_*`
    /// environment variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BIRDCALL_CREDENTIALS__CONSUMER_KEY` or `BIRDCALL_SCHEDULER__BATCH_SIZE`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("BIRDCALL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BirdcallError::Config(e.to_string()))
    }
}
