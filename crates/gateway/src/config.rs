//! Gateway connection configuration.
//!
//! A JSON file is read into [`GatewayConfigFile`] (every field optional)
//! and converted into the unified [`GatewayConfig`] the processor uses.
//!
//! ```json
//! {
//!   "hostname": "192.168.1.50",
//!   "password": "velux123",
//!   "refresh_interval_secs": 300
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use klf200_protocol::constants::{
    CONFIRMATION_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_PORT, KEEPALIVE_PERIOD, PASSWORD_LEN,
    SESSION_TIMEOUT,
};

use crate::types::{ReconnectConfig, ResyncPolicy};

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// On-disk format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReconnectFile {
    #[serde(default)]
    initial_delay_ms: Option<u64>,
    #[serde(default)]
    max_delay_secs: Option<u64>,
    #[serde(default)]
    backoff_factor: Option<f64>,
    #[serde(default)]
    unavailable_after: Option<u32>,
}

/// JSON configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigFile {
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    password: String,
    #[serde(default)]
    refresh_interval_secs: Option<u64>,
    #[serde(default)]
    keepalive_secs: Option<u64>,
    #[serde(default)]
    confirmation_timeout_ms: Option<u64>,
    #[serde(default)]
    session_timeout_secs: Option<u64>,
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    reconnect: ReconnectFile,
    #[serde(default)]
    transient_retries: Option<u32>,
    #[serde(default)]
    refresh_on_connect: Option<bool>,
    #[serde(default)]
    resync: Option<ResyncPolicy>,
}

// ---------------------------------------------------------------------------
// Unified GatewayConfig
// ---------------------------------------------------------------------------

/// Everything the processor needs to reach and drive one gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    pub hostname: String,
    pub port: u16,
    /// Shared secret for the login exchange (max 32 bytes).
    pub password: String,
    /// Period of the background node refresh. `None` disables it.
    pub refresh_interval: Option<Duration>,
    /// Period of the keep-alive ping.
    pub keepalive: Duration,
    /// Bound for commands answered by a single confirmation.
    pub confirmation_timeout: Duration,
    /// Bound for commands followed by a notification sequence.
    pub session_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Re-submissions of a command rejected for a transient reason.
    pub transient_retries: u32,
    /// Read all nodes after each login so listeners learn positions.
    pub refresh_on_connect: bool,
    pub resync: ResyncPolicy,
}

impl GatewayConfig {
    /// Builds a configuration with default timings.
    pub fn new(hostname: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            password: password.into(),
            refresh_interval: None,
            keepalive: KEEPALIVE_PERIOD,
            confirmation_timeout: CONFIRMATION_TIMEOUT,
            session_timeout: SESSION_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            transient_retries: 1,
            refresh_on_connect: true,
            resync: ResyncPolicy::default(),
        }
    }

    /// Loads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: GatewayConfigFile = serde_json::from_str(&content)?;
        let config = Self::from(file);
        config.validate()?;
        tracing::debug!(path = %path.display(), host = %config.hostname, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("hostname is required".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password is required".into()));
        }
        if self.password.len() > PASSWORD_LEN {
            return Err(ConfigError::Invalid(format!(
                "password exceeds {PASSWORD_LEN} bytes"
            )));
        }
        if self.keepalive.is_zero() {
            return Err(ConfigError::Invalid("keepalive must be positive".into()));
        }
        if self.confirmation_timeout.is_zero()
            || self.session_timeout.is_zero()
            || self.connect_timeout.is_zero()
        {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.refresh_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Invalid(
                "refresh interval must be positive, use None to disable".into(),
            ));
        }
        if self.reconnect.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "reconnect backoff_factor must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the TCP connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl From<GatewayConfigFile> for GatewayConfig {
    fn from(file: GatewayConfigFile) -> Self {
        let mut config = GatewayConfig::new(file.hostname, file.password);
        let defaults = ReconnectConfig::default();

        if let Some(port) = file.port {
            config.port = port;
        }
        config.refresh_interval = file
            .refresh_interval_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs);
        if let Some(secs) = file.keepalive_secs {
            config.keepalive = Duration::from_secs(secs);
        }
        if let Some(ms) = file.confirmation_timeout_ms {
            config.confirmation_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = file.session_timeout_secs {
            config.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        config.reconnect = ReconnectConfig {
            initial_delay: file
                .reconnect
                .initial_delay_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: file
                .reconnect
                .max_delay_secs
                .map_or(defaults.max_delay, Duration::from_secs),
            backoff_factor: file
                .reconnect
                .backoff_factor
                .unwrap_or(defaults.backoff_factor),
            unavailable_after: file
                .reconnect
                .unavailable_after
                .unwrap_or(defaults.unavailable_after),
        };
        if let Some(n) = file.transient_retries {
            config.transient_retries = n;
        }
        if let Some(b) = file.refresh_on_connect {
            config.refresh_on_connect = b;
        }
        if let Some(policy) = file.resync {
            config.resync = policy;
        }
        config
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("refresh_interval", &self.refresh_interval)
            .field("keepalive", &self.keepalive)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("session_timeout", &self.session_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect", &self.reconnect)
            .field("transient_retries", &self.transient_retries)
            .field("refresh_on_connect", &self.refresh_on_connect)
            .field("resync", &self.resync)
            .finish()
    }
}
