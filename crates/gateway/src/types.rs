//! Public types for the gateway connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use klf200_protocol::{GatewayVersion, ProtocolVersion};

/// Connection state of the gateway link.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// TCP connect and login in progress.
    Connecting,
    /// Connected and authenticated.
    Connected,
    /// Connection lost, attempting to reconnect.
    Reconnecting { attempt: u32 },
    /// Repeated reconnects failed. Attempts continue in the background.
    Unavailable,
    /// Shut down.
    Disconnected,
}

/// What to do when the byte stream cannot be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Discard one byte and try to frame again.
    #[default]
    DropByte,
    /// Drop the connection and reconnect.
    Reconnect,
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Consecutive failures after which the unit is reported unavailable.
    pub unavailable_after: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            unavailable_after: 3,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Gateway properties read after each successful login.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GatewayProperties {
    pub version: Option<GatewayVersion>,
    pub protocol: Option<ProtocolVersion>,
}
