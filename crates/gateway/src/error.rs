use klf200_protocol::FrameError;

use crate::config::ConfigError;

/// Errors from the gateway link.
///
/// These never reach callers of the command API; a failed link resolves
/// the active command with a connectivity error instead.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}
