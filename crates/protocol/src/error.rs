//! Error types attached to failed commands.

use crate::frame::FrameError;

/// Reason a command ended in the `Error` state.
///
/// Every variant is resolved into the command itself; callers inspect it
/// through [`Command::error`](crate::Command::error) instead of receiving it
/// as a `Result`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A well-formed frame the command does not know how to handle.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Rejected(Rejection),

    #[error("timed out waiting for the gateway")]
    Timeout,

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("processor shut down")]
    Shutdown,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CommandError {
    /// Whether re-submitting the same command may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected(r) if r.is_transient())
    }
}

/// Gateway error numbers carried by `GW_ERROR_NTF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    Undefined,
    UnknownCommand,
    FrameStructure,
    Busy,
    BadSystemTableIndex,
    NotAuthenticated,
    Other(u8),
}

impl From<u8> for GatewayErrorCode {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Undefined,
            1 => Self::UnknownCommand,
            2 => Self::FrameStructure,
            7 => Self::Busy,
            8 => Self::BadSystemTableIndex,
            12 => Self::NotAuthenticated,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined error"),
            Self::UnknownCommand => f.write_str("unknown command"),
            Self::FrameStructure => f.write_str("frame structure error"),
            Self::Busy => f.write_str("gateway busy"),
            Self::BadSystemTableIndex => f.write_str("bad system table index"),
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::Other(v) => write!(f, "gateway error {v}"),
        }
    }
}

/// The gateway explicitly refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("rejected")]
    Rejected,

    #[error("unknown node id")]
    UnknownNodeId,

    #[error("session id in use")]
    SessionInUse,

    #[error("no free session slots")]
    NoFreeSession,

    #[error("illegal parameter")]
    IllegalParameter,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("wrong password")]
    WrongPassword,

    #[error("{0}")]
    Gateway(GatewayErrorCode),

    #[error("unknown status {0}")]
    Unknown(u8),
}

impl Rejection {
    /// Status byte of a node/mode confirmation:
    /// 0 accepted, 1 rejected, 2 unknown id, 3 session in use,
    /// 4 no free session, 5 illegal parameter.
    ///
    /// Returns `None` for 0.
    pub fn from_status(status: u8) -> Option<Self> {
        match status {
            0 => None,
            1 => Some(Self::Rejected),
            2 => Some(Self::UnknownNodeId),
            3 => Some(Self::SessionInUse),
            4 => Some(Self::NoFreeSession),
            5 => Some(Self::IllegalParameter),
            other => Some(Self::Unknown(other)),
        }
    }

    /// "No free session slots" and "busy" clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoFreeSession | Self::Gateway(GatewayErrorCode::Busy)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Rejection::from_status(0), None);
        assert_eq!(Rejection::from_status(1), Some(Rejection::Rejected));
        assert_eq!(Rejection::from_status(2), Some(Rejection::UnknownNodeId));
        assert_eq!(Rejection::from_status(3), Some(Rejection::SessionInUse));
        assert_eq!(Rejection::from_status(4), Some(Rejection::NoFreeSession));
        assert_eq!(Rejection::from_status(5), Some(Rejection::IllegalParameter));
        assert_eq!(Rejection::from_status(9), Some(Rejection::Unknown(9)));
    }

    #[test]
    fn detail_strings_are_distinct() {
        let details: Vec<String> = (1..=5)
            .filter_map(Rejection::from_status)
            .map(|r| CommandError::Rejected(r).to_string())
            .collect();
        assert_eq!(details[1], "unknown node id");
        for (i, a) in details.iter().enumerate() {
            for b in &details[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn transient_class() {
        assert!(Rejection::NoFreeSession.is_transient());
        assert!(Rejection::Gateway(GatewayErrorCode::Busy).is_transient());
        assert!(!Rejection::IllegalParameter.is_transient());
        assert!(!Rejection::SessionInUse.is_transient());
        assert!(CommandError::Rejected(Rejection::NoFreeSession).is_transient());
        assert!(!CommandError::Timeout.is_transient());
    }

    #[test]
    fn gateway_error_codes() {
        assert_eq!(GatewayErrorCode::from(7), GatewayErrorCode::Busy);
        assert_eq!(GatewayErrorCode::from(12), GatewayErrorCode::NotAuthenticated);
        assert_eq!(GatewayErrorCode::from(99), GatewayErrorCode::Other(99));
        assert_eq!(
            CommandError::Rejected(Rejection::Gateway(GatewayErrorCode::Busy)).to_string(),
            "gateway busy"
        );
    }

    #[test]
    fn error_display() {
        assert_eq!(CommandError::Timeout.to_string(), "timed out waiting for the gateway");
        assert_eq!(CommandError::Shutdown.to_string(), "processor shut down");
        assert_eq!(
            CommandError::Connectivity("reset".into()).to_string(),
            "connectivity error: reset"
        );
    }
}
