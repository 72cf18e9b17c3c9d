use chrono::{DateTime, Utc};

use crate::constants::{CommandCode, PASSWORD_LEN};
use crate::error::{CommandError, Rejection};
use crate::types::{GatewayState, GatewayVersion, ProtocolVersion};

use super::{Exchange, Step, require, unexpected};

/// Fails with a protocol error when a confirmation cannot be parsed.
fn parsed<T>(code: CommandCode, value: Option<T>, slot: &mut Option<T>) -> Step {
    match value {
        Some(v) => {
            *slot = Some(v);
            Step::Complete
        }
        None => Step::Fail(CommandError::Protocol(format!("malformed {code}"))),
    }
}

/// Reads the gateway state. Used as the keep-alive.
#[derive(Debug, Clone, Default)]
pub struct Ping {
    state: Option<GatewayState>,
}

impl Ping {
    pub fn state(&self) -> Option<GatewayState> {
        self.state
    }
}

impl Exchange for Ping {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetStateCfm => parsed(code, GatewayState::parse(payload), &mut self.state),
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetVersion {
    version: Option<GatewayVersion>,
}

impl GetVersion {
    pub fn version(&self) -> Option<&GatewayVersion> {
        self.version.as_ref()
    }
}

impl Exchange for GetVersion {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetVersionCfm => {
                parsed(code, GatewayVersion::parse(payload), &mut self.version)
            }
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetProtocol {
    version: Option<ProtocolVersion>,
}

impl GetProtocol {
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }
}

impl Exchange for GetProtocol {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetProtocolVersionCfm => {
                parsed(code, ProtocolVersion::parse(payload), &mut self.version)
            }
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Sets the gateway clock (UTC seconds).
#[derive(Debug, Clone)]
pub struct SetTime {
    time: DateTime<Utc>,
}

impl SetTime {
    pub(crate) fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Exchange for SetTime {
    fn pack(&self, _session: u16) -> Vec<u8> {
        let secs = u32::try_from(self.time.timestamp().max(0)).unwrap_or(u32::MAX);
        secs.to_be_bytes().to_vec()
    }

    fn on_frame(&mut self, code: CommandCode, _payload: &[u8]) -> Step {
        match code {
            CommandCode::SetUtcCfm => Step::Complete,
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Turns on unsolicited node state/position notifications.
#[derive(Debug, Clone, Default)]
pub struct EnableHomeStatusMonitor;

impl Exchange for EnableHomeStatusMonitor {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, _payload: &[u8]) -> Step {
        match code {
            CommandCode::HouseStatusMonitorEnableCfm => Step::Complete,
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Password exchange performed once per connection.
#[derive(Clone)]
pub struct Login {
    password: String,
}

impl Login {
    pub(crate) fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login").field("password", &"<redacted>").finish()
    }
}

impl Exchange for Login {
    fn pack(&self, _session: u16) -> Vec<u8> {
        let mut data = vec![0u8; PASSWORD_LEN];
        let bytes = self.password.as_bytes();
        let len = bytes.len().min(PASSWORD_LEN);
        data[..len].copy_from_slice(&bytes[..len]);
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::PasswordEnterCfm => {
                if let Err(step) = require(code, payload, 1) {
                    return step;
                }
                if payload[0] == 0 {
                    Step::Complete
                } else {
                    Step::Fail(CommandError::Rejected(Rejection::WrongPassword))
                }
            }
            other => Step::Fail(unexpected(other.code())),
        }
    }
}
