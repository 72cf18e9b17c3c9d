use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TCP port of the gateway API.
pub const DEFAULT_PORT: u16 = 51200;

/// Largest payload a single frame can carry.
///
/// The length byte counts the two opcode bytes plus the payload and must
/// fit in a `u8`; the gateway itself never sends more than 250 bytes.
pub const MAX_PAYLOAD: usize = 250;

/// Bytes of framing around a payload: length, two opcode bytes, checksum.
pub const FRAME_OVERHEAD: usize = 4;

/// Fixed size of the password field in the login request.
pub const PASSWORD_LEN: usize = 32;

/// Fixed size of node and scene name fields.
pub const NAME_LEN: usize = 64;

/// Maximum nodes addressed by one command or mode request.
pub const MAX_NODES_PER_REQUEST: usize = 20;

/// Number of functional parameters (FP1..FP16) besides the main parameter.
pub const FUNCTIONAL_PARAMETERS: u8 = 16;

/// The gateway closes idle sockets after roughly 15 minutes.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(600);

/// Time to wait for a confirmation to a session-less request.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Time to wait for a session to finish (CFM + progress notifications).
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed to open the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// KLF200 API opcode.
///
/// Requests end in `Req`, confirmations in `Cfm` and notifications in `Ntf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CommandCode {
    ErrorNtf = 0x0000,

    // Gateway
    GetVersionReq = 0x0008,
    GetVersionCfm = 0x0009,
    GetProtocolVersionReq = 0x000A,
    GetProtocolVersionCfm = 0x000B,
    GetStateReq = 0x000C,
    GetStateCfm = 0x000D,

    // Nodes
    GetNodeInformationReq = 0x0200,
    GetNodeInformationCfm = 0x0201,
    GetAllNodesInformationReq = 0x0202,
    GetAllNodesInformationCfm = 0x0203,
    GetAllNodesInformationNtf = 0x0204,
    GetAllNodesInformationFinishedNtf = 0x0205,
    SetNodeNameReq = 0x0208,
    SetNodeNameCfm = 0x0209,
    SetNodeVelocityReq = 0x020A,
    SetNodeVelocityCfm = 0x020B,
    NodeInformationChangedNtf = 0x020C,
    GetNodeInformationNtf = 0x0210,
    NodeStatePositionChangedNtf = 0x0211,

    // House status monitor
    HouseStatusMonitorEnableReq = 0x0240,
    HouseStatusMonitorEnableCfm = 0x0241,

    // Actuation
    CommandSendReq = 0x0300,
    CommandSendCfm = 0x0301,
    CommandRunStatusNtf = 0x0302,
    CommandRemainingTimeNtf = 0x0303,
    SessionFinishedNtf = 0x0304,
    ModeSendReq = 0x0320,
    ModeSendCfm = 0x0321,

    // Scenes
    GetSceneListReq = 0x040C,
    GetSceneListCfm = 0x040D,
    GetSceneListNtf = 0x040E,
    ActivateSceneReq = 0x0412,
    ActivateSceneCfm = 0x0413,
    StopSceneReq = 0x0415,
    StopSceneCfm = 0x0416,

    // Time
    SetUtcReq = 0x2000,
    SetUtcCfm = 0x2001,

    // Authentication
    PasswordEnterReq = 0x3000,
    PasswordEnterCfm = 0x3001,
}

impl CommandCode {
    const ALL: [CommandCode; 40] = [
        Self::ErrorNtf,
        Self::GetVersionReq,
        Self::GetVersionCfm,
        Self::GetProtocolVersionReq,
        Self::GetProtocolVersionCfm,
        Self::GetStateReq,
        Self::GetStateCfm,
        Self::GetNodeInformationReq,
        Self::GetNodeInformationCfm,
        Self::GetAllNodesInformationReq,
        Self::GetAllNodesInformationCfm,
        Self::GetAllNodesInformationNtf,
        Self::GetAllNodesInformationFinishedNtf,
        Self::SetNodeNameReq,
        Self::SetNodeNameCfm,
        Self::SetNodeVelocityReq,
        Self::SetNodeVelocityCfm,
        Self::NodeInformationChangedNtf,
        Self::GetNodeInformationNtf,
        Self::NodeStatePositionChangedNtf,
        Self::HouseStatusMonitorEnableReq,
        Self::HouseStatusMonitorEnableCfm,
        Self::CommandSendReq,
        Self::CommandSendCfm,
        Self::CommandRunStatusNtf,
        Self::CommandRemainingTimeNtf,
        Self::SessionFinishedNtf,
        Self::ModeSendReq,
        Self::ModeSendCfm,
        Self::GetSceneListReq,
        Self::GetSceneListCfm,
        Self::GetSceneListNtf,
        Self::ActivateSceneReq,
        Self::ActivateSceneCfm,
        Self::StopSceneReq,
        Self::StopSceneCfm,
        Self::SetUtcReq,
        Self::SetUtcCfm,
        Self::PasswordEnterReq,
        Self::PasswordEnterCfm,
    ];

    /// Returns the raw 16-bit opcode.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Resolves a raw opcode. Unknown codes yield `None`.
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({:#06x})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u16_resolves_every_code() {
        for code in CommandCode::ALL {
            assert_eq!(CommandCode::from_u16(code.code()), Some(code));
        }
    }

    #[test]
    fn from_u16_unknown() {
        assert_eq!(CommandCode::from_u16(0x0001), None);
        assert_eq!(CommandCode::from_u16(0xFFFF), None);
    }

    #[test]
    fn wire_values() {
        assert_eq!(CommandCode::PasswordEnterReq.code(), 0x3000);
        assert_eq!(CommandCode::SessionFinishedNtf.code(), 0x0304);
        assert_eq!(CommandCode::NodeStatePositionChangedNtf.code(), 0x0211);
    }

    #[test]
    fn display_includes_hex() {
        assert_eq!(
            CommandCode::ModeSendCfm.to_string(),
            "ModeSendCfm(0x0321)"
        );
    }

    #[test]
    fn max_payload_fits_length_byte() {
        assert!(MAX_PAYLOAD + 3 <= u8::MAX as usize);
    }
}
