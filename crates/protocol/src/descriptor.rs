//! Command descriptor table and frame routing helpers.
//!
//! Each [`CommandKind`] maps to the opcode it sends and the opcodes it
//! expects back. The processor uses this table, together with the session
//! and node fields extracted here, to decide whether an inbound frame
//! belongs to the active command or is an unsolicited event.

use crate::constants::{CommandCode, NAME_LEN, PASSWORD_LEN};
use crate::frame::Frame;
use crate::types::{VeluxPosition, be16};

use CommandCode::*;

/// Every operation the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    GetNode,
    GetAllNodes,
    GetAllScenes,
    ExecuteScene,
    StopScene,
    SendPosition,
    SendMode,
    SetVelocity,
    SetNodeName,
    EnableHomeStatusMonitor,
    Ping,
    GetVersion,
    GetProtocol,
    SetTime,
    Login,
    Terminate,
}

/// How long the processor waits for a command to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitClass {
    /// A single confirmation ends the exchange.
    Confirmation,
    /// Confirmation followed by a notification sequence.
    Sequence,
}

/// Static description of one command kind.
#[derive(Debug)]
pub struct CommandDescriptor {
    /// Request opcode. `None` for commands never sent to the gateway.
    pub request: Option<CommandCode>,
    pub confirmations: &'static [CommandCode],
    pub notifications: &'static [CommandCode],
    /// Whether the request carries a session id.
    pub uses_session: bool,
    /// Largest payload the request may carry.
    pub max_payload: usize,
    pub wait: WaitClass,
}

impl CommandDescriptor {
    /// Whether `code` is a response this command understands.
    ///
    /// `GW_ERROR_NTF` is accepted by every command sent to the wire.
    pub fn expects(&self, code: CommandCode) -> bool {
        if self.request.is_none() {
            return false;
        }
        code == ErrorNtf || self.confirmations.contains(&code) || self.notifications.contains(&code)
    }
}

const SESSION_PROGRESS: &[CommandCode] = &[
    CommandRunStatusNtf,
    CommandRemainingTimeNtf,
    SessionFinishedNtf,
];

static GET_NODE: CommandDescriptor = CommandDescriptor {
    request: Some(GetNodeInformationReq),
    confirmations: &[GetNodeInformationCfm],
    notifications: &[GetNodeInformationNtf],
    uses_session: false,
    max_payload: 1,
    wait: WaitClass::Confirmation,
};

static GET_ALL_NODES: CommandDescriptor = CommandDescriptor {
    request: Some(GetAllNodesInformationReq),
    confirmations: &[GetAllNodesInformationCfm],
    notifications: &[GetAllNodesInformationNtf, GetAllNodesInformationFinishedNtf],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Sequence,
};

static GET_ALL_SCENES: CommandDescriptor = CommandDescriptor {
    request: Some(GetSceneListReq),
    confirmations: &[GetSceneListCfm],
    notifications: &[GetSceneListNtf],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Sequence,
};

static EXECUTE_SCENE: CommandDescriptor = CommandDescriptor {
    request: Some(ActivateSceneReq),
    confirmations: &[ActivateSceneCfm],
    notifications: SESSION_PROGRESS,
    uses_session: true,
    max_payload: 6,
    wait: WaitClass::Sequence,
};

static STOP_SCENE: CommandDescriptor = CommandDescriptor {
    request: Some(StopSceneReq),
    confirmations: &[StopSceneCfm],
    notifications: &[],
    uses_session: true,
    max_payload: 5,
    wait: WaitClass::Confirmation,
};

static SEND_POSITION: CommandDescriptor = CommandDescriptor {
    request: Some(CommandSendReq),
    confirmations: &[CommandSendCfm],
    notifications: SESSION_PROGRESS,
    uses_session: true,
    max_payload: 66,
    wait: WaitClass::Sequence,
};

static SEND_MODE: CommandDescriptor = CommandDescriptor {
    request: Some(ModeSendReq),
    confirmations: &[ModeSendCfm],
    notifications: SESSION_PROGRESS,
    uses_session: true,
    max_payload: 66,
    wait: WaitClass::Sequence,
};

static SET_VELOCITY: CommandDescriptor = CommandDescriptor {
    request: Some(SetNodeVelocityReq),
    confirmations: &[SetNodeVelocityCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 3,
    wait: WaitClass::Confirmation,
};

static SET_NODE_NAME: CommandDescriptor = CommandDescriptor {
    request: Some(SetNodeNameReq),
    confirmations: &[SetNodeNameCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 1 + NAME_LEN,
    wait: WaitClass::Confirmation,
};

static ENABLE_HOME_STATUS_MONITOR: CommandDescriptor = CommandDescriptor {
    request: Some(HouseStatusMonitorEnableReq),
    confirmations: &[HouseStatusMonitorEnableCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Confirmation,
};

static PING: CommandDescriptor = CommandDescriptor {
    request: Some(GetStateReq),
    confirmations: &[GetStateCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Confirmation,
};

static GET_VERSION: CommandDescriptor = CommandDescriptor {
    request: Some(GetVersionReq),
    confirmations: &[GetVersionCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Confirmation,
};

static GET_PROTOCOL: CommandDescriptor = CommandDescriptor {
    request: Some(GetProtocolVersionReq),
    confirmations: &[GetProtocolVersionCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Confirmation,
};

static SET_TIME: CommandDescriptor = CommandDescriptor {
    request: Some(SetUtcReq),
    confirmations: &[SetUtcCfm],
    notifications: &[],
    uses_session: false,
    max_payload: 4,
    wait: WaitClass::Confirmation,
};

static LOGIN: CommandDescriptor = CommandDescriptor {
    request: Some(PasswordEnterReq),
    confirmations: &[PasswordEnterCfm],
    notifications: &[],
    uses_session: false,
    max_payload: PASSWORD_LEN,
    wait: WaitClass::Confirmation,
};

static TERMINATE: CommandDescriptor = CommandDescriptor {
    request: None,
    confirmations: &[],
    notifications: &[],
    uses_session: false,
    max_payload: 0,
    wait: WaitClass::Confirmation,
};

impl CommandKind {
    pub fn descriptor(self) -> &'static CommandDescriptor {
        match self {
            Self::GetNode => &GET_NODE,
            Self::GetAllNodes => &GET_ALL_NODES,
            Self::GetAllScenes => &GET_ALL_SCENES,
            Self::ExecuteScene => &EXECUTE_SCENE,
            Self::StopScene => &STOP_SCENE,
            Self::SendPosition => &SEND_POSITION,
            Self::SendMode => &SEND_MODE,
            Self::SetVelocity => &SET_VELOCITY,
            Self::SetNodeName => &SET_NODE_NAME,
            Self::EnableHomeStatusMonitor => &ENABLE_HOME_STATUS_MONITOR,
            Self::Ping => &PING,
            Self::GetVersion => &GET_VERSION,
            Self::GetProtocol => &GET_PROTOCOL,
            Self::SetTime => &SET_TIME,
            Self::Login => &LOGIN,
            Self::Terminate => &TERMINATE,
        }
    }
}

/// Session id carried by a frame, if its opcode has one.
pub fn session_of(code: CommandCode, payload: &[u8]) -> Option<u16> {
    let offset = match code {
        CommandSendCfm | ModeSendCfm | CommandRunStatusNtf | CommandRemainingTimeNtf
        | SessionFinishedNtf => 0,
        ActivateSceneCfm | StopSceneCfm => 1,
        _ => return None,
    };
    (payload.len() >= offset + 2).then(|| be16(payload, offset))
}

/// Node id carried by a node-addressed frame.
pub fn node_of(code: CommandCode, payload: &[u8]) -> Option<u8> {
    let offset = match code {
        GetNodeInformationCfm | SetNodeNameCfm | SetNodeVelocityCfm => 1,
        GetNodeInformationNtf
        | GetAllNodesInformationNtf
        | NodeStatePositionChangedNtf
        | NodeInformationChangedNtf => 0,
        CommandRunStatusNtf => 3,
        CommandRemainingTimeNtf => 2,
        _ => return None,
    };
    payload.get(offset).copied()
}

/// A node reported a new position outside of any command it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: u8,
    pub position: VeluxPosition,
}

/// Extracts a position event from an unsolicited frame.
///
/// Run status notifications only count when they report the main
/// parameter; functional parameters are not positions of the node.
pub fn node_event(frame: &Frame) -> Option<NodeEvent> {
    let code = CommandCode::from_u16(frame.code)?;
    let p = &frame.payload;
    let (node_id, offset) = match code {
        NodeStatePositionChangedNtf if p.len() >= 4 => (p[0], 2),
        GetNodeInformationNtf | GetAllNodesInformationNtf if p.len() >= 87 => (p[0], 85),
        CommandRunStatusNtf if p.len() >= 7 && p[4] == 0 => (p[3], 5),
        _ => return None,
    };
    Some(NodeEvent {
        node_id,
        position: VeluxPosition::new(be16(p, offset)),
    })
}

/// Seconds left in a session, from `GW_COMMAND_REMAINING_TIME_NTF`.
pub fn remaining_seconds(frame: &Frame) -> Option<u16> {
    (frame.code == CommandRemainingTimeNtf.code() && frame.payload.len() >= 6)
        .then(|| be16(&frame.payload, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CommandKind; 16] = [
        CommandKind::GetNode,
        CommandKind::GetAllNodes,
        CommandKind::GetAllScenes,
        CommandKind::ExecuteScene,
        CommandKind::StopScene,
        CommandKind::SendPosition,
        CommandKind::SendMode,
        CommandKind::SetVelocity,
        CommandKind::SetNodeName,
        CommandKind::EnableHomeStatusMonitor,
        CommandKind::Ping,
        CommandKind::GetVersion,
        CommandKind::GetProtocol,
        CommandKind::SetTime,
        CommandKind::Login,
        CommandKind::Terminate,
    ];

    #[test]
    fn every_wire_command_has_a_confirmation() {
        for kind in ALL {
            let d = kind.descriptor();
            match d.request {
                Some(req) => {
                    assert!(!d.confirmations.is_empty(), "{kind:?}");
                    assert!(!d.expects(req), "{kind:?} expects its own request");
                    assert!(d.expects(ErrorNtf), "{kind:?}");
                }
                None => assert_eq!(kind, CommandKind::Terminate),
            }
        }
    }

    #[test]
    fn session_commands() {
        let with_session: Vec<_> = ALL
            .iter()
            .filter(|k| k.descriptor().uses_session)
            .copied()
            .collect();
        assert_eq!(
            with_session,
            vec![
                CommandKind::ExecuteScene,
                CommandKind::StopScene,
                CommandKind::SendPosition,
                CommandKind::SendMode
            ]
        );
    }

    #[test]
    fn terminate_expects_nothing() {
        assert!(!CommandKind::Terminate.descriptor().expects(ErrorNtf));
    }

    #[test]
    fn session_offsets() {
        assert_eq!(session_of(ModeSendCfm, &[0x12, 0x34, 0]), Some(0x1234));
        assert_eq!(session_of(ActivateSceneCfm, &[0, 0x00, 0x09]), Some(9));
        assert_eq!(session_of(SessionFinishedNtf, &[0x00]), None);
        assert_eq!(session_of(GetStateCfm, &[0, 0, 0]), None);
    }

    #[test]
    fn node_offsets() {
        assert_eq!(node_of(SetNodeNameCfm, &[0, 4]), Some(4));
        assert_eq!(node_of(NodeStatePositionChangedNtf, &[9, 5]), Some(9));
        assert_eq!(node_of(GetVersionCfm, &[1, 2]), None);
    }

    #[test]
    fn position_changed_event() {
        let frame = Frame::new(0x0211, vec![7, 5, 0x64, 0x00, 0xC8, 0x00]);
        let event = node_event(&frame).unwrap();
        assert_eq!(event.node_id, 7);
        assert_eq!(event.position.percent_open(), Some(50));
    }

    #[test]
    fn run_status_event_only_for_main_parameter() {
        let mut payload = vec![0, 1, 0, 4, 0, 0xC8, 0x00, 0, 1];
        let event = node_event(&Frame::new(0x0302, payload.clone())).unwrap();
        assert_eq!(event.node_id, 4);
        assert_eq!(event.position.raw(), 0xC800);

        payload[4] = 1;
        assert_eq!(node_event(&Frame::new(0x0302, payload)), None);
    }

    #[test]
    fn non_event_frames() {
        assert_eq!(node_event(&Frame::new(0x0304, vec![0, 1])), None);
        assert_eq!(node_event(&Frame::new(0x9999, vec![1, 2, 3, 4])), None);
        assert_eq!(node_event(&Frame::new(0x0211, vec![1, 2])), None);
    }

    #[test]
    fn remaining_time_seconds() {
        let frame = Frame::new(0x0303, vec![0, 7, 5, 0, 0x01, 0x2C]);
        assert_eq!(remaining_seconds(&frame), Some(300));
        assert_eq!(remaining_seconds(&Frame::new(0x0303, vec![0, 7, 5])), None);
        assert_eq!(remaining_seconds(&Frame::new(0x0302, vec![0, 7, 5, 0, 0, 1])), None);
    }
}
