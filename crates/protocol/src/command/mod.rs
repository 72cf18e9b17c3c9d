//! Commands: one unit of work against the gateway.
//!
//! A [`Command`] is created with all of its inputs bound, handed to the
//! processor, and driven from `Pending` to exactly one of `Complete` or
//! `Error` by [`Command::handle_response`]. Terminal states are absorbing.
//!
//! Each operation is a variant of [`Operation`]. Variants serialise their
//! own request payload and interpret the confirmations and notifications
//! listed for them in the descriptor table.

mod actuate;
mod gateway;
mod node;
mod scene;

use chrono::{DateTime, Utc};
use tracing::{debug, error, trace, warn};

use crate::constants::{CommandCode, MAX_NODES_PER_REQUEST, NAME_LEN, PASSWORD_LEN};
use crate::descriptor::{self, CommandDescriptor, CommandKind};
use crate::error::{CommandError, GatewayErrorCode, Rejection};
use crate::frame::Frame;
use crate::types::{
    GatewayState, GatewayVersion, ModeInstruction, PositionInstruction, ProtocolVersion,
    Velocity, VeluxNode, VeluxScene,
};

pub use actuate::{RunReport, SendMode, SendPosition};
pub use gateway::{EnableHomeStatusMonitor, GetProtocol, GetVersion, Login, Ping, SetTime};
pub use node::{GetAllNodes, GetNode, SetNodeName, SetVelocity};
pub use scene::{ExecuteScene, GetAllScenes, StopScene};

/// `CommandOriginator` byte: the request comes from a user.
pub(crate) const ORIGINATOR_USER: u8 = 1;

/// `PriorityLevel` byte: user level 2.
pub(crate) const PRIORITY_USER: u8 = 3;

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Complete,
    Error,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome of feeding one frame to an operation.
#[derive(Debug)]
pub(crate) enum Step {
    /// More frames are expected.
    Continue,
    Complete,
    Fail(CommandError),
}

/// Request serialisation and response interpretation for one operation.
pub(crate) trait Exchange {
    fn pack(&self, session: u16) -> Vec<u8>;

    /// Handles a frame whose opcode is listed in the operation's
    /// descriptor (error notifications excluded).
    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step;
}

/// The typed operation carried by a command.
#[derive(Debug, Clone)]
pub enum Operation {
    GetNode(GetNode),
    GetAllNodes(GetAllNodes),
    GetAllScenes(GetAllScenes),
    ExecuteScene(ExecuteScene),
    StopScene(StopScene),
    SendPosition(SendPosition),
    SendMode(SendMode),
    SetVelocity(SetVelocity),
    SetNodeName(SetNodeName),
    EnableHomeStatusMonitor(EnableHomeStatusMonitor),
    Ping(Ping),
    GetVersion(GetVersion),
    GetProtocol(GetProtocol),
    SetTime(SetTime),
    Login(Login),
    Terminate,
}

impl Operation {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::GetNode(_) => CommandKind::GetNode,
            Self::GetAllNodes(_) => CommandKind::GetAllNodes,
            Self::GetAllScenes(_) => CommandKind::GetAllScenes,
            Self::ExecuteScene(_) => CommandKind::ExecuteScene,
            Self::StopScene(_) => CommandKind::StopScene,
            Self::SendPosition(_) => CommandKind::SendPosition,
            Self::SendMode(_) => CommandKind::SendMode,
            Self::SetVelocity(_) => CommandKind::SetVelocity,
            Self::SetNodeName(_) => CommandKind::SetNodeName,
            Self::EnableHomeStatusMonitor(_) => CommandKind::EnableHomeStatusMonitor,
            Self::Ping(_) => CommandKind::Ping,
            Self::GetVersion(_) => CommandKind::GetVersion,
            Self::GetProtocol(_) => CommandKind::GetProtocol,
            Self::SetTime(_) => CommandKind::SetTime,
            Self::Login(_) => CommandKind::Login,
            Self::Terminate => CommandKind::Terminate,
        }
    }

    fn exchange(&self) -> Option<&dyn Exchange> {
        let ex: &dyn Exchange = match self {
            Self::GetNode(op) => op,
            Self::GetAllNodes(op) => op,
            Self::GetAllScenes(op) => op,
            Self::ExecuteScene(op) => op,
            Self::StopScene(op) => op,
            Self::SendPosition(op) => op,
            Self::SendMode(op) => op,
            Self::SetVelocity(op) => op,
            Self::SetNodeName(op) => op,
            Self::EnableHomeStatusMonitor(op) => op,
            Self::Ping(op) => op,
            Self::GetVersion(op) => op,
            Self::GetProtocol(op) => op,
            Self::SetTime(op) => op,
            Self::Login(op) => op,
            Self::Terminate => return None,
        };
        Some(ex)
    }

    fn exchange_mut(&mut self) -> Option<&mut dyn Exchange> {
        let ex: &mut dyn Exchange = match self {
            Self::GetNode(op) => op,
            Self::GetAllNodes(op) => op,
            Self::GetAllScenes(op) => op,
            Self::ExecuteScene(op) => op,
            Self::StopScene(op) => op,
            Self::SendPosition(op) => op,
            Self::SendMode(op) => op,
            Self::SetVelocity(op) => op,
            Self::SetNodeName(op) => op,
            Self::EnableHomeStatusMonitor(op) => op,
            Self::Ping(op) => op,
            Self::GetVersion(op) => op,
            Self::GetProtocol(op) => op,
            Self::SetTime(op) => op,
            Self::Login(op) => op,
            Self::Terminate => return None,
        };
        Some(ex)
    }

    /// Node a node-addressed request targets.
    fn target_node(&self) -> Option<u8> {
        match self {
            Self::GetNode(op) => Some(op.node_id()),
            Self::SetVelocity(op) => Some(op.node_id()),
            Self::SetNodeName(op) => Some(op.node_id()),
            _ => None,
        }
    }
}

/// A unit of work submitted to the processor.
#[derive(Debug, Clone)]
pub struct Command {
    op: Operation,
    status: CommandStatus,
    session: Option<u16>,
    error: Option<CommandError>,
}

impl Command {
    fn new(op: Operation) -> Self {
        Self {
            op,
            status: CommandStatus::Pending,
            session: None,
            error: None,
        }
    }

    pub fn get_node(node_id: u8) -> Self {
        Self::new(Operation::GetNode(GetNode::new(node_id)))
    }

    pub fn get_all_nodes() -> Self {
        Self::new(Operation::GetAllNodes(GetAllNodes::default()))
    }

    pub fn get_all_scenes() -> Self {
        Self::new(Operation::GetAllScenes(GetAllScenes::default()))
    }

    pub fn execute_scene(scene_id: u8, velocity: Velocity) -> Self {
        Self::new(Operation::ExecuteScene(ExecuteScene::new(scene_id, velocity)))
    }

    pub fn stop_scene(scene_id: u8) -> Self {
        Self::new(Operation::StopScene(StopScene::new(scene_id)))
    }

    /// Moves one or more nodes. All instructions share one parameter
    /// vector, so two instructions may not set the same function to
    /// different positions.
    pub fn send_position(instructions: Vec<PositionInstruction>) -> Result<Self, CommandError> {
        check_batch(instructions.len())?;
        Ok(Self::new(Operation::SendPosition(SendPosition::new(
            instructions,
        )?)))
    }

    /// Sends a mode to one or more nodes. Every instruction must carry the
    /// same mode number and parameter.
    pub fn send_mode(instructions: Vec<ModeInstruction>) -> Result<Self, CommandError> {
        check_batch(instructions.len())?;
        Ok(Self::new(Operation::SendMode(SendMode::new(instructions)?)))
    }

    pub fn set_velocity(node_id: u8, velocity: Velocity) -> Self {
        Self::new(Operation::SetVelocity(SetVelocity::new(node_id, velocity)))
    }

    /// Renames a node. Names longer than 64 UTF-8 bytes are rejected here.
    pub fn set_node_name(node_id: u8, name: &str) -> Result<Self, CommandError> {
        if !is_name_length_valid(name) {
            return Err(CommandError::InvalidParameter(format!(
                "node name is {} bytes (max {NAME_LEN})",
                name.len()
            )));
        }
        Ok(Self::new(Operation::SetNodeName(SetNodeName::new(
            node_id, name,
        ))))
    }

    pub fn enable_home_status_monitor() -> Self {
        Self::new(Operation::EnableHomeStatusMonitor(EnableHomeStatusMonitor))
    }

    pub fn ping() -> Self {
        Self::new(Operation::Ping(Ping::default()))
    }

    pub fn get_version() -> Self {
        Self::new(Operation::GetVersion(GetVersion::default()))
    }

    pub fn get_protocol() -> Self {
        Self::new(Operation::GetProtocol(GetProtocol::default()))
    }

    pub fn set_time(time: DateTime<Utc>) -> Self {
        Self::new(Operation::SetTime(SetTime::new(time)))
    }

    pub fn login(password: &str) -> Result<Self, CommandError> {
        if password.len() > PASSWORD_LEN {
            return Err(CommandError::InvalidParameter(format!(
                "password is {} bytes (max {PASSWORD_LEN})",
                password.len()
            )));
        }
        Ok(Self::new(Operation::Login(Login::new(password))))
    }

    /// The poison pill that stops the processor. Never sent to the wire.
    pub fn terminate() -> Self {
        Self::new(Operation::Terminate)
    }

    pub fn kind(&self) -> CommandKind {
        self.op.kind()
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.kind().descriptor()
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Session correlating this command's responses, once assigned.
    pub fn session_id(&self) -> Option<u16> {
        self.session
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// Human readable reason of an `Error` status.
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Binds the session id. Ignored for session-less commands.
    pub fn assign_session(&mut self, session: u16) {
        if self.descriptor().uses_session {
            self.session = Some(session);
        }
    }

    /// Request payload for the current bindings.
    pub fn pack(&self) -> Vec<u8> {
        self.op
            .exchange()
            .map(|ex| ex.pack(self.session.unwrap_or(0)))
            .unwrap_or_default()
    }

    /// Builds the request frame.
    pub fn to_frame(&self) -> Result<Frame, CommandError> {
        let descriptor = self.descriptor();
        let Some(request) = descriptor.request else {
            return Err(CommandError::InvalidParameter(format!(
                "{:?} is never sent to the gateway",
                self.kind()
            )));
        };
        let payload = self.pack();
        if payload.len() > descriptor.max_payload {
            return Err(CommandError::Frame(
                crate::frame::FrameError::PayloadTooLarge {
                    len: payload.len(),
                    max: descriptor.max_payload,
                },
            ));
        }
        Ok(Frame::new(request.code(), payload))
    }

    /// Whether an inbound frame belongs to this command.
    ///
    /// The opcode must be expected by the descriptor. Frames carrying a
    /// session must match this command's session, and node-addressed
    /// confirmations must match the requested node.
    pub fn accepts(&self, frame: &Frame) -> bool {
        let Some(code) = CommandCode::from_u16(frame.code) else {
            return false;
        };
        if !self.descriptor().expects(code) {
            return false;
        }
        if let Some(session) = descriptor::session_of(code, &frame.payload)
            && self.session != Some(session)
        {
            return false;
        }
        match (self.op.target_node(), descriptor::node_of(code, &frame.payload)) {
            (Some(want), Some(got)) => want == got,
            _ => true,
        }
    }

    /// Feeds one inbound frame to the command.
    ///
    /// Frames after a terminal state are ignored. Opcodes the command does
    /// not handle mark it `Error`; that indicates a broken descriptor table,
    /// not a device fault.
    pub fn handle_response(&mut self, frame: &Frame) {
        if self.is_terminal() {
            trace!(kind = ?self.kind(), code = %format_args!("{:#06x}", frame.code), "frame after terminal status ignored");
            return;
        }

        let code = CommandCode::from_u16(frame.code).filter(|c| self.descriptor().expects(*c));
        let step = match (code, self.op.exchange_mut()) {
            (Some(CommandCode::ErrorNtf), _) => {
                let errno = frame.payload.first().copied().unwrap_or(0);
                Step::Fail(CommandError::Rejected(Rejection::Gateway(
                    GatewayErrorCode::from(errno),
                )))
            }
            (Some(code), Some(ex)) => ex.on_frame(code, &frame.payload),
            _ => Step::Fail(unexpected(frame.code)),
        };

        match step {
            Step::Continue => {}
            Step::Complete => {
                debug!(kind = ?self.kind(), session = ?self.session, "command complete");
                self.status = CommandStatus::Complete;
            }
            Step::Fail(err) => self.fail(err),
        }
    }

    /// Forces the command into `Error`. No effect once terminal.
    pub fn fail(&mut self, err: CommandError) {
        if self.is_terminal() {
            return;
        }
        match &err {
            CommandError::Protocol(detail) => {
                error!(kind = ?self.kind(), %detail, "command received a response it cannot handle");
            }
            other => warn!(kind = ?self.kind(), session = ?self.session, error = %other, "command failed"),
        }
        self.status = CommandStatus::Error;
        self.error = Some(err);
    }

    /// Node returned by a get-node command.
    pub fn node(&self) -> Option<&VeluxNode> {
        match &self.op {
            Operation::GetNode(op) => op.node(),
            _ => None,
        }
    }

    /// Nodes collected by a get-all-nodes command.
    pub fn nodes(&self) -> &[VeluxNode] {
        match &self.op {
            Operation::GetAllNodes(op) => op.nodes(),
            _ => &[],
        }
    }

    pub fn scenes(&self) -> &[VeluxScene] {
        match &self.op {
            Operation::GetAllScenes(op) => op.scenes(),
            _ => &[],
        }
    }

    pub fn version(&self) -> Option<&GatewayVersion> {
        match &self.op {
            Operation::GetVersion(op) => op.version(),
            _ => None,
        }
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        match &self.op {
            Operation::GetProtocol(op) => op.version(),
            _ => None,
        }
    }

    pub fn gateway_state(&self) -> Option<GatewayState> {
        match &self.op {
            Operation::Ping(op) => op.state(),
            _ => None,
        }
    }

    /// Run status reports received while a session was open.
    pub fn run_reports(&self) -> &[RunReport] {
        match &self.op {
            Operation::SendPosition(op) => op.reports(),
            Operation::SendMode(op) => op.reports(),
            Operation::ExecuteScene(op) => op.reports(),
            _ => &[],
        }
    }
}

/// Whether `name` fits the 64-byte node name field.
pub fn is_name_length_valid(name: &str) -> bool {
    name.len() <= NAME_LEN
}

fn check_batch(len: usize) -> Result<(), CommandError> {
    if len == 0 || len > MAX_NODES_PER_REQUEST {
        return Err(CommandError::InvalidParameter(format!(
            "{len} instructions (expected 1..={MAX_NODES_PER_REQUEST})"
        )));
    }
    Ok(())
}

pub(crate) fn unexpected(code: u16) -> CommandError {
    CommandError::Protocol(format!("unexpected opcode {code:#06x}"))
}

/// Fails when a payload is shorter than its documented layout.
pub(crate) fn require(code: CommandCode, payload: &[u8], len: usize) -> Result<(), Step> {
    if payload.len() < len {
        return Err(Step::Fail(CommandError::Protocol(format!(
            "{code} payload is {} bytes (need {len})",
            payload.len()
        ))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VeluxPosition;

    fn frame(code: CommandCode, payload: &[u8]) -> Frame {
        Frame::new(code.code(), payload.to_vec())
    }

    #[test]
    fn set_velocity_packs_node_and_code() {
        let cmd = Command::set_velocity(3, Velocity::Silent);
        assert_eq!(cmd.pack(), vec![0x03, 0x01, 0x00]);
        assert_eq!(cmd.session_id(), None);
        let frame = cmd.to_frame().unwrap();
        assert_eq!(frame.code, 0x020A);
    }

    #[test]
    fn set_node_name_accepted_then_unknown_node() {
        let mut cmd = Command::set_node_name(4, "Bedroom").unwrap();
        cmd.handle_response(&frame(CommandCode::SetNodeNameCfm, &[0, 4]));
        assert_eq!(cmd.status(), CommandStatus::Complete);
        assert!(cmd.error().is_none());

        let mut cmd = Command::set_node_name(4, "Bedroom").unwrap();
        cmd.handle_response(&frame(CommandCode::SetNodeNameCfm, &[2, 4]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert_eq!(cmd.error_detail().as_deref(), Some("unknown node id"));
    }

    #[test]
    fn set_node_name_layout() {
        let cmd = Command::set_node_name(9, "Loft").unwrap();
        let payload = cmd.pack();
        assert_eq!(payload.len(), 65);
        assert_eq!(payload[0], 9);
        assert_eq!(&payload[1..5], b"Loft");
        assert!(payload[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn set_node_name_length_limit() {
        let exact = "é".repeat(32);
        assert_eq!(exact.len(), 64);
        assert!(Command::set_node_name(1, &exact).is_ok());

        let long = "x".repeat(65);
        let err = Command::set_node_name(1, &long).unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter(_)));
        assert!(!is_name_length_valid(&long));
    }

    #[test]
    fn send_mode_layout() {
        let mut cmd = Command::send_mode(vec![ModeInstruction {
            node_id: 5,
            mode_number: 2,
            mode_parameter: 0x10,
        }])
        .unwrap();
        cmd.assign_session(0x0102);
        let p = cmd.pack();
        assert_eq!(p.len(), 66);
        assert_eq!(&p[0..2], &[0x01, 0x02]);
        assert_eq!(p[2], ORIGINATOR_USER);
        assert_eq!(p[3], PRIORITY_USER);
        assert_eq!(p[4], 2);
        assert_eq!(p[5], 0x10);
        assert_eq!(p[6], 1);
        assert_eq!(p[7], 5);
        assert!(p[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejection_is_absorbing() {
        let mut cmd = Command::send_mode(vec![ModeInstruction {
            node_id: 5,
            mode_number: 2,
            mode_parameter: 0,
        }])
        .unwrap();
        cmd.assign_session(7);
        cmd.handle_response(&frame(CommandCode::ModeSendCfm, &[0, 7, 5]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert_eq!(cmd.error_detail().as_deref(), Some("illegal parameter"));

        cmd.handle_response(&frame(CommandCode::SessionFinishedNtf, &[0, 7]));
        cmd.handle_response(&frame(CommandCode::ModeSendCfm, &[0, 7, 0]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert_eq!(cmd.error_detail().as_deref(), Some("illegal parameter"));
    }

    #[test]
    fn accepted_then_finished_never_errors() {
        let mut cmd = Command::send_mode(vec![ModeInstruction {
            node_id: 5,
            mode_number: 2,
            mode_parameter: 0,
        }])
        .unwrap();
        cmd.assign_session(7);

        let mut seen = vec![];
        for f in [
            frame(CommandCode::ModeSendCfm, &[0, 7, 0]),
            frame(CommandCode::CommandRunStatusNtf, &[0, 7, 0, 5, 0, 0x64, 0x00, 2, 1]),
            frame(CommandCode::CommandRemainingTimeNtf, &[0, 7, 5, 0, 0, 12]),
            frame(CommandCode::SessionFinishedNtf, &[0, 7]),
        ] {
            cmd.handle_response(&f);
            seen.push(cmd.status());
        }
        assert_eq!(
            seen,
            vec![
                CommandStatus::Pending,
                CommandStatus::Pending,
                CommandStatus::Pending,
                CommandStatus::Complete
            ]
        );
        assert_eq!(cmd.run_reports().len(), 1);
    }

    #[test]
    fn unexpected_opcode_is_protocol_error() {
        let mut cmd = Command::set_velocity(3, Velocity::Fast);
        cmd.handle_response(&frame(CommandCode::GetVersionCfm, &[0; 9]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert!(matches!(cmd.error(), Some(CommandError::Protocol(_))));

        let mut cmd = Command::ping();
        cmd.handle_response(&Frame::new(0x7777, vec![]));
        assert!(matches!(cmd.error(), Some(CommandError::Protocol(_))));
    }

    #[test]
    fn gateway_error_notification_fails_command() {
        let mut cmd = Command::get_version();
        cmd.handle_response(&frame(CommandCode::ErrorNtf, &[7]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert!(cmd.error().is_some_and(CommandError::is_transient));
        assert_eq!(cmd.error_detail().as_deref(), Some("gateway busy"));
    }

    #[test]
    fn accepts_matches_session_and_node() {
        let mut cmd = Command::send_position(vec![PositionInstruction::main(
            2,
            VeluxPosition::from_percent_open(0),
        )])
        .unwrap();
        cmd.assign_session(40);
        assert!(cmd.accepts(&frame(CommandCode::CommandSendCfm, &[0, 40, 1])));
        assert!(!cmd.accepts(&frame(CommandCode::CommandSendCfm, &[0, 41, 1])));
        assert!(!cmd.accepts(&frame(CommandCode::NodeStatePositionChangedNtf, &[2, 4, 0, 0])));
        assert!(cmd.accepts(&frame(CommandCode::ErrorNtf, &[1])));

        let node = Command::get_node(3);
        assert!(node.accepts(&frame(CommandCode::GetNodeInformationCfm, &[0, 3])));
        assert!(!node.accepts(&frame(CommandCode::GetNodeInformationCfm, &[0, 4])));
    }

    #[test]
    fn session_assignment_only_for_session_commands() {
        let mut velocity = Command::set_velocity(1, Velocity::Default);
        velocity.assign_session(3);
        assert_eq!(velocity.session_id(), None);

        let mut scene = Command::stop_scene(1);
        scene.assign_session(3);
        assert_eq!(scene.session_id(), Some(3));
    }

    #[test]
    fn terminate_never_framed() {
        let cmd = Command::terminate();
        assert!(cmd.pack().is_empty());
        assert!(cmd.to_frame().is_err());
        assert!(!cmd.accepts(&frame(CommandCode::ErrorNtf, &[0])));
    }

    #[test]
    fn batch_bounds() {
        assert!(Command::send_position(vec![]).is_err());
        let many = (0..21)
            .map(|n| PositionInstruction::main(n, VeluxPosition::from_percent_open(10)))
            .collect();
        assert!(Command::send_position(many).is_err());
    }

    #[test]
    fn login_password_limit() {
        assert!(Command::login(&"p".repeat(32)).is_ok());
        assert!(Command::login(&"p".repeat(33)).is_err());
    }

    #[test]
    fn fail_is_idempotent() {
        let mut cmd = Command::ping();
        cmd.fail(CommandError::Timeout);
        cmd.fail(CommandError::Shutdown);
        assert_eq!(cmd.error(), Some(&CommandError::Timeout));
    }
}
