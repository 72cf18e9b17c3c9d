use crate::constants::{CommandCode, NAME_LEN};
use crate::error::{CommandError, Rejection};
use crate::types::{Velocity, VeluxNode};

use super::{Exchange, Step, require, unexpected};

/// Reads one node's information.
#[derive(Debug, Clone)]
pub struct GetNode {
    node_id: u8,
    node: Option<VeluxNode>,
}

impl GetNode {
    pub(crate) fn new(node_id: u8) -> Self {
        Self {
            node_id,
            node: None,
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn node(&self) -> Option<&VeluxNode> {
        self.node.as_ref()
    }
}

impl Exchange for GetNode {
    fn pack(&self, _session: u16) -> Vec<u8> {
        vec![self.node_id]
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetNodeInformationCfm => {
                if let Err(step) = require(code, payload, 1) {
                    return step;
                }
                match Rejection::from_status(payload[0]) {
                    None => Step::Continue,
                    Some(r) => Step::Fail(CommandError::Rejected(r)),
                }
            }
            CommandCode::GetNodeInformationNtf => match VeluxNode::parse(payload) {
                Some(node) => {
                    self.node = Some(node);
                    Step::Complete
                }
                None => Step::Fail(CommandError::Protocol(format!(
                    "node information is {} bytes",
                    payload.len()
                ))),
            },
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Reads every node known to the gateway.
#[derive(Debug, Clone, Default)]
pub struct GetAllNodes {
    expected: u8,
    nodes: Vec<VeluxNode>,
}

impl GetAllNodes {
    pub fn nodes(&self) -> &[VeluxNode] {
        &self.nodes
    }

    /// Node count announced by the confirmation.
    pub fn expected(&self) -> u8 {
        self.expected
    }
}

impl Exchange for GetAllNodes {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetAllNodesInformationCfm => {
                if let Err(step) = require(code, payload, 2) {
                    return step;
                }
                // Status 1 means the system table is empty.
                self.expected = payload[1];
                if payload[0] != 0 || self.expected == 0 {
                    Step::Complete
                } else {
                    Step::Continue
                }
            }
            CommandCode::GetAllNodesInformationNtf => {
                match VeluxNode::parse(payload) {
                    Some(node) => self.nodes.push(node),
                    None => {
                        return Step::Fail(CommandError::Protocol(format!(
                            "node information is {} bytes",
                            payload.len()
                        )));
                    }
                }
                Step::Continue
            }
            CommandCode::GetAllNodesInformationFinishedNtf => Step::Complete,
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Changes a node's movement speed.
#[derive(Debug, Clone)]
pub struct SetVelocity {
    node_id: u8,
    velocity: Velocity,
}

impl SetVelocity {
    pub(crate) fn new(node_id: u8, velocity: Velocity) -> Self {
        Self { node_id, velocity }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }
}

impl Exchange for SetVelocity {
    fn pack(&self, _session: u16) -> Vec<u8> {
        vec![self.node_id, self.velocity.code(), 0]
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::SetNodeVelocityCfm => status_step(code, payload),
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Renames a node.
#[derive(Debug, Clone)]
pub struct SetNodeName {
    node_id: u8,
    name: String,
}

impl SetNodeName {
    pub(crate) fn new(node_id: u8, name: &str) -> Self {
        Self {
            node_id,
            name: name.to_string(),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Exchange for SetNodeName {
    fn pack(&self, _session: u16) -> Vec<u8> {
        let mut data = vec![0u8; 1 + NAME_LEN];
        data[0] = self.node_id;
        let name = self.name.as_bytes();
        let len = name.len().min(NAME_LEN);
        data[1..1 + len].copy_from_slice(&name[..len]);
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::SetNodeNameCfm => status_step(code, payload),
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// `[status][node]` confirmation: 0 completes, anything else is a rejection.
fn status_step(code: CommandCode, payload: &[u8]) -> Step {
    if let Err(step) = require(code, payload, 1) {
        return step;
    }
    match Rejection::from_status(payload[0]) {
        None => Step::Complete,
        Some(r) => Step::Fail(CommandError::Rejected(r)),
    }
}
