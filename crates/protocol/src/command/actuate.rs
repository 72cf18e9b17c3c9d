//! Session-correlated actuation: position commands and modes.

use tracing::debug;

use crate::bits;
use crate::constants::{CommandCode, FUNCTIONAL_PARAMETERS, MAX_NODES_PER_REQUEST};
use crate::error::{CommandError, Rejection};
use crate::types::{ModeInstruction, PositionInstruction, RunStatus, StatusReply, VeluxPosition, be16};

use super::{Exchange, ORIGINATOR_USER, PRIORITY_USER, Step, require, unexpected};

/// Request length of `GW_COMMAND_SEND_REQ` and `GW_MODE_SEND_REQ`.
const REQUEST_LEN: usize = 66;

// GW_COMMAND_SEND_REQ offsets.
const CMD_PARAMETER_ACTIVE: usize = 4;
const CMD_FPI: usize = 5;
const CMD_FUNCTIONAL_VALUES: usize = 7;
const CMD_INDEX_COUNT: usize = 41;
const CMD_INDEX_ARRAY: usize = 42;

// GW_MODE_SEND_REQ offsets.
const MODE_NUMBER: usize = 4;
const MODE_PARAMETER: usize = 5;
const MODE_INDEX_COUNT: usize = 6;
const MODE_INDEX_ARRAY: usize = 7;

/// One `GW_COMMAND_RUN_STATUS_NTF` received during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub node_id: u8,
    /// 0 for the main parameter, 1..=16 for FP1..FP16.
    pub parameter: u8,
    pub value: VeluxPosition,
    pub run_status: RunStatus,
    pub status_reply: StatusReply,
}

/// Progress notifications shared by every session command.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionProgress {
    reports: Vec<RunReport>,
    remaining_time: Option<u16>,
}

impl SessionProgress {
    pub(crate) fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    /// Handles run status, remaining time and session finished. Only the
    /// last one ends the session.
    pub(crate) fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::CommandRunStatusNtf => {
                if let Err(step) = require(code, payload, 9) {
                    return step;
                }
                let report = RunReport {
                    node_id: payload[3],
                    parameter: payload[4],
                    value: VeluxPosition::new(be16(payload, 5)),
                    run_status: RunStatus::from(payload[7]),
                    status_reply: StatusReply::from(payload[8]),
                };
                debug!(
                    node = report.node_id,
                    parameter = report.parameter,
                    run_status = ?report.run_status,
                    reply = ?report.status_reply,
                    "run status"
                );
                self.reports.push(report);
                Step::Continue
            }
            CommandCode::CommandRemainingTimeNtf => {
                if let Err(step) = require(code, payload, 6) {
                    return step;
                }
                let seconds = be16(payload, 4);
                debug!(node = payload[2], seconds, "remaining time");
                self.remaining_time = Some(seconds);
                Step::Continue
            }
            CommandCode::SessionFinishedNtf => Step::Complete,
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// Writes the session, originator and priority header.
pub(crate) fn session_header(data: &mut [u8], session: u16) {
    data[0..2].copy_from_slice(&session.to_be_bytes());
    data[2] = ORIGINATOR_USER;
    data[3] = PRIORITY_USER;
}

/// Moves nodes to target positions (`GW_COMMAND_SEND_REQ`).
#[derive(Debug, Clone)]
pub struct SendPosition {
    instructions: Vec<PositionInstruction>,
    progress: SessionProgress,
}

impl SendPosition {
    pub(crate) fn new(instructions: Vec<PositionInstruction>) -> Result<Self, CommandError> {
        for (i, a) in instructions.iter().enumerate() {
            if a.function > FUNCTIONAL_PARAMETERS {
                return Err(CommandError::InvalidParameter(format!(
                    "function {} out of range (0..={FUNCTIONAL_PARAMETERS})",
                    a.function
                )));
            }
            let conflict = instructions[..i]
                .iter()
                .any(|b| b.function == a.function && b.position != a.position);
            if conflict {
                return Err(CommandError::InvalidParameter(format!(
                    "conflicting positions for function {}",
                    a.function
                )));
            }
        }
        Ok(Self {
            instructions,
            progress: SessionProgress::default(),
        })
    }

    pub fn instructions(&self) -> &[PositionInstruction] {
        &self.instructions
    }

    pub fn reports(&self) -> &[RunReport] {
        self.progress.reports()
    }

    /// Distinct node ids in instruction order.
    fn node_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = Vec::with_capacity(self.instructions.len());
        for ins in &self.instructions {
            if !ids.contains(&ins.node_id) {
                ids.push(ins.node_id);
            }
        }
        ids
    }
}

impl Exchange for SendPosition {
    fn pack(&self, session: u16) -> Vec<u8> {
        let mut data = vec![0u8; REQUEST_LEN];
        session_header(&mut data, session);

        let mut values = [VeluxPosition::IGNORE; 1 + FUNCTIONAL_PARAMETERS as usize];
        let mut fpi = [0u8; 2];
        for ins in &self.instructions {
            values[ins.function as usize] = ins.position;
            bits::fpi_set(&mut fpi, ins.function);
        }

        data[CMD_PARAMETER_ACTIVE] = 0;
        data[CMD_FPI..CMD_FPI + 2].copy_from_slice(&fpi);
        for (i, value) in values.iter().enumerate() {
            let at = CMD_FUNCTIONAL_VALUES + i * 2;
            data[at..at + 2].copy_from_slice(&value.raw().to_be_bytes());
        }

        let nodes = self.node_ids();
        let count = nodes.len().min(MAX_NODES_PER_REQUEST);
        data[CMD_INDEX_COUNT] = count as u8;
        data[CMD_INDEX_ARRAY..CMD_INDEX_ARRAY + count].copy_from_slice(&nodes[..count]);
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::CommandSendCfm => {
                if let Err(step) = require(code, payload, 3) {
                    return step;
                }
                // 1 = accepted, 0 = rejected.
                if payload[2] == 1 {
                    Step::Continue
                } else {
                    Step::Fail(CommandError::Rejected(Rejection::Rejected))
                }
            }
            other => self.progress.on_frame(other, payload),
        }
    }
}

/// Sends a mode to nodes (`GW_MODE_SEND_REQ`).
#[derive(Debug, Clone)]
pub struct SendMode {
    instructions: Vec<ModeInstruction>,
    progress: SessionProgress,
}

impl SendMode {
    pub(crate) fn new(instructions: Vec<ModeInstruction>) -> Result<Self, CommandError> {
        if let Some(first) = instructions.first() {
            let mixed = instructions.iter().any(|i| {
                i.mode_number != first.mode_number || i.mode_parameter != first.mode_parameter
            });
            if mixed {
                return Err(CommandError::InvalidParameter(
                    "mode instructions in one request must share mode and parameter".into(),
                ));
            }
        }
        Ok(Self {
            instructions,
            progress: SessionProgress::default(),
        })
    }

    pub fn instructions(&self) -> &[ModeInstruction] {
        &self.instructions
    }

    pub fn reports(&self) -> &[RunReport] {
        self.progress.reports()
    }
}

impl Exchange for SendMode {
    fn pack(&self, session: u16) -> Vec<u8> {
        let mut data = vec![0u8; REQUEST_LEN];
        session_header(&mut data, session);

        if let Some(first) = self.instructions.first() {
            data[MODE_NUMBER] = first.mode_number;
            data[MODE_PARAMETER] = first.mode_parameter;
        }
        let count = self.instructions.len().min(MAX_NODES_PER_REQUEST);
        data[MODE_INDEX_COUNT] = count as u8;
        for (i, ins) in self.instructions.iter().take(count).enumerate() {
            data[MODE_INDEX_ARRAY + i] = ins.node_id;
        }
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::ModeSendCfm => {
                if let Err(step) = require(code, payload, 3) {
                    return step;
                }
                match Rejection::from_status(payload[2]) {
                    None => Step::Continue,
                    Some(r) => Step::Fail(CommandError::Rejected(r)),
                }
            }
            other => self.progress.on_frame(other, payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandStatus};
    use crate::frame::Frame;

    fn frame(code: CommandCode, payload: &[u8]) -> Frame {
        Frame::new(code.code(), payload.to_vec())
    }

    #[test]
    fn position_layout_main_parameter() {
        let mut cmd = Command::send_position(vec![PositionInstruction::main(
            6,
            VeluxPosition::from_percent_open(25),
        )])
        .unwrap();
        cmd.assign_session(0x00AB);
        let p = cmd.pack();
        assert_eq!(p.len(), REQUEST_LEN);
        assert_eq!(&p[0..4], &[0x00, 0xAB, ORIGINATOR_USER, PRIORITY_USER]);
        assert_eq!(p[CMD_PARAMETER_ACTIVE], 0);
        assert_eq!(&p[CMD_FPI..CMD_FPI + 2], &[0, 0]);
        assert_eq!(be16(&p, CMD_FUNCTIONAL_VALUES), 25 * 512);
        // FP1..FP16 untouched.
        for i in 1..=16 {
            assert_eq!(be16(&p, CMD_FUNCTIONAL_VALUES + i * 2), 0xD400);
        }
        assert_eq!(p[CMD_INDEX_COUNT], 1);
        assert_eq!(p[CMD_INDEX_ARRAY], 6);
        assert!(p[62..].iter().all(|&b| b == 0));
    }

    #[test]
    fn position_layout_functional_parameter_and_batch() {
        let cmd = Command::send_position(vec![
            PositionInstruction {
                node_id: 1,
                function: 3,
                position: VeluxPosition::new(0x1000),
            },
            PositionInstruction {
                node_id: 2,
                function: 3,
                position: VeluxPosition::new(0x1000),
            },
            PositionInstruction::main(2, VeluxPosition::new(0)),
        ])
        .unwrap();
        let p = cmd.pack();
        assert_eq!(&p[CMD_FPI..CMD_FPI + 2], &[0x20, 0x00]);
        assert_eq!(be16(&p, CMD_FUNCTIONAL_VALUES), 0);
        assert_eq!(be16(&p, CMD_FUNCTIONAL_VALUES + 6), 0x1000);
        assert_eq!(p[CMD_INDEX_COUNT], 2);
        assert_eq!(&p[CMD_INDEX_ARRAY..CMD_INDEX_ARRAY + 2], &[1, 2]);
    }

    #[test]
    fn conflicting_positions_rejected() {
        let err = Command::send_position(vec![
            PositionInstruction::main(1, VeluxPosition::new(0)),
            PositionInstruction::main(2, VeluxPosition::new(0xC800)),
        ])
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter(_)));

        let err = Command::send_position(vec![PositionInstruction {
            node_id: 1,
            function: 17,
            position: VeluxPosition::new(0),
        }])
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter(_)));
    }

    #[test]
    fn position_confirmation_status() {
        let mut cmd = Command::send_position(vec![PositionInstruction::main(
            1,
            VeluxPosition::new(0),
        )])
        .unwrap();
        cmd.assign_session(3);
        cmd.handle_response(&frame(CommandCode::CommandSendCfm, &[0, 3, 0]));
        assert_eq!(cmd.status(), CommandStatus::Error);
        assert_eq!(cmd.error_detail().as_deref(), Some("rejected"));
    }

    #[test]
    fn position_runs_to_session_finished() {
        let mut cmd = Command::send_position(vec![PositionInstruction::main(
            1,
            VeluxPosition::new(0),
        )])
        .unwrap();
        cmd.assign_session(3);
        cmd.handle_response(&frame(CommandCode::CommandSendCfm, &[0, 3, 1]));
        cmd.handle_response(&frame(
            CommandCode::CommandRunStatusNtf,
            &[0, 3, 0, 1, 0, 0, 0, 0, 1],
        ));
        assert_eq!(cmd.status(), CommandStatus::Pending);
        cmd.handle_response(&frame(CommandCode::SessionFinishedNtf, &[0, 3]));
        assert_eq!(cmd.status(), CommandStatus::Complete);

        let report = cmd.run_reports()[0];
        assert_eq!(report.node_id, 1);
        assert_eq!(report.run_status, RunStatus::Completed);
        assert_eq!(report.status_reply, StatusReply::Ok);
    }

    #[test]
    fn mode_no_free_session_is_transient() {
        let mut cmd = Command::send_mode(vec![ModeInstruction {
            node_id: 2,
            mode_number: 1,
            mode_parameter: 0,
        }])
        .unwrap();
        cmd.assign_session(9);
        cmd.handle_response(&frame(CommandCode::ModeSendCfm, &[0, 9, 4]));
        assert_eq!(cmd.error_detail().as_deref(), Some("no free session slots"));
        assert!(cmd.error().is_some_and(CommandError::is_transient));
    }

    #[test]
    fn mode_batch_layout() {
        let cmd = Command::send_mode(
            [4u8, 8, 15]
                .iter()
                .map(|&node_id| ModeInstruction {
                    node_id,
                    mode_number: 3,
                    mode_parameter: 1,
                })
                .collect(),
        )
        .unwrap();
        let p = cmd.pack();
        assert_eq!(p[MODE_INDEX_COUNT], 3);
        assert_eq!(&p[MODE_INDEX_ARRAY..MODE_INDEX_ARRAY + 3], &[4, 8, 15]);
    }

    #[test]
    fn mode_mixed_rejected() {
        let err = Command::send_mode(vec![
            ModeInstruction {
                node_id: 1,
                mode_number: 1,
                mode_parameter: 0,
            },
            ModeInstruction {
                node_id: 2,
                mode_number: 2,
                mode_parameter: 0,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter(_)));
    }

    #[test]
    fn short_run_status_is_protocol_error() {
        let mut progress = SessionProgress::default();
        let step = progress.on_frame(CommandCode::CommandRunStatusNtf, &[0, 1, 2]);
        assert!(matches!(step, Step::Fail(CommandError::Protocol(_))));
    }
}
