use crate::constants::{CommandCode, NAME_LEN};
use crate::error::{CommandError, Rejection};
use crate::types::{Velocity, VeluxScene, decode_name};

use super::actuate::{RunReport, SessionProgress, session_header};
use super::{Exchange, Step, require, unexpected};

/// Lists the scenes stored on the gateway.
#[derive(Debug, Clone, Default)]
pub struct GetAllScenes {
    scenes: Vec<VeluxScene>,
}

impl GetAllScenes {
    pub fn scenes(&self) -> &[VeluxScene] {
        &self.scenes
    }
}

impl Exchange for GetAllScenes {
    fn pack(&self, _session: u16) -> Vec<u8> {
        Vec::new()
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::GetSceneListCfm => {
                if let Err(step) = require(code, payload, 1) {
                    return step;
                }
                if payload[0] == 0 {
                    Step::Complete
                } else {
                    Step::Continue
                }
            }
            // [count][(id, name[64]) * count][remaining]
            CommandCode::GetSceneListNtf => {
                if let Err(step) = require(code, payload, 1) {
                    return step;
                }
                let count = payload[0] as usize;
                let entry = 1 + NAME_LEN;
                if let Err(step) = require(code, payload, 2 + count * entry) {
                    return step;
                }
                for i in 0..count {
                    let at = 1 + i * entry;
                    self.scenes.push(VeluxScene {
                        id: payload[at],
                        name: decode_name(&payload[at + 1..at + entry]),
                    });
                }
                if payload[1 + count * entry] == 0 {
                    Step::Complete
                } else {
                    Step::Continue
                }
            }
            other => Step::Fail(unexpected(other.code())),
        }
    }
}

/// `[status][session]` confirmation of scene requests.
fn scene_rejection(status: u8) -> Option<Rejection> {
    match status {
        0 => None,
        1 => Some(Rejection::InvalidParameter),
        2 => Some(Rejection::Rejected),
        other => Some(Rejection::Unknown(other)),
    }
}

/// Runs a scene and follows its session to the end.
#[derive(Debug, Clone)]
pub struct ExecuteScene {
    scene_id: u8,
    velocity: Velocity,
    progress: SessionProgress,
}

impl ExecuteScene {
    pub(crate) fn new(scene_id: u8, velocity: Velocity) -> Self {
        Self {
            scene_id,
            velocity,
            progress: SessionProgress::default(),
        }
    }

    pub fn scene_id(&self) -> u8 {
        self.scene_id
    }

    pub fn reports(&self) -> &[RunReport] {
        self.progress.reports()
    }
}

impl Exchange for ExecuteScene {
    fn pack(&self, session: u16) -> Vec<u8> {
        let mut data = vec![0u8; 6];
        session_header(&mut data, session);
        data[4] = self.scene_id;
        data[5] = self.velocity.code();
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::ActivateSceneCfm => {
                if let Err(step) = require(code, payload, 3) {
                    return step;
                }
                match scene_rejection(payload[0]) {
                    None => Step::Continue,
                    Some(r) => Step::Fail(CommandError::Rejected(r)),
                }
            }
            other => self.progress.on_frame(other, payload),
        }
    }
}

/// Stops a running scene.
#[derive(Debug, Clone)]
pub struct StopScene {
    scene_id: u8,
}

impl StopScene {
    pub(crate) fn new(scene_id: u8) -> Self {
        Self { scene_id }
    }

    pub fn scene_id(&self) -> u8 {
        self.scene_id
    }
}

impl Exchange for StopScene {
    fn pack(&self, session: u16) -> Vec<u8> {
        let mut data = vec![0u8; 5];
        session_header(&mut data, session);
        data[4] = self.scene_id;
        data
    }

    fn on_frame(&mut self, code: CommandCode, payload: &[u8]) -> Step {
        match code {
            CommandCode::StopSceneCfm => {
                if let Err(step) = require(code, payload, 3) {
                    return step;
                }
                match scene_rejection(payload[0]) {
                    None => Step::Complete,
                    Some(r) => Step::Fail(CommandError::Rejected(r)),
                }
            }
            other => Step::Fail(unexpected(other.code())),
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

    fn scene_ntf(scenes: &[(u8, &str)], remaining: u8) -> Vec<u8> {
        let mut p = vec![scenes.len() as u8];
        for (id, name) in scenes {
            p.push(*id);
            let mut field = [0u8; NAME_LEN];
            field[..name.len()].copy_from_slice(name.as_bytes());
            p.extend_from_slice(&field);
        }
        p.push(remaining);
        p
    }

    #[test]
    fn scene_list_across_notifications() {
        let mut cmd = Command::get_all_scenes();
        cmd.handle_response(&frame(CommandCode::GetSceneListCfm, &[3]));
        cmd.handle_response(&frame(
            CommandCode::GetSceneListNtf,
            &scene_ntf(&[(0, "Morning"), (1, "Night")], 1),
        ));
        assert_eq!(cmd.status(), CommandStatus::Pending);
        cmd.handle_response(&frame(
            CommandCode::GetSceneListNtf,
            &scene_ntf(&[(4, "Away")], 0),
        ));
        assert_eq!(cmd.status(), CommandStatus::Complete);
        let ids: Vec<_> = cmd.scenes().iter().map(|s| (s.id, s.name.as_str())).collect();
        assert_eq!(ids, vec![(0, "Morning"), (1, "Night"), (4, "Away")]);
    }

    #[test]
    fn empty_scene_list() {
        let mut cmd = Command::get_all_scenes();
        cmd.handle_response(&frame(CommandCode::GetSceneListCfm, &[0]));
        assert_eq!(cmd.status(), CommandStatus::Complete);
        assert!(cmd.scenes().is_empty());
    }

    #[test]
    fn truncated_scene_notification() {
        let mut cmd = Command::get_all_scenes();
        cmd.handle_response(&frame(CommandCode::GetSceneListCfm, &[2]));
        cmd.handle_response(&frame(CommandCode::GetSceneListNtf, &[2, 0, b'A']));
        assert!(matches!(cmd.error(), Some(CommandError::Protocol(_))));
    }

    #[test]
    fn execute_scene_layout_and_flow() {
        let mut cmd = Command::execute_scene(7, Velocity::Fast);
        cmd.assign_session(0x0203);
        assert_eq!(cmd.pack(), vec![0x02, 0x03, 1, 3, 7, 2]);

        cmd.handle_response(&frame(CommandCode::ActivateSceneCfm, &[0, 0x02, 0x03]));
        assert_eq!(cmd.status(), CommandStatus::Pending);
        cmd.handle_response(&frame(CommandCode::SessionFinishedNtf, &[0x02, 0x03]));
        assert_eq!(cmd.status(), CommandStatus::Complete);
    }

    #[test]
    fn execute_scene_invalid() {
        let mut cmd = Command::execute_scene(99, Velocity::Default);
        cmd.assign_session(1);
        cmd.handle_response(&frame(CommandCode::ActivateSceneCfm, &[1, 0, 1]));
        assert_eq!(cmd.error_detail().as_deref(), Some("invalid parameter"));
    }

    #[test]
    fn stop_scene_completes_on_confirmation() {
        let mut cmd = Command::stop_scene(2);
        cmd.assign_session(5);
        assert_eq!(cmd.pack(), vec![0, 5, 1, 3, 2]);
        assert!(cmd.accepts(&frame(CommandCode::StopSceneCfm, &[0, 0, 5])));
        cmd.handle_response(&frame(CommandCode::StopSceneCfm, &[0, 0, 5]));
        assert_eq!(cmd.status(), CommandStatus::Complete);
    }
}
