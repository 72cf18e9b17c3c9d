//! Typed values exchanged with the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::constants::NAME_LEN;

/// A raw 16-bit position code.
///
/// `0x0000..=0xC800` is a relative position, 0 to 100 percent open.
/// `0xD100..=0xD1FF` and `0xF7FF` mean the position is unknown. Any other
/// code above `0xC800` is a control value (current, default, ignore) and not
/// a position at all. Percent conversions return `None` for both reserved
/// ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VeluxPosition(u16);

impl VeluxPosition {
    /// Upper bound of the relative range (100 %).
    pub const MAX: u16 = 0xC800;
    /// Raw steps per percent.
    pub const STEP: u16 = Self::MAX / 100;
    /// Target the current position, i.e. stop.
    pub const CURRENT: Self = Self(0xD200);
    /// Return to the default position.
    pub const DEFAULT: Self = Self(0xD300);
    /// Leave this parameter untouched.
    pub const IGNORE: Self = Self(0xD400);
    /// Position reported when the actuator state is not known.
    pub const UNKNOWN: Self = Self(0xF7FF);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Builds a position from a percentage open, clamped to 100.
    pub fn from_percent_open(percent: u8) -> Self {
        Self(u16::from(percent.min(100)) * Self::STEP)
    }

    /// Builds a position from a percentage closed, clamped to 100.
    pub fn from_percent_closed(percent: u8) -> Self {
        Self::from_percent_open(100 - percent.min(100))
    }

    pub fn is_unknown(self) -> bool {
        matches!(self.0, 0xD100..=0xD1FF | 0xF7FF)
    }

    /// Whether the code lies in the relative range.
    pub fn is_valid(self) -> bool {
        self.0 <= Self::MAX
    }

    /// Percentage open, truncated. `None` outside the relative range.
    pub fn percent_open(self) -> Option<u8> {
        if !self.is_valid() {
            return None;
        }
        Some((u32::from(self.0) * 100 / u32::from(Self::MAX)) as u8)
    }

    /// Complement of [`percent_open`](Self::percent_open).
    pub fn percent_closed(self) -> Option<u8> {
        self.percent_open().map(|open| 100 - open)
    }
}

impl From<u16> for VeluxPosition {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for VeluxPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            return f.write_str("unknown");
        }
        match self.percent_open() {
            Some(p) => write!(f, "{p}% open"),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Node movement speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Velocity {
    Default,
    Silent,
    Fast,
    NotAvailable,
    Unknown(u8),
}

impl Velocity {
    pub fn code(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Silent => 1,
            Self::Fast => 2,
            Self::NotAvailable => 255,
            Self::Unknown(v) => v,
        }
    }
}

impl From<u8> for Velocity {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Default,
            1 => Self::Silent,
            2 => Self::Fast,
            255 => Self::NotAvailable,
            other => Self::Unknown(other),
        }
    }
}

impl std::str::FromStr for Velocity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "silent" => Ok(Self::Silent),
            "fast" => Ok(Self::Fast),
            other => Err(format!("unknown velocity '{other}'")),
        }
    }
}

/// Actuator type, the upper ten bits of the node type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    InteriorVenetianBlind,
    RollerShutter,
    VerticalExteriorAwning,
    WindowOpener,
    GarageDoorOpener,
    Light,
    GateOpener,
    Lock,
    VerticalInteriorBlind,
    DualRollerShutter,
    OnOffSwitch,
    HorizontalAwning,
    ExteriorVenetianBlind,
    LouverBlind,
    CurtainTrack,
    VentilationPoint,
    ExteriorHeating,
    SwingingShutter,
    BladeOpener,
    Unknown(u16),
}

impl From<u16> for NodeType {
    fn from(raw_type: u16) -> Self {
        match raw_type {
            1 => Self::InteriorVenetianBlind,
            2 => Self::RollerShutter,
            3 => Self::VerticalExteriorAwning,
            4 => Self::WindowOpener,
            5 => Self::GarageDoorOpener,
            6 => Self::Light,
            7 => Self::GateOpener,
            9 => Self::Lock,
            10 => Self::VerticalInteriorBlind,
            13 => Self::DualRollerShutter,
            15 => Self::OnOffSwitch,
            16 => Self::HorizontalAwning,
            17 => Self::ExteriorVenetianBlind,
            18 => Self::LouverBlind,
            19 => Self::CurtainTrack,
            20 => Self::VentilationPoint,
            21 => Self::ExteriorHeating,
            24 => Self::SwingingShutter,
            29 => Self::BladeOpener,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeVariation {
    NotSet,
    TopHung,
    Kip,
    FlatRoof,
    SkyLight,
    Unknown(u8),
}

impl From<u8> for NodeVariation {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotSet,
            1 => Self::TopHung,
            2 => Self::Kip,
            3 => Self::FlatRoof,
            4 => Self::SkyLight,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    AlwaysAlive,
    LowPower,
    Unknown(u8),
}

impl From<u8> for PowerMode {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::AlwaysAlive,
            1 => Self::LowPower,
            other => Self::Unknown(other),
        }
    }
}

/// Execution state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    NonExecuting,
    ErrorExecuting,
    NotUsed,
    AwaitingPower,
    Executing,
    Done,
    Unknown(u8),
}

impl From<u8> for NodeState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NonExecuting,
            1 => Self::ErrorExecuting,
            2 => Self::NotUsed,
            3 => Self::AwaitingPower,
            4 => Self::Executing,
            5 => Self::Done,
            other => Self::Unknown(other),
        }
    }
}

/// Run status carried by `GW_COMMAND_RUN_STATUS_NTF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Active,
    Unknown(u8),
}

impl From<u8> for RunStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Completed,
            1 => Self::Failed,
            2 => Self::Active,
            other => Self::Unknown(other),
        }
    }
}

/// Why a node ended in its current run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReply {
    Unknown,
    Ok,
    NoContact,
    ManuallyOperated,
    Blocked,
    WrongSystemKey,
    PriorityLevelLocked,
    ReachedWrongPosition,
    ErrorDuringExecution,
    NoExecution,
    Calibrating,
    PowerConsumptionTooHigh,
    PowerConsumptionTooLow,
    LockPositionOpen,
    MotionTimeTooLongCommunicationEnded,
    ThermalProtection,
    ProductNotOperational,
    FilterMaintenanceNeeded,
    BatteryLevel,
    TargetModified,
    ModeNotImplemented,
    CommandIncompatibleToMovement,
    UserAction,
    DeadBoltError,
    AutomaticCycleEngaged,
    WrongLoadConnected,
    ColourNotReachable,
    TargetNotReachable,
    BadIndexReceived,
    CommandOverruled,
    NodeWaitingForPower,
    InformationCode,
    ParameterLimited,
    LimitationByLocalUser,
    LimitationByUser,
    LimitationByRain,
    LimitationByTimer,
    LimitationByUps,
    LimitationByUnknownDevice,
    LimitationBySaac,
    LimitationByWind,
    LimitationByMyself,
    LimitationByAutomaticCycle,
    LimitationByEmergency,
    Other(u8),
}

impl From<u8> for StatusReply {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::Unknown,
            0x01 => Self::Ok,
            0x02 => Self::NoContact,
            0x03 => Self::ManuallyOperated,
            0x04 => Self::Blocked,
            0x05 => Self::WrongSystemKey,
            0x06 => Self::PriorityLevelLocked,
            0x07 => Self::ReachedWrongPosition,
            0x08 => Self::ErrorDuringExecution,
            0x09 => Self::NoExecution,
            0x0A => Self::Calibrating,
            0x0B => Self::PowerConsumptionTooHigh,
            0x0C => Self::PowerConsumptionTooLow,
            0x0D => Self::LockPositionOpen,
            0x0E => Self::MotionTimeTooLongCommunicationEnded,
            0x0F => Self::ThermalProtection,
            0x10 => Self::ProductNotOperational,
            0x11 => Self::FilterMaintenanceNeeded,
            0x12 => Self::BatteryLevel,
            0x13 => Self::TargetModified,
            0x14 => Self::ModeNotImplemented,
            0x15 => Self::CommandIncompatibleToMovement,
            0x16 => Self::UserAction,
            0x17 => Self::DeadBoltError,
            0x18 => Self::AutomaticCycleEngaged,
            0x19 => Self::WrongLoadConnected,
            0x1A => Self::ColourNotReachable,
            0x1B => Self::TargetNotReachable,
            0x1C => Self::BadIndexReceived,
            0x1D => Self::CommandOverruled,
            0x1E => Self::NodeWaitingForPower,
            0xDF => Self::InformationCode,
            0xE0 => Self::ParameterLimited,
            0xE1 => Self::LimitationByLocalUser,
            0xE2 => Self::LimitationByUser,
            0xE3 => Self::LimitationByRain,
            0xE4 => Self::LimitationByTimer,
            0xE6 => Self::LimitationByUps,
            0xE7 => Self::LimitationByUnknownDevice,
            0xEA => Self::LimitationBySaac,
            0xEB => Self::LimitationByWind,
            0xEC => Self::LimitationByMyself,
            0xED => Self::LimitationByAutomaticCycle,
            0xEE => Self::LimitationByEmergency,
            other => Self::Other(other),
        }
    }
}

/// An alias entry (type, value) of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAlias {
    pub alias_type: u16,
    pub value: u16,
}

/// A node as reported by the node information notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeluxNode {
    pub node_id: u8,
    pub order: u16,
    pub placement: u8,
    pub name: String,
    pub velocity: Velocity,
    pub node_type: NodeType,
    pub node_subtype: u8,
    pub product_group: u8,
    pub product_type: u8,
    pub variation: NodeVariation,
    pub power_mode: PowerMode,
    pub build_number: u8,
    pub serial_number: [u8; 8],
    pub state: NodeState,
    pub current_position: VeluxPosition,
    pub target_position: VeluxPosition,
    pub functional_positions: [VeluxPosition; 4],
    pub remaining_time: u16,
    pub last_command: Option<DateTime<Utc>>,
    pub aliases: Vec<NodeAlias>,
}

impl VeluxNode {
    /// Payload size of `GW_GET_NODE_INFORMATION_NTF` and
    /// `GW_GET_ALL_NODES_INFORMATION_NTF`.
    pub const PAYLOAD_LEN: usize = 124;

    /// Parses a node information notification payload.
    pub fn parse(p: &[u8]) -> Option<Self> {
        if p.len() < Self::PAYLOAD_LEN {
            return None;
        }
        let (type_raw, node_subtype) = bits::node_type_split(be16(p, 69));
        let mut serial_number = [0u8; 8];
        serial_number.copy_from_slice(&p[76..84]);
        let alias_count = (p[103] as usize).min(5);
        let aliases = (0..alias_count)
            .map(|i| NodeAlias {
                alias_type: be16(p, 104 + i * 4),
                value: be16(p, 106 + i * 4),
            })
            .collect();
        let timestamp = u32::from_be_bytes([p[99], p[100], p[101], p[102]]);

        Some(Self {
            node_id: p[0],
            order: be16(p, 1),
            placement: p[3],
            name: decode_name(&p[4..4 + NAME_LEN]),
            velocity: Velocity::from(p[68]),
            node_type: NodeType::from(type_raw),
            node_subtype,
            product_group: p[71],
            product_type: p[72],
            variation: NodeVariation::from(p[73]),
            power_mode: PowerMode::from(p[74]),
            build_number: p[75],
            serial_number,
            state: NodeState::from(p[84]),
            current_position: be16(p, 85).into(),
            target_position: be16(p, 87).into(),
            functional_positions: [
                be16(p, 89).into(),
                be16(p, 91).into(),
                be16(p, 93).into(),
                be16(p, 95).into(),
            ],
            remaining_time: be16(p, 97),
            last_command: (timestamp != 0)
                .then(|| DateTime::from_timestamp(i64::from(timestamp), 0))
                .flatten(),
            aliases,
        })
    }
}

/// A scene stored on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeluxScene {
    pub id: u8,
    pub name: String,
}

/// A target for one node within a position command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInstruction {
    pub node_id: u8,
    /// 0 for the main parameter, 1..=16 for FP1..FP16.
    pub function: u8,
    pub position: VeluxPosition,
}

impl PositionInstruction {
    /// Targets the main parameter of a node.
    pub fn main(node_id: u8, position: VeluxPosition) -> Self {
        Self {
            node_id,
            function: 0,
            position,
        }
    }
}

/// A mode change for one node within a mode command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInstruction {
    pub node_id: u8,
    pub mode_number: u8,
    pub mode_parameter: u8,
}

/// Firmware and hardware identification (`GW_GET_VERSION_CFM`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayVersion {
    pub software: [u8; 6],
    pub hardware: u8,
    pub product_group: u8,
    pub product_type: u8,
}

impl GatewayVersion {
    pub fn parse(p: &[u8]) -> Option<Self> {
        if p.len() < 9 {
            return None;
        }
        let mut software = [0u8; 6];
        software.copy_from_slice(&p[..6]);
        Some(Self {
            software,
            hardware: p[6],
            product_group: p[7],
            product_type: p[8],
        })
    }

    /// Dotted software version, e.g. `0.2.0.0.71.0`.
    pub fn software_version(&self) -> String {
        self.software
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// API version (`GW_GET_PROTOCOL_VERSION_CFM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub fn parse(p: &[u8]) -> Option<Self> {
        (p.len() >= 4).then(|| Self {
            major: be16(p, 0),
            minor: be16(p, 2),
        })
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Gateway state (`GW_GET_STATE_CFM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayState {
    pub state: u8,
    pub sub_state: u8,
}

impl GatewayState {
    pub fn parse(p: &[u8]) -> Option<Self> {
        (p.len() >= 2).then(|| Self {
            state: p[0],
            sub_state: p[1],
        })
    }
}

pub(crate) fn be16(p: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([p[offset], p[offset + 1]])
}

/// Decodes a zero-padded UTF-8 name field.
pub(crate) fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
