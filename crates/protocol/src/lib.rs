//! Velux KLF200 gateway protocol.
//!
//! Frame codec, opcode table, typed values and the [`Command`] state
//! machine. Nothing here performs I/O; see `klf200-gateway` for the
//! connection and command processor.

pub mod bits;
pub mod command;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod types;

pub use command::{Command, CommandStatus, Operation, RunReport, is_name_length_valid};
pub use constants::CommandCode;
pub use descriptor::{CommandDescriptor, CommandKind, NodeEvent, WaitClass};
pub use error::{CommandError, GatewayErrorCode, Rejection};
pub use frame::{Frame, FrameError};
pub use types::{
    GatewayState, GatewayVersion, ModeInstruction, NodeState, NodeType, PositionInstruction,
    ProtocolVersion, Velocity, VeluxNode, VeluxPosition, VeluxScene,
};
