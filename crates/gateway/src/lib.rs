//! Connection and command processor for a Velux KLF200 gateway.
//!
//! Owns the TCP link, the login handshake, keep-alive, reconnection and
//! the single in-flight command slot. Frame and command types live in
//! `klf200-protocol`.

pub mod codec;
pub mod config;
pub mod error;
pub mod listeners;
pub mod processor;
mod pumps;
mod reconnection;
pub mod session;
pub mod transport;
pub mod types;

pub use codec::GatewayCodec;
pub use config::{ConfigError, GatewayConfig, GatewayConfigFile};
pub use error::GatewayError;
pub use listeners::{EventListener, ListenerId};
pub use processor::{CommandProcessor, Completion};
pub use session::SessionAllocator;
pub use transport::{BoxedStream, ConnectFuture, Connector, GatewayStream, TcpConnector};
pub use types::{ConnectionState, GatewayProperties, ReconnectConfig, ResyncPolicy};
