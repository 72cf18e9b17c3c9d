//! Connecting, authenticating and running one gateway link.

use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use klf200_protocol::{Command, CommandStatus, Frame};

use crate::codec::GatewayCodec;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::processor::Job;
use crate::pumps;

/// A byte stream the gateway protocol can run over.
pub trait GatewayStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> GatewayStream for T {}

pub type BoxedStream = Box<dyn GatewayStream>;

pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = std::io::Result<BoxedStream>> + Send + 'a>>;

/// Opens the byte stream to a gateway.
///
/// [`TcpConnector`] is the default. Hosts that wrap the socket (or tests
/// running against an in-memory gateway) supply their own.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, address: &'a str) -> ConnectFuture<'a>;
}

/// Plain TCP connection to `host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, address: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

pub(crate) type GatewayFramed = Framed<BoxedStream, GatewayCodec>;

/// Connects and performs the password exchange.
pub(crate) async fn open(
    connector: &dyn Connector,
    config: &GatewayConfig,
) -> Result<GatewayFramed, GatewayError> {
    let address = config.address();
    debug!(%address, "connecting to gateway");
    let stream = tokio::time::timeout(config.connect_timeout, connector.connect(&address))
        .await
        .map_err(|_| GatewayError::Timeout)??;

    let mut framed = Framed::new(stream, GatewayCodec::new(config.resync));
    tokio::time::timeout(
        config.confirmation_timeout,
        authenticate(&mut framed, &config.password),
    )
    .await
    .map_err(|_| GatewayError::Timeout)??;

    info!(%address, "authenticated with gateway");
    Ok(framed)
}

/// Sends the login request and reads frames until it resolves.
async fn authenticate(framed: &mut GatewayFramed, password: &str) -> Result<(), GatewayError> {
    let mut login =
        Command::login(password).map_err(|e| GatewayError::AuthRejected(e.to_string()))?;
    let request = login
        .to_frame()
        .map_err(|e| GatewayError::AuthRejected(e.to_string()))?;
    framed.send(request).await?;

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        if !login.accepts(&frame) {
            trace!(code = %format_args!("{:#06x}", frame.code), "frame before login ignored");
            continue;
        }
        login.handle_response(&frame);
        match login.status() {
            CommandStatus::Pending => {}
            CommandStatus::Complete => return Ok(()),
            CommandStatus::Error => {
                return Err(GatewayError::AuthRejected(
                    login.error_detail().unwrap_or_default(),
                ));
            }
        }
    }
    Err(GatewayError::Closed)
}

/// An authenticated connection with its pumps running.
///
/// Inbound frames arrive on `frames`; the channel closes when the link
/// fails. Dropping the link stops the pumps and closes the socket.
pub(crate) struct Link {
    pub(crate) frames: mpsc::Receiver<Frame>,
    write_tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Link {
    pub(crate) fn spawn(
        framed: GatewayFramed,
        queue: mpsc::UnboundedSender<Job>,
        config: &GatewayConfig,
    ) -> Self {
        let (sink, stream) = framed.split();
        let (write_tx, write_rx) = mpsc::channel::<Frame>(32);
        let (frames_tx, frames) = mpsc::channel::<Frame>(256);
        let cancel = CancellationToken::new();

        let mut handles = vec![
            tokio::spawn(pumps::write::write_pump(sink, write_rx, cancel.clone())),
            tokio::spawn(pumps::read::read_pump(stream, frames_tx, cancel.clone())),
            tokio::spawn(pumps::ticker::ticker_pump(
                queue.clone(),
                config.keepalive,
                Job::keepalive,
                cancel.clone(),
            )),
        ];
        if let Some(period) = config.refresh_interval {
            handles.push(tokio::spawn(pumps::ticker::ticker_pump(
                queue,
                period,
                Job::refresh,
                cancel.clone(),
            )));
        }

        Self {
            frames,
            write_tx,
            cancel,
            handles,
        }
    }

    /// Queues a frame for the write pump.
    pub(crate) async fn send(&self, frame: Frame) -> Result<(), GatewayError> {
        self.write_tx.send(frame).await.map_err(|_| GatewayError::Closed)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}
