//! Read pump: forwards decoded frames to the processor.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use klf200_protocol::Frame;

use crate::error::GatewayError;

/// Reads frames until the stream ends, fails or is cancelled.
///
/// Returning drops `frames_tx`, which is how the processor learns the
/// link is gone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    frames_tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Frame, GatewayError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = read.next() => {
                match item {
                    Some(Ok(frame)) => {
                        trace!(
                            code = %format_args!("{:#06x}", frame.code),
                            len = frame.payload.len(),
                            "frame received"
                        );
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "gateway read error");
                        break;
                    }
                    None => {
                        debug!("gateway closed the connection");
                        break;
                    }
                }
            }
        }
    }
    cancel.cancel();
}
