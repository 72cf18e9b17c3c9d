//! Write pump: serialises outbound frames onto the socket.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use klf200_protocol::Frame;

use crate::error::GatewayError;

/// Writes frames in the order they were queued.
///
/// A write error cancels the link so the read side shuts down too.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) where
    S: Sink<Frame, Error = GatewayError> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = write_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(frame).await {
                            warn!(error = %e, "gateway write error");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    #[tokio::test]
    async fn writes_in_order() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<Frame>(16);
        let sink = Box::pin(sink::unfold(sink_tx, |tx, frame: Frame| async move {
            let _ = tx.send(frame).await;
            Ok::<_, GatewayError>(tx)
        }));

        let (write_tx, write_rx) = mpsc::channel(16);
        write_tx.send(Frame::new(0x000C, vec![])).await.unwrap();
        write_tx.send(Frame::new(0x0008, vec![])).await.unwrap();
        drop(write_tx);

        write_pump(sink, write_rx, CancellationToken::new()).await;

        assert_eq!(sink_rx.recv().await.unwrap().code, 0x000C);
        assert_eq!(sink_rx.recv().await.unwrap().code, 0x0008);
    }

    #[tokio::test]
    async fn write_error_cancels_link() {
        let sink = Box::pin(sink::unfold((), |(), _frame: Frame| async move {
            Err::<(), _>(GatewayError::Closed)
        }));
        let (write_tx, write_rx) = mpsc::channel(16);
        write_tx.send(Frame::new(0x000C, vec![])).await.unwrap();

        let cancel = CancellationToken::new();
        write_pump(sink, write_rx, cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let sink = Box::pin(sink::unfold((), |(), _frame: Frame| async move {
            Ok::<_, GatewayError>(())
        }));
        let (_write_tx, write_rx) = mpsc::channel::<Frame>(16);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(sink, write_rx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
