//! Connecting and reconnecting with exponential backoff.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::processor::Dispatcher;
use crate::transport::{self, Link};
use crate::types::ConnectionState;

impl Dispatcher {
    /// Connects and logs in, retrying until it succeeds or the processor
    /// terminates (`None`).
    ///
    /// The first connection is attempted immediately. After a lost link,
    /// and between failed attempts, the delay follows the backoff table.
    /// Once a connection existed or an attempt failed, commands arriving
    /// while the link is down fail fast instead of waiting.
    pub(crate) async fn establish(&mut self) -> Option<Link> {
        let reconnect = self.config.reconnect.clone();
        let mut failures: u32 = 0;
        let mut retry: u32 = u32::from(self.connected_once);

        self.set_state(if retry == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt: retry }
        });

        loop {
            let fail_fast = self.connected_once || failures > 0;

            if retry > 0 {
                let delay = reconnect.delay_for_attempt(retry);
                debug!(attempt = retry, ?delay, "waiting before reconnect");
                self.while_offline(tokio::time::sleep(delay), fail_fast)
                    .await?;
            }

            let connector = self.connector.clone();
            let config = self.config.clone();
            let result = self
                .while_offline(transport::open(connector.as_ref(), &config), fail_fast)
                .await?;

            match result {
                Ok(framed) => {
                    let link = Link::spawn(framed, self.queue_tx.clone(), &self.config);
                    if failures >= reconnect.unavailable_after {
                        info!(failures, "gateway available again");
                    } else if self.connected_once {
                        info!(attempt = retry, "reconnected to gateway");
                    }
                    self.connected_once = true;
                    self.set_state(ConnectionState::Connected);
                    return Some(link);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    retry = retry.saturating_add(1);
                    warn!(
                        host = %self.config.hostname,
                        attempt = failures,
                        error = %e,
                        "gateway connection attempt failed"
                    );
                    if failures >= reconnect.unavailable_after {
                        if failures == reconnect.unavailable_after {
                            warn!(failures, "gateway unavailable, retrying in the background");
                        }
                        self.set_state(ConnectionState::Unavailable);
                    } else {
                        self.set_state(ConnectionState::Reconnecting { attempt: retry });
                    }
                }
            }
        }
    }

    /// Drives `fut` while no link exists. Queued commands are failed when
    /// `fail_fast` is set and left queued otherwise. `None` on terminate.
    async fn while_offline<F: Future>(&mut self, fut: F, fail_fast: bool) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = self.terminate.cancelled() => return None,
                out = &mut fut => return Some(out),
                Some(job) = self.queue_rx.recv(), if fail_fast => self.reject_offline(job),
            }
        }
    }
}
