//! Command processor.
//!
//! A single task owns the gateway link. Commands from callers, keep-alive
//! pings and refreshes share one FIFO queue and run one at a time: the
//! next request frame is written only after the previous command reached
//! a terminal status. Frames that do not belong to the running command
//! are unsolicited and go to the event listeners.
//!
//! ```no_run
//! # async fn demo() -> Result<(), klf200_gateway::GatewayError> {
//! use klf200_gateway::{CommandProcessor, GatewayConfig};
//! use klf200_protocol::{Command, Velocity};
//!
//! let processor = CommandProcessor::connect(GatewayConfig::new("192.168.1.50", "velux123")).await?;
//! let done = processor.execute_command(Command::set_velocity(3, Velocity::Silent)).await;
//! println!("{:?} {:?}", done.status(), done.error_detail());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use klf200_protocol::descriptor::{node_event, remaining_seconds};
use klf200_protocol::{
    Command, CommandCode, CommandError, CommandKind, CommandStatus, Frame, NodeEvent, WaitClass,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::listeners::{EventListener, ListenerId, ListenerRegistry};
use crate::session::SessionAllocator;
use crate::transport::{Connector, Link, TcpConnector};
use crate::types::{ConnectionState, GatewayProperties};

/// Who is waiting for a command.
pub(crate) enum Origin {
    Caller(oneshot::Sender<Command>),
    /// Keep-alive, periodic refresh or post-connect property refresh.
    Internal,
}

/// A queued command.
pub(crate) struct Job {
    command: Command,
    origin: Origin,
}

impl Job {
    fn internal(command: Command) -> Self {
        Self {
            command,
            origin: Origin::Internal,
        }
    }

    pub(crate) fn keepalive() -> Self {
        Self::internal(Command::ping())
    }

    pub(crate) fn refresh() -> Self {
        Self::internal(Command::get_all_nodes())
    }

    pub(crate) fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

/// Result of a command submitted with [`CommandProcessor::dispatch_command`].
pub struct Completion {
    rx: oneshot::Receiver<Command>,
    submitted: Command,
    taken: bool,
}

impl Completion {
    /// Waits until the command is terminal.
    ///
    /// If the processor goes away first, the submitted command comes back
    /// failed with [`CommandError::Shutdown`].
    pub async fn wait(self) -> Command {
        match self.rx.await {
            Ok(command) => command,
            Err(_) => shut_down(self.submitted),
        }
    }

    /// Returns the terminal command once it is available, without waiting.
    /// Yields `Some` at most once.
    pub fn try_take(&mut self) -> Option<Command> {
        if self.taken {
            return None;
        }
        let command = match self.rx.try_recv() {
            Ok(command) => command,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => shut_down(self.submitted.clone()),
        };
        self.taken = true;
        Some(command)
    }
}

fn shut_down(mut command: Command) -> Command {
    command.fail(CommandError::Shutdown);
    command
}

/// Client for one KLF200 gateway.
///
/// Dropping the processor stops its task and closes the connection.
pub struct CommandProcessor {
    queue: mpsc::UnboundedSender<Job>,
    terminate: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    listeners: Arc<ListenerRegistry>,
    properties: Arc<RwLock<GatewayProperties>>,
    handle: Option<JoinHandle<()>>,
}

impl CommandProcessor {
    /// Connects over TCP. See [`with_connector`](Self::with_connector).
    pub async fn connect(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_connector(config, TcpConnector).await
    }

    /// Starts the processor and waits for the first connection attempt.
    ///
    /// A failed first attempt is not an error: the processor keeps
    /// reconnecting in the background and [`is_available`](Self::is_available)
    /// reports `false` until it succeeds. Only invalid configuration fails.
    pub async fn with_connector(
        config: GatewayConfig,
        connector: impl Connector,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let terminate = CancellationToken::new();
        let listeners = Arc::new(ListenerRegistry::default());
        let properties = Arc::new(RwLock::new(GatewayProperties::default()));

        let dispatcher = Dispatcher {
            config,
            connector: Arc::new(connector),
            sessions: SessionAllocator::new(),
            listeners: listeners.clone(),
            properties: properties.clone(),
            state: state_tx,
            queue_rx,
            queue_tx: queue_tx.clone(),
            terminate: terminate.clone(),
            connected_once: false,
        };
        let handle = tokio::spawn(dispatcher.run());

        let mut first = state_rx.clone();
        let _ = first
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await;

        Ok(Self {
            queue: queue_tx,
            terminate,
            state: state_rx,
            listeners,
            properties,
            handle: Some(handle),
        })
    }

    /// Runs a command to completion and returns it in its terminal state.
    ///
    /// Never fails: errors are recorded on the returned command.
    pub async fn execute_command(&self, command: Command) -> Command {
        self.dispatch_command(command).wait().await
    }

    /// Queues a command without waiting for it.
    ///
    /// Submitting [`Command::terminate`] is the same as [`shutdown`](Self::shutdown)
    /// without waiting; the command comes back unchanged. Login commands
    /// are refused, the processor logs in by itself.
    pub fn dispatch_command(&self, mut command: Command) -> Completion {
        let (tx, rx) = oneshot::channel();
        let submitted = command.clone();
        match command.kind() {
            CommandKind::Terminate => {
                self.terminate.cancel();
                let _ = tx.send(command);
            }
            CommandKind::Login => {
                command.fail(CommandError::InvalidParameter(
                    "login is performed by the processor".into(),
                ));
                let _ = tx.send(command);
            }
            _ => {
                let job = Job {
                    command,
                    origin: Origin::Caller(tx),
                };
                if self.queue.send(job).is_err() {
                    debug!("command submitted after the processor stopped");
                }
            }
        }
        Completion {
            rx,
            submitted,
            taken: false,
        }
    }

    /// Registers a listener for unsolicited node events.
    pub fn register_event_listener(&self, listener: impl EventListener + 'static) -> ListenerId {
        self.listeners.register(Arc::new(listener))
    }

    /// Returns `false` when `id` was not registered.
    pub fn unregister_event_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// `true` while connected and authenticated.
    pub fn is_available(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Gateway properties read after the last successful login.
    pub fn properties(&self) -> GatewayProperties {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stops the processor ahead of any queued command and closes the link.
    ///
    /// Queued commands fail with [`CommandError::Shutdown`].
    pub async fn shutdown(&mut self) {
        self.terminate.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CommandProcessor {
    fn drop(&mut self) {
        self.terminate.cancel();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher task
// ---------------------------------------------------------------------------

/// Why serving a link stopped.
pub(crate) enum Exit {
    Terminate,
    LinkLost,
}

enum RunOutcome {
    /// The command reached a terminal status.
    Done,
    TimedOut,
    LinkLost,
    Terminate,
}

pub(crate) struct Dispatcher {
    pub(crate) config: GatewayConfig,
    pub(crate) connector: Arc<dyn Connector>,
    sessions: SessionAllocator,
    listeners: Arc<ListenerRegistry>,
    properties: Arc<RwLock<GatewayProperties>>,
    state: watch::Sender<ConnectionState>,
    pub(crate) queue_rx: mpsc::UnboundedReceiver<Job>,
    pub(crate) queue_tx: mpsc::UnboundedSender<Job>,
    pub(crate) terminate: CancellationToken,
    pub(crate) connected_once: bool,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            let Some(mut link) = self.establish().await else {
                break;
            };
            let exit = self.serve(&mut link).await;
            drop(link);
            if matches!(exit, Exit::Terminate) {
                break;
            }
        }
        self.drain();
        self.set_state(ConnectionState::Disconnected);
        info!("command processor stopped");
    }

    async fn serve(&mut self, link: &mut Link) -> Exit {
        if let Some(exit) = self.refresh_properties(link).await {
            return exit;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.terminate.cancelled() => return Exit::Terminate,
                frame = link.frames.recv() => match frame {
                    Some(frame) => self.unsolicited(&frame),
                    None => {
                        warn!("gateway link lost");
                        return Exit::LinkLost;
                    }
                },
                job = self.queue_rx.recv() => match job {
                    Some(job) => {
                        if let Some(exit) = self.process(job, link).await {
                            return exit;
                        }
                    }
                    None => return Exit::Terminate,
                },
            }
        }
    }

    /// Reads version and protocol, sets the clock and turns on the house
    /// status monitor. Optionally reads every node so listeners learn the
    /// current positions.
    async fn refresh_properties(&mut self, link: &mut Link) -> Option<Exit> {
        let mut commands = vec![
            Command::get_version(),
            Command::get_protocol(),
            Command::set_time(Utc::now()),
            Command::enable_home_status_monitor(),
        ];
        if self.config.refresh_on_connect {
            commands.push(Command::get_all_nodes());
        }
        for command in commands {
            if let Some(exit) = self.process(Job::internal(command), link).await {
                return Some(exit);
            }
        }
        debug!(properties = ?self.properties_snapshot(), "gateway properties refreshed");
        None
    }

    /// Runs one job, retrying transient rejections, and hands it back.
    async fn process(&mut self, job: Job, link: &mut Link) -> Option<Exit> {
        let Job {
            mut command,
            origin,
        } = job;
        let pristine = command.clone();
        let mut retries = self.config.transient_retries;

        let outcome = loop {
            let outcome = self.run_command(&mut command, link).await;
            let transient = matches!(outcome, RunOutcome::Done)
                && command.error().is_some_and(CommandError::is_transient);
            if transient && retries > 0 {
                retries -= 1;
                let pause = self.config.confirmation_timeout / 4;
                info!(
                    kind = ?command.kind(),
                    error = %command.error_detail().unwrap_or_default(),
                    retries_left = retries,
                    ?pause,
                    "transient rejection, re-submitting"
                );
                tokio::select! {
                    biased;
                    _ = self.terminate.cancelled() => {
                        command = pristine.clone();
                        command.fail(CommandError::Shutdown);
                        break RunOutcome::Terminate;
                    }
                    () = tokio::time::sleep(pause) => {}
                }
                command = pristine.clone();
                continue;
            }
            break outcome;
        };

        let kind = command.kind();
        self.finish(command, origin);

        match outcome {
            RunOutcome::Done => None,
            RunOutcome::Terminate => Some(Exit::Terminate),
            RunOutcome::LinkLost => Some(Exit::LinkLost),
            RunOutcome::TimedOut if kind == CommandKind::Ping => {
                warn!("keep-alive unanswered, dropping link");
                Some(Exit::LinkLost)
            }
            RunOutcome::TimedOut => self.check_link(link).await,
        }
    }

    /// Sends one command and feeds it frames until it is terminal.
    async fn run_command(&mut self, command: &mut Command, link: &mut Link) -> RunOutcome {
        if command.descriptor().uses_session {
            command.assign_session(self.sessions.allocate());
        }
        let frame = match command.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                command.fail(e);
                return RunOutcome::Done;
            }
        };

        debug!(
            kind = ?command.kind(),
            session = ?command.session_id(),
            code = %format_args!("{:#06x}", frame.code),
            "sending command"
        );
        if link.send(frame).await.is_err() {
            command.fail(CommandError::Connectivity("connection lost".into()));
            return RunOutcome::LinkLost;
        }

        let bound = match command.descriptor().wait {
            WaitClass::Confirmation => self.config.confirmation_timeout,
            WaitClass::Sequence => self.config.session_timeout,
        };
        let deadline = tokio::time::sleep(bound);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.terminate.cancelled() => {
                    command.fail(CommandError::Shutdown);
                    return RunOutcome::Terminate;
                }
                frame = link.frames.recv() => match frame {
                    Some(frame) if command.accepts(&frame) => {
                        command.handle_response(&frame);
                        if command.is_terminal() {
                            return RunOutcome::Done;
                        }
                        if let Some(secs) = remaining_seconds(&frame) {
                            let extended = Instant::now()
                                + Duration::from_secs(secs.into())
                                + self.config.confirmation_timeout;
                            if extended > deadline.deadline() {
                                trace!(secs, "deadline extended by remaining time");
                                deadline.as_mut().reset(extended);
                            }
                        }
                    }
                    Some(frame) => self.unsolicited(&frame),
                    None => {
                        command.fail(CommandError::Connectivity("connection lost".into()));
                        return RunOutcome::LinkLost;
                    }
                },
                () = &mut deadline => {
                    warn!(kind = ?command.kind(), session = ?command.session_id(), ?bound, "command timed out");
                    command.fail(CommandError::Timeout);
                    return RunOutcome::TimedOut;
                }
            }
        }
    }

    /// After a timeout the link is suspect: ping it once.
    async fn check_link(&mut self, link: &mut Link) -> Option<Exit> {
        let mut ping = Command::ping();
        match self.run_command(&mut ping, link).await {
            RunOutcome::Done => {
                debug!("gateway answered ping after timeout");
                None
            }
            RunOutcome::Terminate => Some(Exit::Terminate),
            RunOutcome::TimedOut | RunOutcome::LinkLost => {
                warn!("gateway unresponsive after timeout, reconnecting");
                Some(Exit::LinkLost)
            }
        }
    }

    /// Routes a frame that no running command claimed.
    fn unsolicited(&self, frame: &Frame) {
        if let Some(event) = node_event(frame) {
            debug!(node = event.node_id, position = %event.position, "node event");
            self.listeners.notify(event);
            return;
        }
        match CommandCode::from_u16(frame.code) {
            Some(code) => debug!(%code, "unsolicited frame discarded"),
            None => warn!(
                code = %format_args!("{:#06x}", frame.code),
                "unknown opcode discarded"
            ),
        }
    }

    /// Delivers a terminal command to whoever is waiting for it.
    pub(crate) fn finish(&self, command: Command, origin: Origin) {
        self.record(&command, matches!(origin, Origin::Internal));
        match origin {
            Origin::Caller(reply) => {
                if reply.send(command).is_err() {
                    trace!("caller dropped its completion");
                }
            }
            Origin::Internal => {}
        }
    }

    /// Keeps gateway properties current and posts refreshed positions.
    fn record(&self, command: &Command, internal: bool) {
        if command.status() != CommandStatus::Complete {
            return;
        }
        match command.kind() {
            CommandKind::GetVersion => {
                self.properties_mut(|p| p.version = command.version().cloned());
            }
            CommandKind::GetProtocol => {
                self.properties_mut(|p| p.protocol = command.protocol_version());
            }
            CommandKind::GetAllNodes if internal => {
                for node in command.nodes() {
                    self.listeners.notify(NodeEvent {
                        node_id: node.node_id,
                        position: node.current_position,
                    });
                }
            }
            CommandKind::Ping => trace!(state = ?command.gateway_state(), "keep-alive answered"),
            _ => {}
        }
    }

    fn properties_mut(&self, f: impl FnOnce(&mut GatewayProperties)) {
        f(&mut self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner));
    }

    fn properties_snapshot(&self) -> GatewayProperties {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fails a job submitted while the link is down.
    pub(crate) fn reject_offline(&self, job: Job) {
        let Job {
            mut command,
            origin,
        } = job;
        if matches!(origin, Origin::Caller(_)) {
            debug!(kind = ?command.kind(), "gateway unavailable, failing command");
        }
        command.fail(CommandError::Connectivity("gateway unavailable".into()));
        self.finish(command, origin);
    }

    fn drain(&mut self) {
        self.queue_rx.close();
        while let Ok(job) = self.queue_rx.try_recv() {
            let Job {
                mut command,
                origin,
            } = job;
            command.fail(CommandError::Shutdown);
            self.finish(command, origin);
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state.clone());
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }
}
