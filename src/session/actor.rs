//! Session manager actor.
//!
//! A single task owns the [`ConnectionState`]. The public [`SessionManager`]
//! handle sends it commands; the connect loop, the health loop and the stream
//! listeners report back through an event channel. Every connection attempt gets
//! a new generation number, and events from an older generation are ignored, so
//! several streams closing at once trigger exactly one reconnect.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::dispatch::CommandHandler;
use super::health::health_loop;
use super::listener::listen;
use super::state::{ConnectionState, HealthStatus};
use super::transport::{CommandMethod, CommandStream, Identity, Transport, TransportError};
use crate::config::SessionSettings;
use crate::error::{SdkError, SdkResult};

/// Capacity of the handle → actor command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

enum SessionCommand {
    Start { done: oneshot::Sender<()> },
    Stop { done: oneshot::Sender<()> },
}

/// Reports from the tasks of one connection generation.
pub(crate) enum SessionEvent {
    Opened {
        generation: u64,
        streams: Vec<(CommandMethod, CommandStream)>,
    },
    HealthFailed {
        generation: u64,
        reason: String,
    },
    StreamClosed {
        generation: u64,
        method: CommandMethod,
    },
}

/// Handle to the session manager actor.
///
/// Cloning the handle is cheap. The actor stops its tasks and exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    health: Arc<Mutex<HealthStatus>>,
}

impl SessionManager {
    /// Spawn the actor on the current tokio runtime. The session starts `Closed`.
    pub fn spawn(
        settings: SessionSettings,
        identity: Identity,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let health = Arc::new(Mutex::new(HealthStatus::default()));

        let actor = SessionActor {
            settings,
            identity,
            transport,
            handler,
            state: state_tx,
            events: events_tx,
            health: Arc::clone(&health),
            generation: 0,
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
            health,
        }
    }

    /// Begin connecting. A no-op unless the session is `Closed`.
    pub async fn start(&self) -> SdkResult<()> {
        let (done, ack) = oneshot::channel();
        self.send(SessionCommand::Start { done }).await?;
        ack.await.map_err(|_| SdkError::SessionTerminated)
    }

    /// Tear the session down and wait until it is `Closed`.
    pub async fn stop(&self) -> SdkResult<()> {
        let (done, ack) = oneshot::channel();
        self.send(SessionCommand::Stop { done }).await?;
        ack.await.map_err(|_| SdkError::SessionTerminated)
    }

    async fn send(&self, command: SessionCommand) -> SdkResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SdkError::SessionTerminated)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Non-blocking check used by the outbound path.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> SdkResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| SdkError::SessionTerminated)
    }

    /// Snapshot of the health check diagnostics.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.health.lock().clone()
    }
}

struct SessionActor {
    settings: SessionSettings,
    identity: Identity,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn CommandHandler>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    health: Arc<Mutex<HealthStatus>>,
    /// Generation of the current connection attempt
    generation: u64,
    /// Cancels every task of the current generation
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Start { done }) => {
                        self.start();
                        let _ = done.send(());
                    }
                    Some(SessionCommand::Stop { done }) => {
                        self.stop().await;
                        let _ = done.send(());
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event),
            }
        }

        tracing::debug!("All session handles dropped; shutting down session manager");
        self.token.cancel();
        self.tasks.shutdown().await;
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "Ignoring illegal session transition");
            return false;
        }
        tracing::info!(from = %current, to = %next, generation = self.generation, "Session state changed");
        self.state.send_replace(next);
        true
    }

    fn start(&mut self) {
        if self.current() != ConnectionState::Closed {
            tracing::debug!(state = %self.current(), "start() ignored, session already active");
            return;
        }
        if self.transition(ConnectionState::Connecting) {
            self.spawn_connect_loop();
        }
    }

    async fn stop(&mut self) {
        if self.current() == ConnectionState::Closed {
            return;
        }
        if !self.transition(ConnectionState::Closing) {
            return;
        }

        self.token.cancel();
        self.tasks.shutdown().await;

        if let Err(err) = self.handler.shutdown().await {
            tracing::warn!(error = %err, "Driver stop callback failed");
        }
        self.transition(ConnectionState::Closed);
    }

    /// Cancel the current generation and start a fresh connect loop.
    ///
    /// Any previous connect loop, health loop and listener belongs to the old
    /// generation and is gone before the new loop is spawned.
    fn spawn_connect_loop(&mut self) {
        self.token.cancel();
        // Dropping the set aborts whatever is left of the old generation.
        drop(std::mem::take(&mut self.tasks));

        self.generation += 1;
        self.token = CancellationToken::new();

        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let identity = self.identity.clone();
        let retry_interval = self.settings.retry_interval;
        let token = self.token.clone();
        let events = self.events.clone();

        self.tasks.spawn(async move {
            connect_loop(generation, transport, identity, retry_interval, token, events).await;
        });
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { generation, streams } => {
                if generation != self.generation || !self.current().is_connecting() {
                    tracing::debug!(generation, "Discarding streams opened by a stale connect loop");
                    return;
                }
                if self.transition(ConnectionState::Running) {
                    self.spawn_session(streams);
                }
            }
            SessionEvent::HealthFailed { generation, reason } => {
                if self.is_current_session(generation) {
                    tracing::warn!(generation, reason = %reason, "Health check failed; reconnecting");
                    self.reconnect();
                }
            }
            SessionEvent::StreamClosed { generation, method } => {
                if self.is_current_session(generation) {
                    tracing::warn!(generation, method = %method, "Command stream closed; reconnecting");
                    self.reconnect();
                }
            }
        }
    }

    fn is_current_session(&self, generation: u64) -> bool {
        generation == self.generation && self.current() == ConnectionState::Running
    }

    fn reconnect(&mut self) {
        if self.transition(ConnectionState::Reconnecting) {
            self.spawn_connect_loop();
        }
    }

    /// Spawn one listener per stream plus the health loop.
    fn spawn_session(&mut self, streams: Vec<(CommandMethod, CommandStream)>) {
        let generation = self.generation;

        for (method, stream) in streams {
            let handler = Arc::clone(&self.handler);
            let token = self.token.clone();
            let events = self.events.clone();
            self.tasks.spawn(async move {
                listen(generation, method, stream, handler, token, events).await;
            });
        }

        let transport = Arc::clone(&self.transport);
        let identity = self.identity.clone();
        let settings = self.settings.clone();
        let health = Arc::clone(&self.health);
        let token = self.token.clone();
        let events = self.events.clone();
        self.tasks.spawn(async move {
            health_loop(generation, transport, identity, settings, health, token, events).await;
        });
    }
}

/// Open the full set of command streams, retrying the whole batch until it succeeds.
async fn connect_loop(
    generation: u64,
    transport: Arc<dyn Transport>,
    identity: Identity,
    retry_interval: std::time::Duration,
    token: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let opened = tokio::select! {
            _ = token.cancelled() => return,
            opened = open_all(transport.as_ref(), &identity) => opened,
        };

        match opened {
            Ok(streams) => {
                tracing::info!(generation, attempt, "All command streams open");
                let _ = events.send(SessionEvent::Opened { generation, streams });
                return;
            }
            Err(err) => {
                tracing::warn!(
                    generation,
                    attempt,
                    error = %err,
                    retry_in = ?retry_interval,
                    "Failed to open command streams"
                );
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }
}

/// Open every stream of [`CommandMethod::ALL`]. The first failure discards the batch.
async fn open_all(
    transport: &dyn Transport,
    identity: &Identity,
) -> Result<Vec<(CommandMethod, CommandStream)>, TransportError> {
    let mut streams = Vec::with_capacity(CommandMethod::ALL.len());
    for method in CommandMethod::ALL {
        let stream = transport.open(method, identity).await?;
        streams.push((method, stream));
    }
    Ok(streams)
}
