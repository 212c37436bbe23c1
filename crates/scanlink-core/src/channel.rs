// ── Event channel façade ──
//
// The single entry point the rest of the application uses. Owns a
// `ChannelClient` on a background tokio task and feeds it consumer
// commands, channel signals, timer firings and environment transitions.
// Reads (status, event log) never touch the task.

use std::sync::Arc;
use std::time::Duration;

use scanlink_api::{ChannelEvent, ChannelSignal, OutboundMessage, ScanId};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{ChannelClient, ChannelNotice, ClientStatus, ConnectionState};
use crate::config::ClientConfig;
use crate::environment::{Environment, EnvironmentWatch};
use crate::error::ChannelError;
use crate::event_log::EventLog;
use crate::scheduler::{TimerFired, TokioScheduler};
use crate::transport::WsTransport;

type LiveClient = ChannelClient<WsTransport, TokioScheduler>;

/// How long teardown waits for released channels to finish closing.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

enum Command {
    Connect,
    Disconnect,
    Reconnect,
    Send(OutboundMessage),
    Subscribe(ScanId),
    Unsubscribe(ScanId),
}

// ── EventChannel ─────────────────────────────────────────────────────

/// Handle to a running event channel client.
///
/// Cheaply cloneable via `Arc<EventChannelInner>`. Operations are
/// fire-and-forget: failures land in [`ClientStatus::last_error`], never in
/// the caller's control flow. Dropping the last handle (or calling
/// [`shutdown`](Self::shutdown)) tears the client down.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<EventChannelInner>,
}

struct EventChannelInner {
    config: ClientConfig,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ClientStatus>,
    log: EventLog,
    notices: broadcast::Sender<ChannelNotice>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Create the client and start its driver task. Does NOT connect;
    /// call [`connect()`](Self::connect).
    ///
    /// Registers one listener with `env` for the lifetime of the client.
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ClientConfig, env: &Environment) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let watch = env.watch();
        let client = ChannelClient::new(
            config.clone(),
            &watch,
            WsTransport::new(signals_tx),
            TokioScheduler::new(timers_tx),
        );

        let status = client.status();
        let log = client.log().clone();
        let notices = client.notice_sender();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(drive(
            client,
            Inputs {
                commands: commands_rx,
                signals: signals_rx,
                timers: timers_rx,
                env: watch,
            },
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(EventChannelInner {
                config,
                commands: commands_tx,
                status,
                log,
                notices,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Latest status snapshot.
    pub fn status(&self) -> ClientStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    /// Consumer-facing connection flag.
    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().connected
    }

    pub fn last_error(&self) -> Option<ChannelError> {
        self.inner.status.borrow().last_error.clone()
    }

    /// The event log in arrival order.
    pub fn events(&self) -> Vec<Arc<ChannelEvent>> {
        self.inner.log.snapshot()
    }

    pub fn events_by_type(&self, kind: &str) -> Vec<Arc<ChannelEvent>> {
        self.inner.log.by_type(kind)
    }

    pub fn latest_by_type(&self, kind: &str) -> Option<Arc<ChannelEvent>> {
        self.inner.log.latest_by_type(kind)
    }

    /// Empty the event log. Connection state is untouched.
    pub fn clear(&self) {
        self.inner.log.clear();
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    pub fn send(&self, message: impl Into<OutboundMessage>) {
        self.command(Command::Send(message.into()));
    }

    pub fn subscribe(&self, scan_id: impl Into<ScanId>) {
        self.command(Command::Subscribe(scan_id.into()));
    }

    pub fn unsubscribe(&self, scan_id: impl Into<ScanId>) {
        self.command(Command::Unsubscribe(scan_id.into()));
    }

    fn command(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!("Event channel already shut down, command dropped");
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to lifecycle notices (opened, closed, events, errors).
    pub fn notices(&self) -> broadcast::Receiver<ChannelNotice> {
        self.inner.notices.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.inner.status.clone()
    }

    /// Status snapshots as a `Stream`, starting with the current one.
    pub fn status_stream(&self) -> WatchStream<ClientStatus> {
        WatchStream::new(self.inner.status.clone())
    }

    pub fn watch_events(&self) -> watch::Receiver<Vec<Arc<ChannelEvent>>> {
        self.inner.log.watch()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the client shuts down first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ClientStatus) -> bool,
    ) -> Option<ClientStatus> {
        let mut rx = self.inner.status.clone();
        let status = rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(status.clone())
    }

    /// Wait until the client reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Option<ClientStatus> {
        self.wait_for(|s| s.state == state).await
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Apply every command already issued, then close the channel, cancel
    /// timers, release environment listeners, and wait for the driver task
    /// to exit. Queued frames and the closing
    /// handshake get up to [`CLOSE_GRACE`] to complete. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(error = %e, "Event channel task ended abnormally");
            }
        }
    }
}

// ── Driver task ──────────────────────────────────────────────────────

struct Inputs {
    commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
    env: EnvironmentWatch,
}

async fn drive(mut client: LiveClient, mut inputs: Inputs, cancel: CancellationToken) {
    let mut env_alive = true;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = inputs.commands.recv() => {
                let Some(command) = command else {
                    // Every façade handle is gone.
                    break;
                };
                apply(&mut client, command);
            }
            Some(signal) = inputs.signals.recv() => client.handle_signal(signal),
            Some(fired) = inputs.timers.recv() => client.handle_timer(fired),
            change = inputs.env.changed(), if env_alive => match change {
                Some(change) => client.on_environment(change),
                None => env_alive = false,
            },
        }
    }

    // Commands issued before shutdown still apply, in order.
    while let Ok(command) = inputs.commands.try_recv() {
        apply(&mut client, command);
    }

    client.teardown();
    // Deregister from the environment before the task reports completion.
    drop(inputs);
    client.transport_mut().drain(CLOSE_GRACE).await;
    info!("Event channel stopped");
}

fn apply(client: &mut LiveClient, command: Command) {
    match command {
        Command::Connect => client.connect(),
        Command::Disconnect => client.disconnect(),
        Command::Reconnect => client.reconnect(),
        Command::Send(message) => client.send(message),
        Command::Subscribe(scan_id) => client.subscribe(scan_id),
        Command::Unsubscribe(scan_id) => client.unsubscribe(scan_id),
    }
}

impl Drop for EventChannelInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
