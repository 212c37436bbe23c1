// ── Connection manager ──
//
// Deterministic state machine for one event channel client. Every input
// (consumer operation, channel signal, timer firing, environment change)
// is a method call; every effect goes out through the injected
// `Transport` and `Scheduler`. Nothing here awaits, so the whole machine
// is driven by hand in tests and by `EventChannel` at runtime.
//
// Invariants: at most one current channel handle and at most one pending
// timer. Signals from any other handle are stale.

use std::sync::Arc;
use std::time::Duration;

use scanlink_api::{
    ChannelEvent, ChannelId, ChannelSignal, CloseInfo, CloseReason, Directive, InboundMessage,
    OutboundMessage, ScanId,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::endpoint;
use crate::environment::{
    Connectivity, EnvironmentChange, EnvironmentWatch, PageOrigin, Visibility,
};
use crate::error::ChannelError;
use crate::event_log::EventLog;
use crate::policy::RetryDecision;
use crate::scheduler::{Scheduler, Timer, TimerFired, TimerId};
use crate::subscription::SubscriptionRegistry;
use crate::transport::Transport;

/// Pause between the disconnect and connect halves of `reconnect()`.
pub const MANUAL_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Buffer size of the notice broadcast.
pub const NOTICE_CHANNEL_CAPACITY: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// An attempt is in flight or a channel is open.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

// ── ClientStatus / ChannelNotice ─────────────────────────────────────

/// Snapshot published after every input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ConnectionState,
    /// Consumer-facing connection flag. Drops to `false` as soon as the
    /// environment reports offline, before the transport notices.
    pub connected: bool,
    /// Automatic attempts since the last successful open.
    pub attempts: u32,
    pub last_error: Option<ChannelError>,
    pub subscriptions: Vec<ScanId>,
}

/// Lifecycle callbacks, delivered on a broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelNotice {
    Opened {
        channel: ChannelId,
    },
    Closed {
        channel: ChannelId,
        /// Closing handshake completed.
        clean: bool,
        /// Closed because the page went into the background.
        suspended: bool,
        code: u16,
        reason: String,
    },
    Event(Arc<ChannelEvent>),
    Error(ChannelError),
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    Failed {
        attempts: u32,
    },
}

// ── ChannelClient ────────────────────────────────────────────────────

/// The connection manager. See the module header for the driving model.
pub struct ChannelClient<T: Transport, S: Scheduler> {
    config: ClientConfig,
    origin: watch::Receiver<PageOrigin>,
    transport: T,
    scheduler: S,

    state: ConnectionState,
    channel: Option<ChannelId>,
    timer: Option<(TimerId, Timer)>,
    attempts: u32,
    connected: bool,
    last_error: Option<ChannelError>,
    /// The current handle is being closed by the visibility watcher.
    suspending: bool,
    visibility: Visibility,

    subscriptions: SubscriptionRegistry,
    log: EventLog,
    status: watch::Sender<ClientStatus>,
    notices: broadcast::Sender<ChannelNotice>,
}

impl<T: Transport, S: Scheduler> ChannelClient<T, S> {
    /// Create an idle client. Nothing is opened until [`connect`](Self::connect).
    pub fn new(config: ClientConfig, env: &EnvironmentWatch, transport: T, scheduler: S) -> Self {
        let (status, _) = watch::channel(ClientStatus::default());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        Self {
            config,
            origin: env.origin(),
            transport,
            scheduler,
            state: ConnectionState::Idle,
            channel: None,
            timer: None,
            attempts: 0,
            connected: false,
            last_error: None,
            suspending: false,
            visibility: env.visibility(),
            subscriptions: SubscriptionRegistry::new(),
            log: EventLog::new(),
            status,
            notices,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn events_by_type(&self, kind: &str) -> Vec<Arc<ChannelEvent>> {
        self.log.by_type(kind)
    }

    pub fn latest_by_type(&self, kind: &str) -> Option<Arc<ChannelEvent>> {
        self.log.latest_by_type(kind)
    }

    /// Receiver for the status snapshot.
    pub fn status(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<ChannelNotice> {
        self.notices.subscribe()
    }

    pub fn notice_sender(&self) -> broadcast::Sender<ChannelNotice> {
        self.notices.clone()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Consumer operations ──────────────────────────────────────────

    /// Start a connection attempt unless one is in flight or open.
    ///
    /// Leaving `Failed` resets the attempt counter first. A pending
    /// automatic retry is cancelled in favour of this attempt.
    pub fn connect(&mut self) {
        self.connect_inner();
        self.publish();
    }

    /// Cancel any pending retry, release the live handle, return to `Idle`.
    ///
    /// The released handle's close is not followed by an automatic retry.
    pub fn disconnect(&mut self) {
        self.disconnect_inner(CloseReason::Requested);
        self.publish();
    }

    /// `disconnect()`, then `connect()` after [`MANUAL_RECONNECT_DELAY`].
    pub fn reconnect(&mut self) {
        let was_failed = self.state == ConnectionState::Failed;
        self.disconnect_inner(CloseReason::Requested);
        if was_failed {
            self.attempts = 0;
        }

        debug!(delay_ms = duration_ms(MANUAL_RECONNECT_DELAY), "Manual reconnect scheduled");
        self.set_timer(MANUAL_RECONNECT_DELAY, Timer::ManualReconnect);
        self.publish();
    }

    /// Write one message on the open channel.
    ///
    /// Never buffers: without an open channel the message is dropped and
    /// [`ChannelError::NotConnected`] recorded.
    pub fn send(&mut self, message: impl Into<OutboundMessage>) {
        let message = message.into();
        if self.state.is_open() {
            self.dispatch(&message);
        } else {
            debug!(kind = message.kind(), state = %self.state, "Dropping send, channel not open");
            self.record_error(ChannelError::NotConnected);
        }
        self.publish();
    }

    /// Add `scan_id` to the subscription set, announcing it if open.
    pub fn subscribe(&mut self, scan_id: impl Into<ScanId>) {
        let directive = self.subscriptions.subscribe(scan_id.into());
        self.announce(directive);
        self.publish();
    }

    /// Remove `scan_id` from the subscription set, announcing it if open.
    pub fn unsubscribe(&mut self, scan_id: impl Into<ScanId>) {
        let directive = self.subscriptions.unsubscribe(scan_id.into());
        self.announce(directive);
        self.publish();
    }

    /// Empty the event log. Connection state is untouched.
    pub fn clear(&self) {
        self.log.clear();
    }

    /// Release everything: timer, handle, counter. The client stays usable.
    pub fn teardown(&mut self) {
        self.disconnect_inner(CloseReason::Requested);
        self.attempts = 0;
        info!("Channel client torn down");
        self.publish();
    }

    // ── Runtime inputs ───────────────────────────────────────────────

    /// Apply a lifecycle report from the transport.
    pub fn handle_signal(&mut self, signal: ChannelSignal) {
        let id = signal.channel();
        if self.channel != Some(id) {
            self.handle_stale(signal);
            return;
        }

        match signal {
            ChannelSignal::Opened(_) => self.on_opened(id),
            ChannelSignal::Message(_, text) => self.on_message(&text),
            ChannelSignal::Error(_, message) => {
                // The close that follows is what drives the state machine.
                warn!(channel = %id, error = %message, "Channel error");
                self.record_error(ChannelError::Transport { message });
            }
            ChannelSignal::Closed(_, info) => self.on_closed(id, info),
        }
        self.publish();
    }

    /// Apply a timer firing. Only the single pending timer is honoured.
    pub fn handle_timer(&mut self, fired: TimerFired) {
        match self.timer {
            Some((id, _)) if id == fired.id => self.timer = None,
            _ => {
                trace!(timer = ?fired.timer, "Ignoring stale timer");
                return;
            }
        }

        match fired.timer {
            Timer::Reconnect => {
                info!(attempt = self.attempts, "Reconnecting");
                self.open_channel();
            }
            Timer::ManualReconnect => self.connect_inner(),
        }
        self.publish();
    }

    /// Visibility watcher.
    pub fn on_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;

        match visibility {
            Visibility::Hidden => {
                if let (ConnectionState::Open, Some(id)) = (self.state, self.channel) {
                    if !self.suspending {
                        info!(channel = %id, "Page hidden, suspending channel");
                        self.suspending = true;
                        self.transport.close(id, CloseReason::Suspended);
                    }
                }
            }
            Visibility::Visible => {
                if self.watchers_may_connect() && !self.state.is_open() {
                    info!("Page visible, resuming channel");
                    self.connect_inner();
                }
            }
        }
        self.publish();
    }

    /// Connectivity watcher.
    pub fn on_connectivity(&mut self, connectivity: Connectivity) {
        match connectivity {
            Connectivity::Online => {
                if self.watchers_may_connect() && !self.connected {
                    info!("Network online, connecting");
                    self.connect_inner();
                }
            }
            Connectivity::Offline => {
                if self.connected {
                    // The handle's own close still arrives and drives the state.
                    info!("Network offline");
                    self.connected = false;
                }
            }
        }
        self.publish();
    }

    pub fn on_environment(&mut self, change: EnvironmentChange) {
        match change {
            EnvironmentChange::Visibility(v) => self.on_visibility(v),
            EnvironmentChange::Connectivity(c) => self.on_connectivity(c),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    fn connect_inner(&mut self) {
        if self.state.is_busy() {
            debug!(state = %self.state, "Connect ignored, attempt already in flight");
            return;
        }
        if self.state == ConnectionState::Failed {
            self.attempts = 0;
        }
        self.cancel_timer();
        self.open_channel();
    }

    fn disconnect_inner(&mut self, reason: CloseReason) {
        self.cancel_timer();
        if let Some(id) = self.channel.take() {
            info!(channel = %id, "Disconnecting");
            self.transport.close(id, reason);
        }
        self.state = ConnectionState::Idle;
        self.connected = false;
        self.suspending = false;
    }

    /// Resolve the endpoint afresh and open a new handle.
    fn open_channel(&mut self) {
        let origin = self.origin.borrow().clone();
        let url = match endpoint::resolve(&origin, &self.config.path) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot resolve channel endpoint");
                self.state = ConnectionState::Failed;
                self.record_error(e);
                self.notify(ChannelNotice::Failed {
                    attempts: self.attempts,
                });
                return;
            }
        };

        let id = self.transport.open(&url);
        debug!(channel = %id, url = %url, "Connection attempt started");
        self.channel = Some(id);
        self.state = ConnectionState::Connecting;
        self.suspending = false;
    }

    fn on_opened(&mut self, id: ChannelId) {
        info!(channel = %id, "Channel open");
        self.state = ConnectionState::Open;
        self.connected = true;
        self.last_error = None;
        self.attempts = 0;
        self.send_liveness_ping();
        self.notify(ChannelNotice::Opened { channel: id });
    }

    fn on_message(&mut self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(InboundMessage::Pong) => trace!("Liveness acknowledged"),
            Ok(InboundMessage::Event(event)) => {
                trace!(kind = %event.kind, "Event received");
                let event = self.log.append(event);
                self.notify(ChannelNotice::Event(event));
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                self.record_error(e.into());
            }
        }
    }

    fn on_closed(&mut self, id: ChannelId, info: CloseInfo) {
        let suspended = std::mem::take(&mut self.suspending);
        self.channel = None;
        self.state = ConnectionState::Closed;
        self.connected = false;

        if info.clean {
            info!(channel = %id, code = info.code, reason = %info.reason, suspended, "Channel closed");
        } else {
            warn!(channel = %id, code = info.code, reason = %info.reason, "Channel lost");
        }
        self.notify(ChannelNotice::Closed {
            channel: id,
            clean: info.clean,
            suspended,
            code: info.code,
            reason: info.reason.clone(),
        });

        if suspended {
            // The visibility watcher owns recovery from a suspension.
            if self.visibility == Visibility::Visible && self.config.policy.auto_reconnect {
                self.connect_inner();
            }
            return;
        }

        if !info.clean {
            self.record_error(ChannelError::ConnectionLost {
                code: info.code,
                reason: info.reason,
            });
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        match self.config.policy.decide(self.attempts) {
            RetryDecision::Retry { attempt, delay } => {
                self.attempts = attempt;
                info!(attempt, delay_ms = duration_ms(delay), "Reconnect scheduled");
                self.set_timer(delay, Timer::Reconnect);
                self.notify(ChannelNotice::ReconnectScheduled { attempt, delay });
            }
            RetryDecision::GiveUp => {
                warn!(attempts = self.attempts, "Giving up on reconnection");
                self.state = ConnectionState::Failed;
                self.record_error(ChannelError::RetriesExhausted {
                    attempts: self.attempts,
                });
                self.notify(ChannelNotice::Failed {
                    attempts: self.attempts,
                });
            }
            RetryDecision::Disabled => debug!("Automatic reconnect disabled"),
        }
    }

    fn handle_stale(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Opened(id) => {
                // An attempt released mid-handshake: close it now that it finished.
                debug!(channel = %id, "Closing superseded channel");
                self.transport.close(id, CloseReason::Abandoned);
            }
            other => trace!(channel = %other.channel(), "Ignoring signal from released channel"),
        }
    }

    // ── Effects ──────────────────────────────────────────────────────

    /// One liveness ping per successful open.
    fn send_liveness_ping(&mut self) {
        self.dispatch(&Directive::Ping.into());
    }

    fn announce(&mut self, directive: Directive) {
        if self.state.is_open() {
            self.dispatch(&directive.into());
        } else {
            debug!(kind = directive.kind(), "Channel not open, directive not sent");
        }
    }

    fn dispatch(&mut self, message: &OutboundMessage) {
        let Some(id) = self.channel else {
            self.record_error(ChannelError::NotConnected);
            return;
        };

        let result = message
            .encode()
            .and_then(|text| self.transport.send(id, text));
        match result {
            Ok(()) => trace!(channel = %id, kind = message.kind(), "Message sent"),
            Err(e) => {
                warn!(channel = %id, error = %e, "Send failed");
                self.record_error(e.into());
            }
        }
    }

    fn set_timer(&mut self, delay: Duration, timer: Timer) {
        self.cancel_timer();
        let id = self.scheduler.schedule(delay, timer);
        self.timer = Some((id, timer));
    }

    fn cancel_timer(&mut self) {
        if let Some((id, timer)) = self.timer.take() {
            debug!(timer = ?timer, "Cancelling pending timer");
            self.scheduler.cancel(id);
        }
    }

    fn watchers_may_connect(&self) -> bool {
        self.config.policy.auto_reconnect && self.state != ConnectionState::Failed
    }

    fn record_error(&mut self, err: ChannelError) {
        self.last_error = Some(err.clone());
        self.notify(ChannelNotice::Error(err));
    }

    fn notify(&self, notice: ChannelNotice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        let next = ClientStatus {
            state: self.state,
            connected: self.connected,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            subscriptions: self.subscriptions.to_vec(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────
