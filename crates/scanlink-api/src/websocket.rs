//! WebSocket channel task.
//!
//! Each [`ChannelHandle`] owns one background task that performs the
//! WebSocket handshake, forwards inbound text frames, writes outbound ones,
//! and reports its lifecycle as [`ChannelSignal`]s tagged with a
//! [`ChannelId`]. A handle is never reused: reconnecting means opening a new
//! one.
//!
//! Lifecycle signals mirror what a browser `WebSocket` reports:
//! `Opened` once the handshake completes, `Message` per text frame, `Error`
//! for transport failures, and exactly one `Closed` at the end, with
//! `clean` set only when the closing handshake completed.
//!
//! # Example
//!
//! ```rust,ignore
//! use scanlink_api::{ChannelHandle, ChannelId, ChannelSignal};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let url = url::Url::parse("wss://dashboard.example.com/ws")?;
//! let handle = ChannelHandle::open(ChannelId::new(1), url, tx);
//!
//! while let Some(signal) = rx.recv().await {
//!     if let ChannelSignal::Opened(_) = signal {
//!         handle.send_text(r#"{"type":"ping"}"#.into())?;
//!     }
//! }
//! ```

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message, Utf8Bytes};
use url::Url;

use crate::error::Error;

// ── Close codes ──────────────────────────────────────────────────────

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away (used when the hosting environment suspends us).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// No close frame was exchanged.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ── ChannelId ────────────────────────────────────────────────────────

/// Identity of one channel handle. Signals carry it so a consumer can tell
/// the live handle apart from ones it has already replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── CloseReason ──────────────────────────────────────────────────────

/// Why the client is closing a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Consumer asked to disconnect, or the client is being torn down.
    Requested,
    /// Hosting environment went into the background.
    Suspended,
    /// A handle finished its handshake after being replaced or released.
    Abandoned,
}

impl CloseReason {
    pub const fn code(self) -> u16 {
        match self {
            Self::Requested | Self::Abandoned => CLOSE_NORMAL,
            Self::Suspended => CLOSE_GOING_AWAY,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "client disconnect",
            Self::Suspended => "environment suspended",
            Self::Abandoned => "superseded connection attempt",
        }
    }

    fn frame(self) -> CloseFrame {
        CloseFrame {
            code: CloseCode::from(self.code()),
            reason: Utf8Bytes::from_static(self.as_str()),
        }
    }
}

// ── CloseInfo / ChannelSignal ────────────────────────────────────────

/// How a channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// `true` only if the closing handshake completed.
    pub clean: bool,
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            clean: true,
            code,
            reason: reason.into(),
        }
    }

    /// Closure without a close frame (network loss, failed handshake).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            clean: false,
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
        }
    }
}

/// Lifecycle report from a channel task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Opened(ChannelId),
    Message(ChannelId, String),
    Error(ChannelId, String),
    Closed(ChannelId, CloseInfo),
}

impl ChannelSignal {
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::Opened(id) | Self::Message(id, _) | Self::Error(id, _) | Self::Closed(id, _) => {
                *id
            }
        }
    }
}

// ── ChannelHandle ────────────────────────────────────────────────────

enum Outbound {
    Text(String),
    Close(CloseReason),
}

/// Handle to a running channel task.
///
/// Dropping the handle closes the channel with [`CloseReason::Requested`].
pub struct ChannelHandle {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Spawn the channel task. Returns immediately; the handshake outcome
    /// arrives on `signals`.
    ///
    /// Writes and closes issued before the handshake completes are queued
    /// and applied once it does, so a close never aborts a handshake midway.
    pub fn open(id: ChannelId, url: Url, signals: mpsc::UnboundedSender<ChannelSignal>) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            run_channel(id, &url, outbound_rx, &signals).await;
        });

        Self { id, outbound, task }
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: String) -> Result<(), Error> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| Error::ChannelGone(self.id))
    }

    /// Queue a close frame.
    pub fn close(&self, reason: CloseReason) -> Result<(), Error> {
        self.outbound
            .send(Outbound::Close(reason))
            .map_err(|_| Error::ChannelGone(self.id))
    }

    /// `true` once the channel task stopped taking frames.
    pub fn is_finished(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Release the handle and wait for the task to exit. Without a prior
    /// [`close`](Self::close) this closes with [`CloseReason::Requested`].
    pub async fn finish(self) {
        let Self { id, outbound, task } = self;
        drop(outbound);
        if let Err(e) = task.await {
            tracing::debug!(channel = %id, error = %e, "Channel task did not finish cleanly");
        }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn run_channel(
    id: ChannelId,
    url: &Url,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    signals: &mpsc::UnboundedSender<ChannelSignal>,
) {
    // Ignore send errors throughout -- the receiver only goes away when the
    // owning client has been torn down.
    let info = match connect_and_pump(id, url, outbound_rx, signals).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(channel = %id, error = %e, "Channel failed");
            let _ = signals.send(ChannelSignal::Error(id, e.to_string()));
            CloseInfo::abnormal(e.to_string())
        }
    };

    tracing::debug!(channel = %id, clean = info.clean, code = info.code, "Channel closed");
    let _ = signals.send(ChannelSignal::Closed(id, info));
}

/// Perform the handshake, then shuttle frames until the socket ends.
async fn connect_and_pump(
    id: ChannelId,
    url: &Url,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    signals: &mpsc::UnboundedSender<ChannelSignal>,
) -> Result<CloseInfo, Error> {
    tracing::info!(channel = %id, url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Connect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    tracing::info!(channel = %id, "WebSocket connected");
    let _ = signals.send(ChannelSignal::Opened(id));

    let (mut write, mut read) = ws_stream.split();
    let mut sent_close: Option<CloseReason> = None;
    let mut peer_close: Option<CloseInfo> = None;

    loop {
        tokio::select! {
            biased;
            cmd = outbound_rx.recv(), if sent_close.is_none() => {
                let reason = match cmd {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            let _ = signals.send(ChannelSignal::Error(id, e.to_string()));
                        }
                        continue;
                    }
                    Some(Outbound::Close(reason)) => reason,
                    // Handle dropped without an explicit close.
                    None => CloseReason::Requested,
                };

                tracing::debug!(channel = %id, reason = reason.as_str(), "Closing channel");
                sent_close = Some(reason);
                if let Err(e) = write.send(Message::Close(Some(reason.frame()))).await {
                    tracing::debug!(channel = %id, error = %e, "Close frame not sent");
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = signals.send(ChannelSignal::Message(id, text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let info = frame.map_or_else(
                            || CloseInfo::clean(CLOSE_NORMAL, ""),
                            |cf| CloseInfo::clean(u16::from(cf.code), cf.reason.as_str()),
                        );
                        tracing::info!(channel = %id, code = info.code, reason = %info.reason, "Close frame received");
                        // tungstenite answers the close; keep reading until the socket drains.
                        peer_close = Some(info);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!(channel = %id, "WebSocket ping");
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                    // tokio-tungstenite ends the stream once the closing handshake completes.
                    Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                        return Ok(peer_close.unwrap_or_else(|| match sent_close {
                            Some(reason) => CloseInfo::clean(reason.code(), reason.as_str()),
                            None => CloseInfo::abnormal("stream ended without close frame"),
                        }));
                    }
                    Some(Err(e)) => {
                        if let Some(info) = peer_close {
                            return Ok(info);
                        }
                        let _ = signals.send(ChannelSignal::Error(id, e.to_string()));
                        return Ok(CloseInfo::abnormal(e.to_string()));
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reasons_map_to_codes() {
        assert_eq!(CloseReason::Requested.code(), CLOSE_NORMAL);
        assert_eq!(CloseReason::Abandoned.code(), CLOSE_NORMAL);
        assert_eq!(CloseReason::Suspended.code(), CLOSE_GOING_AWAY);
        assert_ne!(CloseReason::Suspended.as_str(), CloseReason::Requested.as_str());
    }

    #[test]
    fn abnormal_close_is_unclean() {
        let info = CloseInfo::abnormal("reset");
        assert!(!info.clean);
        assert_eq!(info.code, CLOSE_ABNORMAL);
        assert!(CloseInfo::clean(CLOSE_NORMAL, "bye").clean);
    }

    #[test]
    fn signal_reports_its_channel() {
        let id = ChannelId::new(7);
        assert_eq!(ChannelSignal::Opened(id).channel(), id);
        assert_eq!(ChannelSignal::Message(id, "{}".into()).channel(), id);
        assert_eq!(
            ChannelSignal::Closed(id, CloseInfo::abnormal("x")).channel(),
            id
        );
        assert_eq!(id.to_string(), "#7");
    }

    #[tokio::test]
    async fn failed_handshake_reports_error_then_unclean_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Port 9 (discard) on localhost is closed on test machines.
        let url = Url::parse("ws://127.0.0.1:9/ws").unwrap();
        let _handle = ChannelHandle::open(ChannelId::new(1), url, tx);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ChannelSignal::Error(id, _) if id == ChannelId::new(1)));

        let ChannelSignal::Closed(_, info) = rx.recv().await.unwrap() else {
            panic!("expected close after failed handshake");
        };
        assert!(!info.clean);
        assert_eq!(info.code, CLOSE_ABNORMAL);
    }
}
