use thiserror::Error;

use crate::websocket::ChannelId;

/// Top-level error type for the `scanlink-api` crate.
///
/// Covers the wire layer only: opening a channel, encoding outbound
/// envelopes, decoding inbound ones. `scanlink-core` folds these into its
/// single "last error" value.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket handshake or upgrade failed.
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// The channel task has already finished; nothing can be sent on it.
    #[error("Channel {0} is no longer running")]
    ChannelGone(ChannelId),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// Outbound message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Inbound frame was not a JSON object with a string `type`, with the
    /// raw body kept for debugging.
    #[error("Malformed message: {message}")]
    Decode { message: String, body: String },
}

impl Error {
    /// Returns `true` if the failure concerns a single message and leaves the
    /// channel itself usable.
    pub fn is_message_scoped(&self) -> bool {
        matches!(self, Self::Encode(_) | Self::Decode { .. })
    }
}
