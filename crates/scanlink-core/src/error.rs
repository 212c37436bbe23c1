// ── Channel errors ──
//
// The client never unwinds a caller over channel trouble: every failure
// lands in a single "last error" slot on `ClientStatus`. The
// `From<scanlink_api::Error>` impl translates wire-layer errors into these
// variants.

use thiserror::Error;

/// The value carried in the client's "last error" slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    // ── Recoverable ──────────────────────────────────────────────────
    #[error("Cannot send, channel is not open")]
    NotConnected,

    #[error("Dropped malformed message: {reason}")]
    MalformedMessage { reason: String },

    #[error("Could not encode outbound message: {reason}")]
    Encode { reason: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Connection lost (code {code}): {reason}")]
    ConnectionLost { code: u16, reason: String },

    // ── Terminal ─────────────────────────────────────────────────────
    #[error("Gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Cannot resolve channel endpoint: {message}")]
    Endpoint { message: String },
}

impl ChannelError {
    /// Returns `true` if the client moved to `Failed` because of this error
    /// and will stay there until the consumer connects again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Endpoint { .. })
    }

    /// Returns `true` for errors that leave the connection state untouched.
    pub fn is_recoverable(&self) -> bool {
        !self.is_terminal()
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<scanlink_api::Error> for ChannelError {
    fn from(err: scanlink_api::Error) -> Self {
        match err {
            scanlink_api::Error::Connect(message) => ChannelError::Transport { message },
            scanlink_api::Error::ChannelGone(id) => ChannelError::Transport {
                message: format!("channel {id} is no longer running"),
            },
            scanlink_api::Error::InvalidUrl(e) => ChannelError::Endpoint {
                message: e.to_string(),
            },
            scanlink_api::Error::Encode(e) => ChannelError::Encode {
                reason: e.to_string(),
            },
            scanlink_api::Error::Decode { message, body: _ } => {
                ChannelError::MalformedMessage { reason: message }
            }
        }
    }
}
