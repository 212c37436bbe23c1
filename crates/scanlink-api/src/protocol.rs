//! Message envelopes exchanged over the event channel.
//!
//! Every frame in either direction is a JSON object with a string `type`
//! field. Outbound control traffic (the liveness ping and the scan
//! subscription directives) is strongly typed via [`Directive`]; everything
//! else travels as a free-form [`ChannelEvent`].
//!
//! ```text
//! → {"type":"ping"}
//! ← {"type":"pong"}                       (consumed, never logged)
//! → {"type":"subscribe_scan","scan_id":"scan-42"}
//! ← {"type":"scan_progress","scan_id":"scan-42","progress":40}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ── Reserved message types ──────────────────────────────────────────

/// Liveness request sent once after the channel opens.
pub const PING: &str = "ping";
/// Server acknowledgement of [`PING`].
pub const PONG: &str = "pong";
pub const SUBSCRIBE_SCAN: &str = "subscribe_scan";
pub const UNSUBSCRIBE_SCAN: &str = "unsubscribe_scan";

// ── ScanId ──────────────────────────────────────────────────────────

/// Opaque scan identifier used to filter server push.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(String);

impl ScanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScanId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ScanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ScanId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── ChannelEvent ────────────────────────────────────────────────────

/// A free-form application event.
///
/// `type` is the only field every event is guaranteed to carry. Uses
/// `#[serde(flatten)]` to keep all remaining fields, so nothing the server
/// sends is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Event type, e.g. `"scan_progress"`, `"finding_created"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Every field other than `type`.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ChannelEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Builder-style payload field insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Control messages the client itself originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Ping,
    SubscribeScan { scan_id: ScanId },
    UnsubscribeScan { scan_id: ScanId },
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => PING,
            Self::SubscribeScan { .. } => SUBSCRIBE_SCAN,
            Self::UnsubscribeScan { .. } => UNSUBSCRIBE_SCAN,
        }
    }
}

/// Anything that can be written to the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Directive(Directive),
    Event(ChannelEvent),
}

impl OutboundMessage {
    pub fn kind(&self) -> &str {
        match self {
            Self::Directive(d) => d.kind(),
            Self::Event(e) => &e.kind,
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Error::Encode)
    }
}

impl From<Directive> for OutboundMessage {
    fn from(directive: Directive) -> Self {
        Self::Directive(directive)
    }
}

impl From<ChannelEvent> for OutboundMessage {
    fn from(event: ChannelEvent) -> Self {
        Self::Event(event)
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// A decoded inbound frame.
///
/// Unrecognized types are ordinary events; only the liveness
/// acknowledgement gets its own variant.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Pong,
    Event(ChannelEvent),
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let event: ChannelEvent = serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
            body: text.to_owned(),
        })?;

        if event.is_type(PONG) {
            Ok(Self::Pong)
        } else {
            Ok(Self::Event(event))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
