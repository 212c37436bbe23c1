// scanlink-api: wire envelopes and the WebSocket channel transport

pub mod error;
pub mod protocol;
pub mod websocket;

pub use error::Error;
pub use protocol::{ChannelEvent, Directive, InboundMessage, OutboundMessage, ScanId};
pub use websocket::{ChannelHandle, ChannelId, ChannelSignal, CloseInfo, CloseReason};
