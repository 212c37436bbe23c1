// scanlink-core: resilient event channel client between scanlink-api and consumers.

pub mod channel;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod event_log;
pub mod policy;
pub mod scheduler;
pub mod subscription;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::EventChannel;
pub use client::{ChannelClient, ChannelNotice, ClientStatus, ConnectionState};
pub use config::ClientConfig;
pub use environment::{
    Connectivity, Environment, EnvironmentChange, EnvironmentWatch, PageOrigin, Visibility,
};
pub use error::ChannelError;
pub use event_log::EventLog;
pub use policy::{ReconnectPolicy, RetryDecision};
pub use scheduler::{Scheduler, Timer, TimerFired, TimerId, TokioScheduler};
pub use subscription::SubscriptionRegistry;
pub use transport::{Transport, WsTransport};

// Wire types consumers need to talk to the façade.
pub use scanlink_api::{ChannelEvent, ChannelId, CloseReason, Directive, OutboundMessage, ScanId};
