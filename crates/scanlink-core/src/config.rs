// ── Runtime client configuration ──
//
// These types describe *what* to connect to and *how* to recover.
// They never touch disk; `scanlink-config` or any other consumer builds a
// `ClientConfig` and hands it in.

use crate::policy::ReconnectPolicy;

/// Default endpoint path on the dashboard host.
pub const DEFAULT_PATH: &str = "/ws";

/// Configuration for one event channel client.
///
/// Immutable for the lifetime of the client. The host/security half of the
/// address comes from the [`Environment`](crate::Environment) instead, so it
/// can change between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint path appended to the page host (e.g. `/ws`).
    pub path: String,
    /// Automatic reconnection behaviour.
    pub policy: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}
