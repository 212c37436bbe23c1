// ── Reconnection policy ──
//
// Fixed-delay retry with a bounded attempt counter. The counter itself
// lives in the connection manager; this module only decides.

use std::time::Duration;

/// Delay between automatic attempts unless configured otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
/// Cap on consecutive automatic attempts unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Automatic reconnection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before each automatic attempt. Default: 5s.
    pub interval: Duration,
    /// Maximum consecutive automatic attempts. Default: 5.
    pub max_attempts: u32,
    /// Whether automatic recovery happens at all. Default: `true`.
    pub auto_reconnect: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_reconnect: true,
        }
    }
}

/// Outcome of consulting the policy after an unexpected closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule attempt number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The cap is reached; the client must fail.
    GiveUp,
    /// Automatic recovery is switched off; stay closed.
    Disabled,
}

impl ReconnectPolicy {
    /// Policy that never reconnects on its own.
    pub fn manual() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::default()
        }
    }

    /// Decide what follows an unexpected closure, given the number of
    /// attempts already made since the last successful open.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if !self.auto_reconnect {
            RetryDecision::Disabled
        } else if attempts >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                attempt: attempts + 1,
                delay: self.interval,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.auto_reconnect);
    }

    #[test]
    fn retries_until_cap_then_gives_up() {
        let policy = ReconnectPolicy {
            interval: Duration::from_millis(100),
            max_attempts: 2,
            auto_reconnect: true,
        };

        assert_eq!(
            policy.decide(0),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            policy.decide(1),
            RetryDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(policy.decide(2), RetryDecision::GiveUp);
        assert_eq!(policy.decide(7), RetryDecision::GiveUp);
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(ReconnectPolicy::manual().decide(0), RetryDecision::Disabled);
    }

    #[test]
    fn zero_attempts_gives_up_immediately() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.decide(0), RetryDecision::GiveUp);
    }
}
