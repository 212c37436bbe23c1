// ── Scan subscription registry ──
//
// Tracks which scans the consumer wants pushed events for. Membership
// changes regardless of transport state; the connection manager decides
// whether the returned directive actually goes out.

use indexmap::IndexSet;
use scanlink_api::{Directive, ScanId};

/// Ordered set of subscribed scan ids (insertion order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    scans: IndexSet<ScanId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record interest in `scan_id` and return the directive announcing it.
    pub fn subscribe(&mut self, scan_id: ScanId) -> Directive {
        self.scans.insert(scan_id.clone());
        Directive::SubscribeScan { scan_id }
    }

    /// Drop interest in `scan_id` and return the directive announcing it.
    ///
    /// The directive is produced even for ids that were never subscribed;
    /// the server treats it as idempotent.
    pub fn unsubscribe(&mut self, scan_id: ScanId) -> Directive {
        self.scans.shift_remove(&scan_id);
        Directive::UnsubscribeScan { scan_id }
    }

    pub fn contains(&self, scan_id: &ScanId) -> bool {
        self.scans.contains(scan_id)
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ScanId> {
        self.scans.iter().cloned().collect()
    }
}
