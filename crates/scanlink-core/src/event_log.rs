// ── Event log ──
//
// Append-only, arrival-ordered record of every application event the
// channel delivered. Backed by a `watch` channel so readers can take
// snapshots from any thread and await growth. No size bound is enforced.

use std::sync::Arc;

use scanlink_api::ChannelEvent;
use tokio::sync::watch;

/// Shared event log. Cloning yields another handle to the same log.
#[derive(Clone)]
pub struct EventLog {
    entries: Arc<watch::Sender<Vec<Arc<ChannelEvent>>>>,
}

impl EventLog {
    pub fn new() -> Self {
        let (entries, _) = watch::channel(Vec::new());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Append one event at the tail and return the stored copy.
    pub fn append(&self, event: ChannelEvent) -> Arc<ChannelEvent> {
        let event = Arc::new(event);
        let stored = Arc::clone(&event);
        self.entries.send_modify(|entries| entries.push(stored));
        event
    }

    /// Remove every entry. Connection state is untouched.
    pub fn clear(&self) {
        self.entries.send_if_modified(|entries| {
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        });
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// All entries in arrival order.
    pub fn snapshot(&self) -> Vec<Arc<ChannelEvent>> {
        self.entries.borrow().clone()
    }

    /// Entries of type `kind`, oldest first.
    pub fn by_type(&self, kind: &str) -> Vec<Arc<ChannelEvent>> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.is_type(kind))
            .cloned()
            .collect()
    }

    /// Most recent entry of type `kind`.
    pub fn latest_by_type(&self, kind: &str) -> Option<Arc<ChannelEvent>> {
        self.entries
            .borrow()
            .iter()
            .rev()
            .find(|e| e.is_type(kind))
            .cloned()
    }

    /// Receiver notified on every append or clear.
    pub fn watch(&self) -> watch::Receiver<Vec<Arc<ChannelEvent>>> {
        self.entries.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
