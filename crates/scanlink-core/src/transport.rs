// ── Transport seam ──
//
// The connection manager talks to the network through `Transport`. Every
// opened handle gets a fresh `ChannelId`; lifecycle reports come back as
// `ChannelSignal`s on a queue the driver owns.

use std::collections::HashMap;
use std::time::Duration;

use scanlink_api::{ChannelHandle, ChannelId, ChannelSignal, CloseReason};
use tokio::sync::mpsc;
use url::Url;

/// Factory and I/O for channel handles.
pub trait Transport {
    /// Begin opening a channel to `url`. The outcome arrives later as a
    /// signal tagged with the returned id.
    fn open(&mut self, url: &Url) -> ChannelId;

    /// Write one text frame on channel `id`.
    fn send(&mut self, id: ChannelId, text: String) -> Result<(), scanlink_api::Error>;

    /// Release channel `id`. Its eventual `Closed` signal still arrives.
    fn close(&mut self, id: ChannelId, reason: CloseReason);
}

// ── WsTransport ──────────────────────────────────────────────────────

/// WebSocket transport backed by one [`ChannelHandle`] task per channel.
pub struct WsTransport {
    signals: mpsc::UnboundedSender<ChannelSignal>,
    channels: HashMap<ChannelId, ChannelHandle>,
    /// Released handles still finishing their closing handshake.
    closing: Vec<ChannelHandle>,
    next_id: u64,
}

impl WsTransport {
    pub fn new(signals: mpsc::UnboundedSender<ChannelSignal>) -> Self {
        Self {
            signals,
            channels: HashMap::new(),
            closing: Vec::new(),
            next_id: 0,
        }
    }

    /// Release every handle and wait up to `grace` for their tasks to
    /// exit, so queued frames and close handshakes reach the server.
    pub async fn drain(&mut self, grace: Duration) {
        let handles: Vec<ChannelHandle> = self
            .channels
            .drain()
            .map(|(_, handle)| handle)
            .chain(self.closing.drain(..))
            .collect();
        if handles.is_empty() {
            return;
        }

        let finished = tokio::time::timeout(grace, async {
            for handle in handles {
                handle.finish().await;
            }
        })
        .await;
        if finished.is_err() {
            tracing::debug!(?grace, "Channel close did not complete in time");
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &Url) -> ChannelId {
        self.channels.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = ChannelId::new(self.next_id);
        let handle = ChannelHandle::open(id, url.clone(), self.signals.clone());
        self.channels.insert(id, handle);

        tracing::debug!(channel = %id, url = %url, "Opened channel handle");
        id
    }

    fn send(&mut self, id: ChannelId, text: String) -> Result<(), scanlink_api::Error> {
        self.channels
            .get(&id)
            .ok_or(scanlink_api::Error::ChannelGone(id))?
            .send_text(text)
    }

    fn close(&mut self, id: ChannelId, reason: CloseReason) {
        let Some(handle) = self.channels.remove(&id) else {
            return;
        };
        if let Err(e) = handle.close(reason) {
            tracing::debug!(channel = %id, error = %e, "Channel already gone");
        }
        self.closing.retain(|h| !h.is_finished());
        self.closing.push(handle);
    }
}
