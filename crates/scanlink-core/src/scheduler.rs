// ── Timer scheduling ──
//
// The connection manager never sleeps. It asks a `Scheduler` for a timer
// and is told, later, that the timer fired. Tests drive a manual scheduler;
// the runtime uses `TokioScheduler`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identity of one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Automatic attempt after an unexpected closure.
    Reconnect,
    /// Second half of a consumer-triggered `reconnect()`.
    ManualReconnect,
}

/// A timer that elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub timer: Timer,
}

/// Timer capability injected into the connection manager.
pub trait Scheduler {
    /// Arrange for `timer` to fire after `delay`.
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId;

    /// Cancel a pending timer. Unknown or already-fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

// ── TokioScheduler ───────────────────────────────────────────────────

/// One sleeping task per timer; firings are delivered on an mpsc queue.
pub struct TokioScheduler {
    fired: mpsc::UnboundedSender<TimerFired>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    next_id: u64,
}

impl TokioScheduler {
    pub fn new(fired: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            fired,
            timers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let fired = self.fired.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the client was torn down.
            let _ = fired.send(TimerFired { id, timer });
        });
        self.timers.insert(id, handle);

        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let id = scheduler.schedule(Duration::from_millis(100), Timer::Reconnect);
        assert_eq!(scheduler.pending(), 1);

        let fired = rx.recv().await.unwrap();
        assert_eq!(
            fired,
            TimerFired {
                id,
                timer: Timer::Reconnect
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let cancelled = scheduler.schedule(Duration::from_millis(100), Timer::Reconnect);
        let kept = scheduler.schedule(Duration::from_millis(200), Timer::ManualReconnect);
        scheduler.cancel(cancelled);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, kept);
        assert_eq!(scheduler.pending(), 0);
    }
}
