// ── Notification sinks ──
//
// Bridges and the transfer tracker push notifications into a sink without
// waiting on the consumer. `NotificationQueue` is the bounded in-memory
// sink: when it is full, the overflow policy decides which message loses.

use std::collections::VecDeque;
use std::sync::Mutex;

use strum::{Display, EnumString};
use tokio::sync::Notify;
use tracing::trace;

use crate::notification::Notification;

/// Best-effort target for push notifications. `send` never blocks.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: Notification);
}

/// What a full queue does with a new notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued notification to make room.
    #[default]
    DropOldest,
    /// Discard the incoming notification.
    DropNewest,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Notification>,
    closed: bool,
    dropped: u64,
}

/// Bounded notification queue feeding one consumer (a browser socket).
#[derive(Debug)]
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
}

impl NotificationQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            policy,
            notify: Notify::new(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Poisoning only follows a panic elsewhere; the queue itself is still consistent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Next notification, waiting until one arrives. `None` once closed and drained.
    pub async fn recv(&self) -> Option<Notification> {
        loop {
            {
                let mut state = self.state();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Notification> {
        self.state().items.pop_front()
    }

    /// Take everything queued right now.
    pub fn drain(&self) -> Vec<Notification> {
        self.state().items.drain(..).collect()
    }

    /// Stop accepting notifications and wake the consumer.
    pub fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifications lost to the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.state().dropped
    }
}

impl NotificationSink for NotificationQueue {
    fn send(&self, notification: Notification) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            if state.items.len() >= self.capacity {
                state.dropped += 1;
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                    }
                    OverflowPolicy::DropNewest => {
                        trace!(capacity = self.capacity, "sink full, dropping newest");
                        return;
                    }
                }
            }
            state.items.push_back(notification);
        }
        self.notify.notify_one();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn progress(n: u8) -> Notification {
        Notification::Progress { progress: n }
    }

    #[test]
    fn drop_oldest_keeps_latest() {
        let queue = NotificationQueue::new(2, OverflowPolicy::DropOldest);
        queue.send(progress(1));
        queue.send(progress(2));
        queue.send(progress(3));

        assert_eq!(queue.drain(), vec![progress(2), progress(3)]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn drop_newest_keeps_earliest() {
        let queue = NotificationQueue::new(2, OverflowPolicy::DropNewest);
        queue.send(progress(1));
        queue.send(progress(2));
        queue.send(progress(3));

        assert_eq!(queue.drain(), vec![progress(1), progress(2)]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn policy_parses_from_config_text() {
        assert_eq!("drop-newest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropNewest);
        assert_eq!(OverflowPolicy::DropOldest.to_string(), "drop-oldest");
    }

    #[tokio::test]
    async fn recv_waits_for_send_and_ends_on_close() {
        let queue = Arc::new(NotificationQueue::new(4, OverflowPolicy::default()));

        let reader = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(n) = queue.recv().await {
                    seen.push(n);
                }
                seen
            })
        };

        queue.send(progress(10));
        tokio::task::yield_now().await;
        queue.send(progress(20));
        queue.close();
        queue.send(progress(30));

        assert_eq!(reader.await.unwrap(), vec![progress(10), progress(20)]);
    }
}
