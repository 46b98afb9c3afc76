//! Event fan-out to subscriber channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::types::{Event, STATE_CHANGED_LABEL};

/// A registered subscriber
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Event>,
}

/// Set of subscriber channels that receive a notification on every state change
///
/// Cloning is cheap and every clone shares the same subscriber list.
#[derive(Clone)]
pub struct EventFanout {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_subscriber_id: Arc<AtomicU64>,
    next_event_id: Arc<AtomicU64>,
    send_timeout: Duration,
}

impl EventFanout {
    /// Create an empty fan-out; a subscriber blocking longer than `send_timeout` is dropped.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            next_event_id: Arc::new(AtomicU64::new(1)),
            send_timeout,
        }
    }

    /// Add a subscriber; returns its id.
    pub async fn register(&self, sender: mpsc::Sender<Event>) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().await;
        subscribers.push(Subscriber { id, sender });
        tracing::debug!(subscriber = id, total = subscribers.len(), "subscriber registered");
        id
    }

    /// Number of registered subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Whether no subscriber is registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Notify every subscriber that the state map changed.
    ///
    /// Delivery runs on its own task, so callers never wait on slow subscribers.
    pub fn publish(&self) {
        let event = self.next_event();
        let fanout = self.clone();
        tokio::spawn(async move {
            fanout.deliver(event).await;
        });
    }

    /// Send `event` to every subscriber, dropping those that are closed or too slow.
    pub(crate) async fn deliver(&self, event: Event) {
        // Snapshot so a slow subscriber never holds the lock
        let targets: Vec<(u64, mpsc::Sender<Event>)> = {
            let subscribers = self.subscribers.lock().await;
            subscribers
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };

        let mut dropped = Vec::new();
        for (id, sender) in targets {
            match sender.send_timeout(event.clone(), self.send_timeout).await {
                Ok(()) => {}
                Err(SendTimeoutError::Closed(_)) => {
                    tracing::debug!(subscriber = id, "subscriber channel closed");
                    dropped.push(id);
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    tracing::warn!(
                        subscriber = id,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "subscriber did not accept notification in time, dropping it"
                    );
                    dropped.push(id);
                }
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            subscribers.retain(|s| !dropped.contains(&s.id));
        }
    }

    /// Drop every subscriber, closing their channels.
    pub(crate) async fn close(&self) {
        let mut subscribers = self.subscribers.lock().await;
        tracing::debug!(total = subscribers.len(), "closing all subscribers");
        subscribers.clear();
    }

    pub(crate) fn next_event(&self) -> Event {
        Event::StateChanged {
            id: self.next_event_id.fetch_add(1, Ordering::Relaxed),
            label: STATE_CHANGED_LABEL.to_string(),
        }
    }
}

impl std::fmt::Debug for EventFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFanout")
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn event_id(event: &Event) -> u64 {
        match event {
            Event::StateChanged { id, .. } => *id,
        }
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let fanout = EventFanout::new(Duration::from_secs(1));
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        fanout.register(tx1).await;
        fanout.register(tx2).await;

        let event = fanout.next_event();
        fanout.deliver(event.clone()).await;

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
        match event {
            Event::StateChanged { label, .. } => assert_eq!(label, "downloads-changed"),
        }
    }

    #[tokio::test]
    async fn event_ids_increase() {
        let fanout = EventFanout::new(Duration::from_secs(1));
        let first = event_id(&fanout.next_event());
        let second = event_id(&fanout.next_event());
        assert!(second > first);
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed_without_affecting_others() {
        let fanout = EventFanout::new(Duration::from_secs(1));
        let (closed_tx, closed_rx) = mpsc::channel(4);
        let (open_tx, mut open_rx) = mpsc::channel(4);
        fanout.register(closed_tx).await;
        fanout.register(open_tx).await;
        drop(closed_rx);

        fanout.deliver(fanout.next_event()).await;

        assert!(open_rx.recv().await.is_some());
        assert_eq!(fanout.len().await, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_times_out_and_is_removed() {
        let fanout = EventFanout::new(Duration::from_millis(20));
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(fanout.next_event()).unwrap();
        let (open_tx, mut open_rx) = mpsc::channel(4);
        fanout.register(full_tx).await;
        fanout.register(open_tx).await;

        fanout.deliver(fanout.next_event()).await;

        assert!(open_rx.recv().await.is_some());
        assert_eq!(fanout.len().await, 1);
    }

    #[tokio::test]
    async fn publish_delivers_in_background() {
        let fanout = EventFanout::new(Duration::from_secs(1));
        let (tx, mut rx) = mpsc::channel(4);
        fanout.register(tx).await;

        fanout.publish();

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert!(received.is_some());
    }

    #[tokio::test]
    async fn close_drops_all_subscribers() {
        let fanout = EventFanout::new(Duration::from_secs(1));
        let (tx, mut rx) = mpsc::channel(4);
        fanout.register(tx).await;

        fanout.close().await;

        assert!(fanout.is_empty().await);
        assert!(rx.recv().await.is_none());
    }
}
