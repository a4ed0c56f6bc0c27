use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// In-process change feed, one broadcast channel per instructor calendar.
/// A transport layer subscribes to refresh calendar views after any
/// capacity, policy, or booking transition lands.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for one instructor. Creates the channel if needed.
    pub fn subscribe(&self, instructor_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(instructor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an applied event. No-op if nobody is listening.
    pub fn send(&self, instructor_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&instructor_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop the channel for a calendar.
    pub fn remove(&self, instructor_id: &Ulid) {
        self.channels.remove(instructor_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let instructor_id = Ulid::new();
        let mut rx = hub.subscribe(instructor_id);

        let event = Event::CalendarCreated { instructor_id };
        hub.send(instructor_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let instructor_id = Ulid::new();
        // No subscriber — should not panic
        hub.send(instructor_id, &Event::CalendarCreated { instructor_id });
    }

    #[tokio::test]
    async fn channels_are_isolated_per_instructor() {
        let hub = NotifyHub::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut rx_a = hub.subscribe(a);
        let _rx_b = hub.subscribe(b);

        hub.send(b, &Event::CalendarCreated { instructor_id: b });
        assert!(rx_a.try_recv().is_err());
    }
}
