use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-room broadcast of committed reservation events, so calendar views
/// can refresh without polling. In-process change feed; lagging subscribers
/// drop events (broadcast semantics), the ledger stays authoritative.
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

    /// Subscribe to a room's events. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        let mut rx = hub.subscribe(room_id);

        let event = Event::ReservationCanceled {
            id: Ulid::new(),
            room_id,
            at: 1_704_067_200_000,
        };
        hub.send(room_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        // No subscriber, must not panic
        hub.send(
            room_id,
            &Event::ReservationPurged {
                id: Ulid::new(),
                room_id,
            },
        );
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = NotifyHub::new();
        let room_a = Ulid::new();
        let room_b = Ulid::new();
        let mut rx_a = hub.subscribe(room_a);

        hub.send(
            room_b,
            &Event::ReservationPurged {
                id: Ulid::new(),
                room_id: room_b,
            },
        );
        assert!(rx_a.try_recv().is_err());
    }
}
