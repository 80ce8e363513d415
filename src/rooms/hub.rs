use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::events::ServerEvent;

/// How many events a subscriber may queue before the hub drops for it.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Explicit per-room fan-out registry.
///
/// Joining a room subscribes the connection's outbound queue; broadcast
/// walks the room's live subscribers. Closed senders are pruned on
/// subscribe, broadcast, and disconnect, so a room entry only outlives its
/// last subscriber until the next touch.
#[derive(Debug, Clone, Default)]
pub struct RoomHub {
    inner: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<ServerEvent>>>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection's outbound queue, bounded so one slow consumer cannot
    /// hold memory for the whole room.
    pub fn channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY)
    }

    pub async fn subscribe(&self, room_id: &str, tx: mpsc::Sender<ServerEvent>) {
        let mut rooms = self.inner.lock().await;
        let subs = rooms.entry(room_id.to_owned()).or_default();
        subs.retain(|sub| !sub.is_closed());
        subs.push(tx);
        debug!(room = room_id, subs = subs.len(), "room hub: subscribed");
    }

    /// Fan an event out to every live subscriber of `room_id`. A subscriber
    /// with a full queue misses the event rather than stalling the room.
    pub async fn broadcast(&self, room_id: &str, event: ServerEvent) {
        let mut rooms = self.inner.lock().await;
        let Some(subs) = rooms.get_mut(room_id) else {
            return;
        };

        subs.retain(|sub| !sub.is_closed());
        for sub in subs.iter() {
            let _ = sub.try_send(event.clone());
        }

        if subs.is_empty() {
            rooms.remove(room_id);
        }
    }

    /// Bookkeeping after a connection goes away.
    pub async fn prune(&self, room_id: &str) {
        let mut rooms = self.inner.lock().await;
        if let Some(subs) = rooms.get_mut(room_id) {
            subs.retain(|sub| !sub.is_closed());
            if subs.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    pub async fn subscriber_count(&self, room_id: &str) -> usize {
        let rooms = self.inner.lock().await;
        rooms
            .get(room_id)
            .map(|subs| subs.iter().filter(|sub| !sub.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn locked_notice() -> ServerEvent {
        ServerEvent::ChatLocked {
            message: "the chat has been locked".to_owned(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_room_subscribers_only() {
        let hub = RoomHub::new();
        let (tx_a, mut rx_a) = RoomHub::channel();
        let (tx_b, mut rx_b) = RoomHub::channel();
        hub.subscribe("room-a", tx_a).await;
        hub.subscribe("room-b", tx_b).await;

        hub.broadcast("room-a", locked_notice()).await;

        let got = timeout(Duration::from_millis(250), rx_a.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert!(matches!(got, ServerEvent::ChatLocked { .. }));

        let unexpected = timeout(Duration::from_millis(50), rx_b.recv()).await;
        assert!(
            unexpected.is_err(),
            "subscriber of room-b received room-a's event"
        );
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let hub = RoomHub::new();
        let (tx, rx) = RoomHub::channel();
        hub.subscribe("room-a", tx).await;
        assert_eq!(hub.subscriber_count("room-a").await, 1);

        drop(rx);
        hub.prune("room-a").await;
        assert_eq!(hub.subscriber_count("room-a").await, 0);

        // Broadcasting to an emptied room is a no-op, not an error.
        hub.broadcast("room-a", locked_notice()).await;
    }

    #[tokio::test]
    async fn every_subscriber_of_a_room_receives() {
        let hub = RoomHub::new();
        let (tx_1, mut rx_1) = RoomHub::channel();
        let (tx_2, mut rx_2) = RoomHub::channel();
        hub.subscribe("room-a", tx_1).await;
        hub.subscribe("room-a", tx_2).await;

        hub.broadcast("room-a", locked_notice()).await;

        for rx in [&mut rx_1, &mut rx_2] {
            timeout(Duration::from_millis(250), rx.recv())
                .await
                .expect("event within timeout")
                .expect("channel open");
        }
    }
}
