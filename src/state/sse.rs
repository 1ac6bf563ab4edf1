use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// Broadcast hub feeding every duel outcome stream.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Follow the events of one duel, plus unscoped system events.
    pub fn follow(&self, duel_id: Uuid) -> DuelFeed {
        DuelFeed {
            duel_id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Send an event to all current subscribers; returns how many were listening.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

/// Filtered view of the hub for a single duel.
pub struct DuelFeed {
    duel_id: Uuid,
    receiver: broadcast::Receiver<ServerEvent>,
}

impl DuelFeed {
    /// Duel followed by this feed.
    pub fn duel_id(&self) -> Uuid {
        self.duel_id
    }

    /// Next visible event; lagged events are skipped. Cancel safe.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_visible_to(self.duel_id) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(duel_id = %self.duel_id, skipped, "SSE feed lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_filters_other_duels() {
        let hub = SseHub::new(8);
        let duel_id = Uuid::new_v4();
        let mut feed = hub.follow(duel_id);

        let other = ServerEvent::json(Some("duel.finished".to_string()), Some(Uuid::new_v4()), &0)
            .unwrap();
        let mine = ServerEvent::json(Some("duel.finished".to_string()), Some(duel_id), &1).unwrap();
        assert_eq!(hub.publish(other), 1);
        hub.publish(mine);

        let received = feed.next().await.unwrap();
        assert_eq!(received.duel_id, Some(duel_id));
        assert_eq!(received.data, "1");
    }

    #[test]
    fn publishing_without_listeners_is_harmless() {
        let hub = SseHub::new(4);
        let event = ServerEvent::json(None, None, &"ping").unwrap();
        assert_eq!(hub.publish(event), 0);
    }
}
