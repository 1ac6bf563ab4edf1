//! Ephemeral per-duel rooms: presence entries keyed by connection and a lossy fan-out channel.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::room::{Presence, PresenceUpdate, RoomEvent, RoomServerMessage};

const ROOM_CAPACITY: usize = 64;

/// Signal delivered to every member of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignal {
    /// Presence list after a change.
    PresenceSync(Vec<Presence>),
    /// Event published by the connection `origin` on behalf of `from`.
    Broadcast {
        origin: Uuid,
        from: Uuid,
        event: RoomEvent,
    },
}

impl From<RoomSignal> for RoomServerMessage {
    fn from(signal: RoomSignal) -> Self {
        match signal {
            RoomSignal::PresenceSync(peers) => RoomServerMessage::PresenceSync { peers },
            RoomSignal::Broadcast { from, event, .. } => RoomServerMessage::Broadcast { from, event },
        }
    }
}

struct Room {
    presence: Mutex<IndexMap<Uuid, Presence>>,
    signals: broadcast::Sender<RoomSignal>,
}

impl Room {
    fn new() -> Self {
        let (signals, _receiver) = broadcast::channel(ROOM_CAPACITY);
        Self {
            presence: Mutex::new(IndexMap::new()),
            signals,
        }
    }

    fn sync(&self, presence: &IndexMap<Uuid, Presence>) {
        let peers = presence.values().copied().collect();
        let _ = self.signals.send(RoomSignal::PresenceSync(peers));
    }
}

/// Registry of live rooms, created on first join and dropped when the last member leaves.
#[derive(Clone, Default)]
pub struct RoomHub {
    rooms: Arc<DashMap<Uuid, Arc<Room>>>,
}

impl RoomHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the room of `duel_id` as `user_id`, publishing a default presence entry.
    pub fn join(&self, duel_id: Uuid, user_id: Uuid) -> RoomMembership {
        // The entry guard is held until the presence entry exists, so a concurrent
        // last-member drop cannot evict the room in between.
        let entry = self
            .rooms
            .entry(duel_id)
            .or_insert_with(|| Arc::new(Room::new()));
        let room = entry.value().clone();

        let receiver = room.signals.subscribe();
        let connection_id = Uuid::new_v4();
        {
            let mut presence = room.presence.lock();
            presence.insert(
                connection_id,
                Presence {
                    user_id,
                    state: PresenceUpdate::default(),
                },
            );
            room.sync(&presence);
        }
        drop(entry);
        debug!(duel_id = %duel_id, user_id = %user_id, connection_id = %connection_id, "joined room");

        RoomMembership {
            duel_id,
            user_id,
            connection_id,
            room,
            receiver,
            rooms: self.rooms.clone(),
        }
    }

    /// Number of rooms with at least one member.
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

/// One connection inside a room. Dropping it clears its presence entry.
pub struct RoomMembership {
    duel_id: Uuid,
    user_id: Uuid,
    connection_id: Uuid,
    room: Arc<Room>,
    receiver: broadcast::Receiver<RoomSignal>,
    rooms: Arc<DashMap<Uuid, Arc<Room>>>,
}

impl RoomMembership {
    /// Identifier of this connection.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// User this connection speaks for.
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Replace this connection's presence state and fan out the new list.
    pub fn track(&self, state: PresenceUpdate) {
        let mut presence = self.room.presence.lock();
        if let Some(entry) = presence.get_mut(&self.connection_id) {
            entry.state = state;
        }
        self.room.sync(&presence);
    }

    /// Publish an event to the other members. Delivery is best-effort.
    pub fn send(&self, event: RoomEvent) {
        let _ = self.room.signals.send(RoomSignal::Broadcast {
            origin: self.connection_id,
            from: self.user_id,
            event,
        });
    }

    /// Next signal addressed to this member; own broadcasts are skipped.
    ///
    /// Returns `None` once the room is gone. Cancel safe.
    pub async fn recv(&mut self) -> Option<RoomSignal> {
        loop {
            match self.receiver.recv().await {
                Ok(RoomSignal::Broadcast { origin, .. }) if origin == self.connection_id => {
                    continue;
                }
                Ok(signal) => return Some(signal),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(duel_id = %self.duel_id, skipped, "room member lagged; signals dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        let empty = {
            let mut presence = self.room.presence.lock();
            presence.shift_remove(&self.connection_id);
            self.room.sync(&presence);
            presence.is_empty()
        };

        if empty {
            self.rooms
                .remove_if(&self.duel_id, |_, room| room.presence.lock().is_empty());
        }
        debug!(duel_id = %self.duel_id, connection_id = %self.connection_id, "left room");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn presence_is_synced_and_cleared_on_drop() {
        let hub = RoomHub::new();
        let duel_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let mut first = hub.join(duel_id, alice);
        let second = hub.join(duel_id, bob);

        // own join, then bob's join
        assert!(matches!(first.recv().await, Some(RoomSignal::PresenceSync(peers)) if peers.len() == 1));
        assert!(matches!(first.recv().await, Some(RoomSignal::PresenceSync(peers)) if peers.len() == 2));

        second.track(PresenceUpdate {
            ready: true,
            question_index: None,
            has_answered: false,
        });
        match first.recv().await {
            Some(RoomSignal::PresenceSync(peers)) => {
                let bob_entry = peers.iter().find(|p| p.user_id == bob).unwrap();
                assert!(bob_entry.state.ready);
            }
            other => panic!("unexpected signal {other:?}"),
        }

        drop(second);
        match first.recv().await {
            Some(RoomSignal::PresenceSync(peers)) => {
                assert_eq!(peers.len(), 1);
                assert_eq!(peers[0].user_id, alice);
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcasts_skip_the_sender() {
        let hub = RoomHub::new();
        let duel_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let mut first = hub.join(duel_id, alice);
        let mut second = hub.join(duel_id, bob);
        first.send(RoomEvent::GameStart);
        second.send(RoomEvent::TimeUp { index: 0 });

        let mut seen_by_first = Vec::new();
        while let Ok(Some(signal)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), first.recv()).await
        {
            if let RoomSignal::Broadcast { from, event, .. } = signal {
                seen_by_first.push((from, event));
            }
        }
        assert_eq!(seen_by_first, vec![(bob, RoomEvent::TimeUp { index: 0 })]);

        let mut seen_by_second = Vec::new();
        while let Ok(Some(signal)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), second.recv()).await
        {
            if let RoomSignal::Broadcast { from, event, .. } = signal {
                seen_by_second.push((from, event));
            }
        }
        assert_eq!(seen_by_second, vec![(alice, RoomEvent::GameStart)]);
    }

    #[test]
    fn room_disappears_with_last_member() {
        let hub = RoomHub::new();
        let duel_id = Uuid::new_v4();
        let member = hub.join(duel_id, Uuid::new_v4());
        assert_eq!(hub.active_rooms(), 1);
        drop(member);
        assert_eq!(hub.active_rooms(), 0);
    }
}
