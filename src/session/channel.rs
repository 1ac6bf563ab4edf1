//! Room channel adapters used by the session driver.

use futures::{SinkExt, StreamExt, future::BoxFuture};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::room::{PresenceUpdate, RoomClientMessage, RoomEvent, RoomServerMessage},
    session::error::SessionError,
    state::{RoomHub, RoomMembership},
};

/// Presence and broadcast primitives of one room connection.
pub trait RoomChannel: Send {
    /// Replace this peer's presence entry.
    fn track(&mut self, state: PresenceUpdate) -> Result<(), SessionError>;
    /// Fan an event out to the other peers. Delivery is not guaranteed.
    fn broadcast(&mut self, event: RoomEvent) -> Result<(), SessionError>;
    /// Next frame from the room; `None` once the channel is gone. Must be cancel safe.
    fn recv(&mut self) -> BoxFuture<'_, Option<RoomServerMessage>>;
}

/// In-process channel on top of the server room hub.
pub struct LocalRoomChannel {
    membership: RoomMembership,
}

impl LocalRoomChannel {
    pub fn join(hub: &RoomHub, duel_id: Uuid, user_id: Uuid) -> Self {
        Self {
            membership: hub.join(duel_id, user_id),
        }
    }
}

impl RoomChannel for LocalRoomChannel {
    fn track(&mut self, state: PresenceUpdate) -> Result<(), SessionError> {
        self.membership.track(state);
        Ok(())
    }

    fn broadcast(&mut self, event: RoomEvent) -> Result<(), SessionError> {
        self.membership.send(event);
        Ok(())
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<RoomServerMessage>> {
        Box::pin(async move { self.membership.recv().await.map(RoomServerMessage::from) })
    }
}

/// WebSocket client speaking the room wire protocol.
pub struct WsRoomChannel {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<RoomServerMessage>,
    reader: JoinHandle<()>,
}

impl WsRoomChannel {
    /// Connect to `url` (e.g. `ws://host/duels/{id}/room`) and join as `user_id`.
    pub async fn connect(url: &str, user_id: Uuid) -> Result<Self, SessionError> {
        let (stream, _response) = connect_async(url).await?;
        let (mut sink, mut source) = stream.split();

        let join = serde_json::to_string(&RoomClientMessage::Join { user_id })?;
        sink.send(Message::Text(join)).await?;

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(err) = sink.send(message).await {
                    warn!(error = %err, "room socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let pong = outbound.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RoomServerMessage>(&text)
                    {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to parse room frame"),
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = pong.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "room socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "room socket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            inbound,
            reader,
        })
    }

    fn push(&self, message: &RoomClientMessage) -> Result<(), SessionError> {
        let payload = serde_json::to_string(message)?;
        self.outbound
            .send(Message::Text(payload))
            .map_err(|_| SessionError::RoomClosed)
    }
}

impl RoomChannel for WsRoomChannel {
    fn track(&mut self, state: PresenceUpdate) -> Result<(), SessionError> {
        self.push(&RoomClientMessage::Presence { state })
    }

    fn broadcast(&mut self, event: RoomEvent) -> Result<(), SessionError> {
        self.push(&RoomClientMessage::Broadcast { event })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<RoomServerMessage>> {
        Box::pin(self.inbound.recv())
    }
}

impl Drop for WsRoomChannel {
    fn drop(&mut self) {
        self.reader.abort();
        let _ = self.outbound.send(Message::Close(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_channel_relays_between_peers() {
        let hub = RoomHub::new();
        let duel_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let mut first = LocalRoomChannel::join(&hub, duel_id, alice);
        let mut second = LocalRoomChannel::join(&hub, duel_id, bob);

        second.broadcast(RoomEvent::GameStart).unwrap();

        loop {
            match first.recv().await {
                Some(RoomServerMessage::Broadcast { from, event }) => {
                    assert_eq!(from, bob);
                    assert_eq!(event, RoomEvent::GameStart);
                    break;
                }
                Some(RoomServerMessage::PresenceSync { .. }) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }
}
