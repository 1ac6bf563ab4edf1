use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::room::{RoomClientMessage, RoomServerMessage},
    error::ServiceError,
    services::duel_service,
    state::{RoomMembership, SharedState},
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of one room connection for `duel_id`.
pub async fn handle_socket(state: SharedState, duel_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let first_frame = match tokio::time::timeout(JOIN_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            reject(&outbound_tx, close_code::PROTOCOL, "expected a join frame");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(duel_id = %duel_id, error = %err, "room receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(duel_id = %duel_id, "room join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let user_id = match RoomClientMessage::from_json_str(&first_frame) {
        Ok(RoomClientMessage::Join { user_id }) => user_id,
        Ok(_) => {
            warn!(duel_id = %duel_id, "first room frame was not a join");
            reject(&outbound_tx, close_code::PROTOCOL, "expected a join frame");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(duel_id = %duel_id, error = %err, "failed to parse room frame");
            reject(&outbound_tx, close_code::PROTOCOL, "malformed frame");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    if let Err(err) = authorize(&state, duel_id, user_id).await {
        warn!(duel_id = %duel_id, user_id = %user_id, error = %err, "room join refused");
        reject(&outbound_tx, close_code::POLICY, err.code().as_str());
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let mut membership = state.rooms().join(duel_id, user_id);
    info!(duel_id = %duel_id, user_id = %user_id, connection_id = %membership.connection_id(), "room member connected");

    let joined = RoomServerMessage::Joined {
        connection_id: membership.connection_id(),
    };
    if push(&outbound_tx, &joined).is_err() {
        drop(membership);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    pump(&mut membership, &mut receiver, &outbound_tx).await;

    info!(duel_id = %duel_id, user_id = %user_id, "room member disconnected");
    drop(membership);
    finalize(writer_task, outbound_tx).await;
}

async fn authorize(state: &SharedState, duel_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
    let storage = state.require_storage().await?;
    duel_service::load_for_participant(&storage, duel_id, user_id).await?;
    Ok(())
}

/// Shuttle frames between the socket and the room until either side goes away.
async fn pump(
    membership: &mut RoomMembership,
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(inbound) = inbound else { break };
                match inbound {
                    Ok(Message::Text(text)) => match RoomClientMessage::from_json_str(&text) {
                        Ok(RoomClientMessage::Presence { state }) => membership.track(state),
                        Ok(RoomClientMessage::Broadcast { event }) => membership.send(event),
                        Ok(RoomClientMessage::Join { .. }) => {
                            debug!(user_id = %membership.user_id(), "ignoring duplicate join");
                        }
                        Err(err) => {
                            warn!(user_id = %membership.user_id(), error = %err, "failed to parse room frame");
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Ok(Message::Binary(_) | Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(user_id = %membership.user_id(), error = %err, "room socket error");
                        break;
                    }
                }
            }
            signal = membership.recv() => {
                let Some(signal) = signal else { break };
                if push(outbound_tx, &RoomServerMessage::from(signal)).is_err() {
                    break;
                }
            }
        }
    }
}

/// Serialize a frame onto the writer channel. Fails only once the writer is gone.
fn push(tx: &mpsc::UnboundedSender<Message>, message: &RoomServerMessage) -> Result<(), ()> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize room frame");
            return Ok(());
        }
    };
    tx.send(Message::Text(payload.into())).map_err(|_| ())
}

fn reject(tx: &mpsc::UnboundedSender<Message>, code: u16, reason: &'static str) {
    let _ = tx.send(Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    })));
}

/// Ensure the writer task winds down before the socket handler returns.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
