use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::duel_service,
    state::{DuelFeed, SharedState},
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Follow the outcome stream of a duel the caller takes part in.
pub async fn follow_duel(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
) -> Result<DuelFeed, ServiceError> {
    let storage = state.require_storage().await?;
    duel_service::load_for_participant(&storage, duel_id, caller_id).await?;
    Ok(state.sse().follow(duel_id))
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Convert a duel feed into an SSE response, opening with a handshake event.
pub fn to_sse_stream(
    mut feed: DuelFeed,
    degraded: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let duel_id = feed.duel_id();
        match ServerEvent::json(
            Some(EVENT_HANDSHAKE.to_string()),
            Some(duel_id),
            &Handshake { duel_id, degraded },
        ) {
            Ok(handshake) => {
                if tx.send(Ok(to_event(handshake))).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(duel_id = %duel_id, error = %err, "failed to serialize handshake"),
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = feed.next() => {
                    let Some(payload) = next else { break };
                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!(duel_id = %duel_id, "duel SSE stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
