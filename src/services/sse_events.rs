use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        duel::DuelView,
        sse::{DuelFinishedEvent, ServerEvent},
    },
    state::SharedState,
};

const EVENT_DUEL_FINISHED: &str = "duel.finished";

/// Announce the terminal result of a duel to everybody following it.
pub fn broadcast_duel_finished(state: &SharedState, duel: &DuelView) {
    let payload = DuelFinishedEvent { duel: duel.clone() };
    send_duel_event(state, duel.id, EVENT_DUEL_FINISHED, &payload);
}

fn send_duel_event<T>(state: &SharedState, duel_id: Uuid, event: &str, payload: &T)
where
    T: Serialize,
{
    match ServerEvent::json(Some(event.to_string()), Some(duel_id), payload) {
        Ok(message) => {
            let listeners = state.sse().publish(message);
            debug!(duel_id = %duel_id, event, listeners, "SSE event published");
        }
        Err(err) => warn!(duel_id = %duel_id, event, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::models::DuelEntity, services::notifier::LogNotifier,
        state::AppState,
    };

    #[tokio::test]
    async fn finished_event_reaches_followers_of_that_duel() {
        let state = AppState::new(AppConfig::default(), Arc::new(LogNotifier));
        let duel = DuelEntity::accepted(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 50);
        let mut feed = state.sse().follow(duel.id);

        broadcast_duel_finished(&state, &DuelView::from(&duel));

        let event = feed.next().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_DUEL_FINISHED));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["duel"]["id"], duel.id.to_string());
    }
}
