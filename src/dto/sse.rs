use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::duel::DuelView;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
    /// Duel the event belongs to; `None` reaches every subscriber.
    pub duel_id: Option<Uuid>,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, duel_id: Option<Uuid>, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
            duel_id,
        })
    }

    /// Whether a subscriber following `duel_id` should receive this event.
    pub fn is_visible_to(&self, duel_id: Uuid) -> bool {
        self.duel_id.is_none_or(|scope| scope == duel_id)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Duel followed by this stream.
    pub duel_id: Uuid,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once, right after the terminal write of a duel.
pub struct DuelFinishedEvent {
    pub duel: DuelView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_events_only_reach_their_duel() {
        let duel_id = Uuid::new_v4();
        let scoped =
            ServerEvent::json(Some("duel.finished".to_string()), Some(duel_id), &1).unwrap();
        assert!(scoped.is_visible_to(duel_id));
        assert!(!scoped.is_visible_to(Uuid::new_v4()));

        let global = ServerEvent::json(
            Some("system.status".to_string()),
            None,
            &SystemStatus { degraded: true },
        )
        .unwrap();
        assert!(global.is_visible_to(duel_id));
        assert_eq!(global.data, r#"{"degraded":true}"#);
    }
}
