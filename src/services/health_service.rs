use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the installed store and report together with the number of live rooms.
///
/// A failed probe marks the app degraded right away; the storage supervisor clears the flag
/// once the backend answers again.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_storage().await {
        Ok(storage) => {
            if let Err(err) = storage.duels.health_check().await {
                warn!(error = %err, "storage health check failed");
                state.update_degraded(true);
            }
        }
        Err(err) => warn!(error = %err, "no storage installed"),
    }

    HealthResponse::new(state.is_degraded(), state.rooms().active_rooms())
}
