use serde::Serialize;
use utoipa::ToSchema;

/// Body of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: &'static str,
    /// Authority calls answer 503 while set.
    pub degraded: bool,
    /// Duel rooms with at least one connected peer.
    pub active_rooms: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, active_rooms: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            degraded,
            active_rooms,
        }
    }
}
