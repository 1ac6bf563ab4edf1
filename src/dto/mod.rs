//! Request and response payloads of the HTTP, WebSocket and SSE surfaces.

pub mod duel;
pub mod health;
pub mod leaderboard;
pub mod room;
pub mod sse;
pub mod validation;
