/// OpenAPI documentation generation.
pub mod documentation;
/// Server-side duel authority: start, answers, finish, forfeit.
pub mod duel_service;
/// Health check service.
pub mod health_service;
/// Best-effort outcome notifications.
pub mod notifier;
/// Room WebSocket connection handling.
pub mod room_service;
/// Score recomputation from answer rows.
pub mod scoring;
/// Settlement of XP, counters, weekly aggregates and activity.
pub mod settler;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor with back-off.
pub mod storage_supervisor;
