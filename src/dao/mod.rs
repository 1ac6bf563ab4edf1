/// Duel, quiz and user persistence.
pub mod duel_store;
/// Database model definitions.
pub mod models;
/// Storage error type shared by backends.
pub mod storage;
