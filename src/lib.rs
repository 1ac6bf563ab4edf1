//! Library crate for duel-arena-back: the duel authority service, its HTTP/WebSocket/SSE
//! surface, and the participant-side session driver.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
