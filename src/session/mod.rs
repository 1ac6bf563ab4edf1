//! Participant side of a duel: the local state machine, its timers, and the task driving it
//! against a room channel and the duel authority.

pub mod authority;
pub mod channel;
pub mod driver;
pub mod error;
pub mod machine;
pub mod timer;

pub use self::authority::{AuthorityClient, LocalAuthorityClient};
#[cfg(feature = "http")]
pub use self::authority::HttpAuthorityClient;
pub use self::channel::{LocalRoomChannel, RoomChannel, WsRoomChannel};
pub use self::driver::{SessionCommand, SessionHandle, spawn};
pub use self::error::SessionError;
pub use self::machine::{DuelSession, Phase, SessionView};
