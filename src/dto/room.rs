//! Wire protocol of the duel room channel.
//!
//! Frames are JSON text messages tagged by `type`. Room events are tagged by `kind` so they
//! can be nested inside a `broadcast` frame.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Final scoreboard carried by [`RoomEvent::GameEnd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScorePair {
    pub challenger_score: u32,
    pub opponent_score: u32,
}

/// Fire-and-forget event fanned out to every other peer of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    /// Every peer is ready; start the countdown.
    GameStart,
    /// Sender started displaying the question at `index`.
    QuestionReveal { index: u32 },
    /// `user_id` submitted an answer to the question at `index`.
    PlayerAnswered { user_id: Uuid, index: u32 },
    /// Everybody answered; the frozen key is shown.
    AnswerReveal { index: u32, correct_option_id: Uuid },
    /// Sender's clock for the question at `index` ran out.
    TimeUp { index: u32 },
    /// Authoritative outcome relayed by the peer that received it.
    GameEnd {
        winner_id: Option<Uuid>,
        scores: ScorePair,
    },
}

/// Mutable state a peer publishes about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PresenceUpdate {
    pub ready: bool,
    /// Index of the question currently displayed.
    pub question_index: Option<u32>,
    /// Whether this peer answered the displayed question.
    pub has_answered: bool,
}

/// Presence entry as seen by other peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Presence {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub state: PresenceUpdate,
}

/// Frames accepted from room clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomClientMessage {
    /// Must be the first frame of every connection.
    Join { user_id: Uuid },
    /// Replace this connection's presence entry.
    Presence { state: PresenceUpdate },
    /// Relay an event to the other peers.
    Broadcast { event: RoomEvent },
}

impl RoomClientMessage {
    /// Parse an inbound text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Frames emitted to room clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomServerMessage {
    /// Acknowledges the join; identifies this connection.
    Joined { connection_id: Uuid },
    /// Full presence list after any change, including disconnects.
    PresenceSync { peers: Vec<Presence> },
    /// Event relayed from another peer.
    Broadcast { from: Uuid, event: RoomEvent },
}
