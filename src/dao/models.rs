use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a duel record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelStatus {
    /// Challenge issued, waiting for the opponent to accept.
    PendingAccept,
    /// Both players agreed; nobody opened the duel screen yet.
    Accepted,
    /// Questions are frozen and answers are being recorded.
    InProgress,
    /// Terminal: scores, winner and finish time are immutable.
    Finished,
    /// Challenge was never accepted in time.
    Expired,
    /// Challenge was withdrawn or declined.
    Cancelled,
}

impl DuelStatus {
    /// Stable wire/storage representation, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            DuelStatus::PendingAccept => "PENDING_ACCEPT",
            DuelStatus::Accepted => "ACCEPTED",
            DuelStatus::InProgress => "IN_PROGRESS",
            DuelStatus::Finished => "FINISHED",
            DuelStatus::Expired => "EXPIRED",
            DuelStatus::Cancelled => "CANCELLED",
        }
    }
}

/// One selectable option of a quiz question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionEntity {
    /// Stable identifier of the option.
    pub id: Uuid,
    /// Text displayed to the player.
    pub text: String,
}

/// Question as supplied by the quiz content store, including its answer key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier of the question inside its quiz.
    pub id: Uuid,
    /// Prompt displayed to the player.
    pub prompt: String,
    /// Options in authored order.
    pub options: Vec<OptionEntity>,
    /// Identifier of the single correct option.
    pub correct_option_id: Uuid,
}

/// Authoritative record of one head-to-head match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelEntity {
    /// Primary key of the duel.
    pub id: Uuid,
    /// Quiz the questions are drawn from.
    pub quiz_id: Uuid,
    /// Player who issued the challenge.
    pub challenger_id: Uuid,
    /// Player who was challenged.
    pub opponent_id: Uuid,
    /// Current lifecycle status.
    pub status: DuelStatus,
    /// Question list frozen by the first successful `start`; empty before that.
    pub questions: Vec<QuestionEntity>,
    /// Final challenger score, only meaningful once finished.
    pub challenger_score: u32,
    /// Final opponent score, only meaningful once finished.
    pub opponent_score: u32,
    /// Winner of the duel; `None` once finished means a draw.
    pub winner_id: Option<Uuid>,
    /// Participant who conceded, if the duel ended by forfeit.
    pub forfeited_by: Option<Uuid>,
    /// XP granted to a clean winner, fixed at creation.
    pub xp_reward: u32,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Time of the first successful `start`.
    pub started_at: Option<SystemTime>,
    /// Time of the single finalizing write.
    pub finished_at: Option<SystemTime>,
}

impl DuelEntity {
    /// Build an accepted duel ready to be started.
    pub fn accepted(quiz_id: Uuid, challenger_id: Uuid, opponent_id: Uuid, xp_reward: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            challenger_id,
            opponent_id,
            status: DuelStatus::Accepted,
            questions: Vec::new(),
            challenger_score: 0,
            opponent_score: 0,
            winner_id: None,
            forfeited_by: None,
            xp_reward,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether `user_id` is one of the two participants.
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.challenger_id == user_id || self.opponent_id == user_id
    }

    /// The other participant, if `user_id` takes part in this duel.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.challenger_id {
            Some(self.opponent_id)
        } else if user_id == self.opponent_id {
            Some(self.challenger_id)
        } else {
            None
        }
    }
}

/// One recorded answer of a participant to a frozen question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelAnswerEntity {
    pub duel_id: Uuid,
    pub user_id: Uuid,
    /// Position of the question inside the frozen list.
    pub question_index: u32,
    pub question_id: Uuid,
    pub option_id: Uuid,
    /// Judged against the frozen key when the row was written.
    pub correct: bool,
    pub answered_at: SystemTime,
}

/// Per-user counters touched by the settler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    pub id: Uuid,
    pub display_name: String,
    /// Non-human opponents never receive XP, counters or leaderboard rows.
    pub is_bot: bool,
    pub xp: u64,
    pub duel_count: u32,
    pub duel_wins: u32,
    pub best_duel_score: u32,
}

impl UserEntity {
    /// Fresh human player with zeroed counters.
    pub fn human(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            is_bot: false,
            xp: 0,
            duel_count: 0,
            duel_wins: 0,
            best_duel_score: 0,
        }
    }

    /// Fresh non-human opponent.
    pub fn bot(display_name: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            ..Self::human(display_name)
        }
    }
}

/// Weekly leaderboard aggregate for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyScoreEntity {
    pub user_id: Uuid,
    /// ISO week bucket, e.g. `2026-W42`.
    pub week: String,
    pub best_score: u32,
    pub duel_count: u32,
    pub duel_wins: u32,
}

/// Kind of activity-feed entry produced by a finished duel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    DuelWon,
    DuelLost,
    DuelDrawn,
}

/// Activity-feed entry appended for a human participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ActivityKind,
    pub duel_id: Uuid,
    pub opponent_id: Uuid,
    pub score: u32,
    pub forfeit: bool,
    pub created_at: SystemTime,
}
