use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::models::{DuelEntity, DuelStatus, OptionEntity, QuestionEntity, UserEntity},
};

fn rfc3339(time: SystemTime) -> Option<String> {
    OffsetDateTime::from(time).format(&Rfc3339).ok()
}

/// Public projection of a duel record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DuelView {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub challenger_id: Uuid,
    pub opponent_id: Uuid,
    pub status: DuelStatus,
    pub challenger_score: u32,
    pub opponent_score: u32,
    /// `null` on a finished duel means a draw.
    pub winner_id: Option<Uuid>,
    pub forfeited_by: Option<Uuid>,
    pub xp_reward: u32,
    /// RFC 3339 timestamp of the first successful start.
    pub started_at: Option<String>,
    /// RFC 3339 timestamp of the finalizing write.
    pub finished_at: Option<String>,
}

impl From<&DuelEntity> for DuelView {
    fn from(duel: &DuelEntity) -> Self {
        Self {
            id: duel.id,
            quiz_id: duel.quiz_id,
            challenger_id: duel.challenger_id,
            opponent_id: duel.opponent_id,
            status: duel.status,
            challenger_score: duel.challenger_score,
            opponent_score: duel.opponent_score,
            winner_id: duel.winner_id,
            forfeited_by: duel.forfeited_by,
            xp_reward: duel.xp_reward,
            started_at: duel.started_at.and_then(rfc3339),
            finished_at: duel.finished_at.and_then(rfc3339),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OptionPayload {
    pub id: Uuid,
    pub text: String,
}

/// Frozen question, including its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionPayload {
    pub id: Uuid,
    pub prompt: String,
    pub options: Vec<OptionPayload>,
    pub correct_option_id: Uuid,
}

impl From<&QuestionEntity> for QuestionPayload {
    fn from(question: &QuestionEntity) -> Self {
        Self {
            id: question.id,
            prompt: question.prompt.clone(),
            options: question.options.iter().map(OptionPayload::from).collect(),
            correct_option_id: question.correct_option_id,
        }
    }
}

impl From<&OptionEntity> for OptionPayload {
    fn from(option: &OptionEntity) -> Self {
        Self {
            id: option.id,
            text: option.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParticipantPayload {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_bot: bool,
}

impl From<&UserEntity> for ParticipantPayload {
    fn from(user: &UserEntity) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name.clone(),
            is_bot: user.is_bot,
        }
    }
}

/// Pacing shared by both clients so their local timers agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimingPayload {
    pub countdown_ms: u64,
    pub question_time_ms: u64,
    pub reveal_dwell_ms: u64,
    pub points_per_correct: u32,
}

impl From<&AppConfig> for TimingPayload {
    fn from(config: &AppConfig) -> Self {
        Self {
            countdown_ms: millis(config.countdown()),
            question_time_ms: millis(config.question_time()),
            reveal_dwell_ms: millis(config.reveal_dwell()),
            points_per_correct: config.points_per_correct(),
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returned by `start`: identical for every caller once the duel is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StartResponse {
    pub ok: bool,
    pub duel: DuelView,
    pub questions: Vec<QuestionPayload>,
    /// Both participants; unknown user records are reported as humans.
    pub participants: Vec<ParticipantPayload>,
    pub timing: TimingPayload,
    /// `true` when another call had already frozen the questions.
    pub already_started: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct AnswerRequest {
    #[validate(range(max = 999))]
    pub question_index: u32,
    pub option_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerResponse {
    pub ok: bool,
    /// `false` when an answer for this question was already on record.
    pub recorded: bool,
    /// Correctness of the answer on record.
    pub correct: bool,
}

/// Client-side tally, only used when a participant has no answer rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema, Validate)]
pub struct FinishRequest {
    #[validate(range(max = 1_000_000))]
    #[serde(default)]
    pub challenger_score: Option<u32>,
    #[validate(range(max = 1_000_000))]
    #[serde(default)]
    pub opponent_score: Option<u32>,
}

/// Returned by `finish` and `forfeit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FinishResponse {
    pub ok: bool,
    pub duel: DuelView,
    /// `true` when another call performed the terminal write.
    pub already_finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DuelResponse {
    pub ok: bool,
    pub duel: DuelView,
}
