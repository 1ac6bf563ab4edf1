//! BSON document shapes. Identifiers are stored as hyphenated strings and counters as `i64`.

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    ActivityEntity, ActivityKind, DuelAnswerEntity, DuelEntity, DuelStatus, OptionEntity,
    QuestionEntity, UserEntity, WeeklyScoreEntity,
};

pub const DUEL_COLLECTION_NAME: &str = "duels";
pub const ANSWER_COLLECTION_NAME: &str = "duel_answers";
pub const USER_COLLECTION_NAME: &str = "users";
pub const WEEKLY_COLLECTION_NAME: &str = "weekly_scores";
pub const ACTIVITY_COLLECTION_NAME: &str = "activity";
pub const QUIZ_COLLECTION_NAME: &str = "quizzes";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOptionDocument {
    id: String,
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    id: String,
    prompt: String,
    options: Vec<MongoOptionDocument>,
    correct_option_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDuelDocument {
    #[serde(rename = "_id")]
    id: String,
    quiz_id: String,
    challenger_id: String,
    opponent_id: String,
    status: DuelStatus,
    #[serde(default)]
    questions: Vec<MongoQuestionDocument>,
    challenger_score: i64,
    opponent_score: i64,
    winner_id: Option<String>,
    #[serde(default)]
    forfeited_by: Option<String>,
    xp_reward: i64,
    created_at: DateTime,
    started_at: Option<DateTime>,
    finished_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    duel_id: String,
    user_id: String,
    question_index: i64,
    question_id: String,
    option_id: String,
    correct: bool,
    answered_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: String,
    display_name: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    xp: i64,
    #[serde(default)]
    duel_count: i64,
    #[serde(default)]
    duel_wins: i64,
    #[serde(default)]
    best_duel_score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoWeeklyDocument {
    user_id: String,
    week: String,
    best_score: i64,
    duel_count: i64,
    duel_wins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoActivityDocument {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    kind: ActivityKind,
    duel_id: String,
    opponent_id: String,
    score: i64,
    forfeit: bool,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub questions: Vec<MongoQuestionDocument>,
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(collection: &'static str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::Corrupt {
        collection,
        reason: format!("invalid uuid `{value}`: {err}"),
    })
}

fn to_u32(collection: &'static str, value: i64) -> MongoResult<u32> {
    u32::try_from(value).map_err(|_| MongoDaoError::Corrupt {
        collection,
        reason: format!("counter out of range: {value}"),
    })
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            prompt: value.prompt,
            options: value
                .options
                .into_iter()
                .map(|option| MongoOptionDocument {
                    id: option.id.to_string(),
                    text: option.text,
                })
                .collect(),
            correct_option_id: value.correct_option_id.to_string(),
        }
    }
}

impl MongoQuestionDocument {
    pub fn into_entity(self, collection: &'static str) -> MongoResult<QuestionEntity> {
        let options = self
            .options
            .into_iter()
            .map(|option| {
                Ok(OptionEntity {
                    id: parse_uuid(collection, &option.id)?,
                    text: option.text,
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(QuestionEntity {
            id: parse_uuid(collection, &self.id)?,
            prompt: self.prompt,
            options,
            correct_option_id: parse_uuid(collection, &self.correct_option_id)?,
        })
    }
}

impl From<DuelEntity> for MongoDuelDocument {
    fn from(value: DuelEntity) -> Self {
        Self {
            id: value.id.to_string(),
            quiz_id: value.quiz_id.to_string(),
            challenger_id: value.challenger_id.to_string(),
            opponent_id: value.opponent_id.to_string(),
            status: value.status,
            questions: value.questions.into_iter().map(Into::into).collect(),
            challenger_score: i64::from(value.challenger_score),
            opponent_score: i64::from(value.opponent_score),
            winner_id: value.winner_id.map(|id| id.to_string()),
            forfeited_by: value.forfeited_by.map(|id| id.to_string()),
            xp_reward: i64::from(value.xp_reward),
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            finished_at: value.finished_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoDuelDocument> for DuelEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoDuelDocument) -> MongoResult<Self> {
        const C: &str = DUEL_COLLECTION_NAME;
        Ok(Self {
            id: parse_uuid(C, &value.id)?,
            quiz_id: parse_uuid(C, &value.quiz_id)?,
            challenger_id: parse_uuid(C, &value.challenger_id)?,
            opponent_id: parse_uuid(C, &value.opponent_id)?,
            status: value.status,
            questions: value
                .questions
                .into_iter()
                .map(|question| question.into_entity(C))
                .collect::<MongoResult<Vec<_>>>()?,
            challenger_score: to_u32(C, value.challenger_score)?,
            opponent_score: to_u32(C, value.opponent_score)?,
            winner_id: value
                .winner_id
                .as_deref()
                .map(|id| parse_uuid(C, id))
                .transpose()?,
            forfeited_by: value
                .forfeited_by
                .as_deref()
                .map(|id| parse_uuid(C, id))
                .transpose()?,
            xp_reward: to_u32(C, value.xp_reward)?,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            finished_at: value.finished_at.map(DateTime::to_system_time),
        })
    }
}

impl From<DuelAnswerEntity> for MongoAnswerDocument {
    fn from(value: DuelAnswerEntity) -> Self {
        Self {
            duel_id: value.duel_id.to_string(),
            user_id: value.user_id.to_string(),
            question_index: i64::from(value.question_index),
            question_id: value.question_id.to_string(),
            option_id: value.option_id.to_string(),
            correct: value.correct,
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for DuelAnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> MongoResult<Self> {
        const C: &str = ANSWER_COLLECTION_NAME;
        Ok(Self {
            duel_id: parse_uuid(C, &value.duel_id)?,
            user_id: parse_uuid(C, &value.user_id)?,
            question_index: to_u32(C, value.question_index)?,
            question_id: parse_uuid(C, &value.question_id)?,
            option_id: parse_uuid(C, &value.option_id)?,
            correct: value.correct,
            answered_at: value.answered_at.to_system_time(),
        })
    }
}

impl MongoAnswerDocument {
    /// Fields written only when the `(duel, user, question)` row does not exist yet.
    pub fn insert_fields(&self) -> Document {
        doc! {
            "question_id": self.question_id.clone(),
            "option_id": self.option_id.clone(),
            "correct": self.correct,
            "answered_at": self.answered_at,
        }
    }

    pub fn key(&self) -> Document {
        doc! {
            "duel_id": self.duel_id.clone(),
            "user_id": self.user_id.clone(),
            "question_index": self.question_index,
        }
    }
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id.to_string(),
            display_name: value.display_name,
            is_bot: value.is_bot,
            xp: i64::try_from(value.xp).unwrap_or(i64::MAX),
            duel_count: i64::from(value.duel_count),
            duel_wins: i64::from(value.duel_wins),
            best_duel_score: i64::from(value.best_duel_score),
        }
    }
}

impl TryFrom<MongoUserDocument> for UserEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoUserDocument) -> MongoResult<Self> {
        const C: &str = USER_COLLECTION_NAME;
        Ok(Self {
            id: parse_uuid(C, &value.id)?,
            display_name: value.display_name,
            is_bot: value.is_bot,
            xp: u64::try_from(value.xp).map_err(|_| MongoDaoError::Corrupt {
                collection: C,
                reason: format!("negative xp: {}", value.xp),
            })?,
            duel_count: to_u32(C, value.duel_count)?,
            duel_wins: to_u32(C, value.duel_wins)?,
            best_duel_score: to_u32(C, value.best_duel_score)?,
        })
    }
}

impl TryFrom<MongoWeeklyDocument> for WeeklyScoreEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoWeeklyDocument) -> MongoResult<Self> {
        const C: &str = WEEKLY_COLLECTION_NAME;
        Ok(Self {
            user_id: parse_uuid(C, &value.user_id)?,
            week: value.week,
            best_score: to_u32(C, value.best_score)?,
            duel_count: to_u32(C, value.duel_count)?,
            duel_wins: to_u32(C, value.duel_wins)?,
        })
    }
}

impl From<ActivityEntity> for MongoActivityDocument {
    fn from(value: ActivityEntity) -> Self {
        Self {
            id: value.id.to_string(),
            user_id: value.user_id.to_string(),
            kind: value.kind,
            duel_id: value.duel_id.to_string(),
            opponent_id: value.opponent_id.to_string(),
            score: i64::from(value.score),
            forfeit: value.forfeit,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoActivityDocument> for ActivityEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoActivityDocument) -> MongoResult<Self> {
        const C: &str = ACTIVITY_COLLECTION_NAME;
        Ok(Self {
            id: parse_uuid(C, &value.id)?,
            user_id: parse_uuid(C, &value.user_id)?,
            kind: value.kind,
            duel_id: parse_uuid(C, &value.duel_id)?,
            opponent_id: parse_uuid(C, &value.opponent_id)?,
            score: to_u32(C, value.score)?,
            forfeit: value.forfeit,
            created_at: value.created_at.to_system_time(),
        })
    }
}
