pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    ActivityEntity, DuelAnswerEntity, DuelEntity, DuelStatus, QuestionEntity, UserEntity,
    WeeklyScoreEntity,
};
use crate::dao::storage::StorageResult;

/// Result of [`DuelStore::begin_duel`], a compare-and-swap on the duel status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// This call performed the write; the record is returned as persisted.
    Applied(DuelEntity),
    /// Another call moved the duel first; the record is returned as currently persisted.
    Lost(DuelEntity),
    /// The duel does not exist.
    Missing,
}

/// Result of [`DuelStore::finalize_duel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This call finished the duel; `settlement` is what was persisted with it.
    Applied {
        duel: DuelEntity,
        settlement: Finalization,
    },
    /// The duel had already left `IN_PROGRESS`; the record is returned as persisted.
    Lost(DuelEntity),
    /// The duel does not exist.
    Missing,
}

/// Result of [`DuelStore::record_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The row was written.
    Recorded,
    /// A row already existed for this question; it is returned unchanged.
    Duplicate(DuelAnswerEntity),
    /// The duel is not `IN_PROGRESS`; nothing was written.
    Closed(DuelEntity),
    /// The duel does not exist.
    Missing,
}

/// Builds the settlement from the duel and its answer rows as read inside the guarded
/// write. May be called more than once when a backend retries its transaction.
pub type Settle =
    Box<dyn Fn(&DuelEntity, &[DuelAnswerEntity]) -> Finalization + Send + Sync + 'static>;

/// Side effects for one human participant, applied together with the status flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSettlement {
    pub user_id: Uuid,
    /// Authoritative score of this participant in the duel.
    pub score: u32,
    pub won: bool,
    /// XP granted by this duel (may be zero).
    pub xp: u32,
    /// ISO week bucket of the weekly aggregate to upsert.
    pub week: String,
    pub activity: ActivityEntity,
}

/// Everything the finalizing write must persist atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalization {
    pub duel_id: Uuid,
    pub challenger_score: u32,
    pub opponent_score: u32,
    pub winner_id: Option<Uuid>,
    pub forfeited_by: Option<Uuid>,
    pub finished_at: SystemTime,
    /// Only human participants appear here.
    pub participants: Vec<ParticipantSettlement>,
}

impl Finalization {
    /// Copy the final scoreboard into `duel` and mark it finished.
    pub fn apply_to(&self, duel: &mut DuelEntity) {
        duel.status = DuelStatus::Finished;
        duel.challenger_score = self.challenger_score;
        duel.opponent_score = self.opponent_score;
        duel.winner_id = self.winner_id;
        duel.forfeited_by = self.forfeited_by;
        duel.finished_at = Some(self.finished_at);
    }
}

/// Abstraction over the relational/document store hosting duels, answers and counters.
///
/// `begin_duel` and `finalize_duel` are the only status-changing writes; both succeed only
/// when the persisted status still matches the expected source status. `record_answer` is
/// guarded on the same status.
pub trait DuelStore: Send + Sync {
    fn insert_duel(&self, duel: DuelEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelEntity>>>;
    /// `ACCEPTED -> IN_PROGRESS`, freezing `questions` into the record.
    fn begin_duel(
        &self,
        id: Uuid,
        questions: Vec<QuestionEntity>,
        started_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>>;
    /// Insert an answer row unless one already exists for (duel, user, question index).
    /// The status check and the insert are one atomic unit: no row lands on a duel that
    /// has left `IN_PROGRESS`.
    fn record_answer(
        &self,
        answer: DuelAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerOutcome>>;
    fn list_answers(&self, duel_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<DuelAnswerEntity>>>;
    /// `IN_PROGRESS -> FINISHED` together with every settlement effect, all or nothing.
    /// `settle` sees the answer rows read in the same atomic unit as the status flip.
    fn finalize_duel(
        &self,
        duel_id: Uuid,
        settle: Settle,
    ) -> BoxFuture<'static, StorageResult<FinalizeOutcome>>;
    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_users(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>>;
    fn weekly_score(
        &self,
        user_id: Uuid,
        week: String,
    ) -> BoxFuture<'static, StorageResult<Option<WeeklyScoreEntity>>>;
    fn weekly_leaderboard(
        &self,
        week: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WeeklyScoreEntity>>>;
    fn list_activity(&self, user_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read-only access to quiz content.
pub trait QuizStore: Send + Sync {
    fn insert_quiz(
        &self,
        quiz_id: Uuid,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn quiz_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>>;
}
