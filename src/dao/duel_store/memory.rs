//! Process-local store used for development runs and tests.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AnswerOutcome, CasOutcome, DuelStore, FinalizeOutcome, QuizStore, Settle};
use crate::dao::{
    models::{
        ActivityEntity, DuelAnswerEntity, DuelEntity, DuelStatus, QuestionEntity, UserEntity,
        WeeklyScoreEntity,
    },
    storage::StorageResult,
};

#[derive(Default)]
struct Inner {
    duels: HashMap<Uuid, DuelEntity>,
    answers: HashMap<(Uuid, Uuid, u32), DuelAnswerEntity>,
    users: HashMap<Uuid, UserEntity>,
    weekly: HashMap<(Uuid, String), WeeklyScoreEntity>,
    activity: Vec<ActivityEntity>,
    quizzes: HashMap<Uuid, Vec<QuestionEntity>>,
}

/// Every operation runs under a single lock, so guarded transitions, their settlement and
/// the answer rows they read are trivially atomic.
#[derive(Clone, Default)]
pub struct InMemoryDuelStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDuelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn answers_of(&self, duel_id: Uuid) -> Vec<DuelAnswerEntity> {
        let mut answers: Vec<DuelAnswerEntity> = self
            .answers
            .values()
            .filter(|answer| answer.duel_id == duel_id)
            .cloned()
            .collect();
        answers.sort_by_key(|answer| (answer.user_id, answer.question_index));
        answers
    }

    fn finalize(&mut self, duel_id: Uuid, settle: &Settle) -> FinalizeOutcome {
        let Some(current) = self.duels.get(&duel_id) else {
            return FinalizeOutcome::Missing;
        };
        if current.status != DuelStatus::InProgress {
            return FinalizeOutcome::Lost(current.clone());
        }

        let settlement = settle(current, &self.answers_of(duel_id));
        let Some(duel) = self.duels.get_mut(&duel_id) else {
            return FinalizeOutcome::Missing;
        };
        settlement.apply_to(duel);
        let persisted = duel.clone();

        for participant in &settlement.participants {
            if let Some(user) = self.users.get_mut(&participant.user_id) {
                user.duel_count += 1;
                if participant.won {
                    user.duel_wins += 1;
                }
                user.best_duel_score = user.best_duel_score.max(participant.score);
                user.xp += u64::from(participant.xp);
            }

            let weekly = self
                .weekly
                .entry((participant.user_id, participant.week.clone()))
                .or_insert_with(|| WeeklyScoreEntity {
                    user_id: participant.user_id,
                    week: participant.week.clone(),
                    best_score: 0,
                    duel_count: 0,
                    duel_wins: 0,
                });
            weekly.duel_count += 1;
            if participant.won {
                weekly.duel_wins += 1;
            }
            weekly.best_score = weekly.best_score.max(participant.score);

            self.activity.push(participant.activity.clone());
        }

        FinalizeOutcome::Applied {
            duel: persisted,
            settlement,
        }
    }
}

impl DuelStore for InMemoryDuelStore {
    fn insert_duel(&self, duel: DuelEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.lock().await.duels.insert(duel.id, duel);
            Ok(())
        })
    }

    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.lock().await.duels.get(&id).cloned()) })
    }

    fn begin_duel(
        &self,
        id: Uuid,
        questions: Vec<QuestionEntity>,
        started_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.inner.lock().await;
            let Some(duel) = guard.duels.get_mut(&id) else {
                return Ok(CasOutcome::Missing);
            };
            if duel.status != DuelStatus::Accepted {
                return Ok(CasOutcome::Lost(duel.clone()));
            }
            duel.status = DuelStatus::InProgress;
            duel.questions = questions;
            duel.started_at = Some(started_at);
            Ok(CasOutcome::Applied(duel.clone()))
        })
    }

    fn record_answer(
        &self,
        answer: DuelAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.inner.lock().await;
            match guard.duels.get(&answer.duel_id) {
                None => return Ok(AnswerOutcome::Missing),
                Some(duel) if duel.status != DuelStatus::InProgress => {
                    return Ok(AnswerOutcome::Closed(duel.clone()));
                }
                Some(_) => {}
            }
            let key = (answer.duel_id, answer.user_id, answer.question_index);
            if let Some(existing) = guard.answers.get(&key) {
                return Ok(AnswerOutcome::Duplicate(existing.clone()));
            }
            guard.answers.insert(key, answer);
            Ok(AnswerOutcome::Recorded)
        })
    }

    fn list_answers(
        &self,
        duel_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<DuelAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.lock().await.answers_of(duel_id)) })
    }

    fn finalize_duel(
        &self,
        duel_id: Uuid,
        settle: Settle,
    ) -> BoxFuture<'static, StorageResult<FinalizeOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.lock().await.finalize(duel_id, &settle)) })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.lock().await.users.insert(user.id, user);
            Ok(())
        })
    }

    fn find_users(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.lock().await;
            Ok(ids
                .iter()
                .filter_map(|id| guard.users.get(id).cloned())
                .collect())
        })
    }

    fn weekly_score(
        &self,
        user_id: Uuid,
        week: String,
    ) -> BoxFuture<'static, StorageResult<Option<WeeklyScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .lock()
                .await
                .weekly
                .get(&(user_id, week))
                .cloned())
        })
    }

    fn weekly_leaderboard(
        &self,
        week: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WeeklyScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.lock().await;
            let mut rows: Vec<WeeklyScoreEntity> = guard
                .weekly
                .values()
                .filter(|row| row.week == week)
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                b.best_score
                    .cmp(&a.best_score)
                    .then(b.duel_wins.cmp(&a.duel_wins))
            });
            rows.truncate(limit);
            Ok(rows)
        })
    }

    fn list_activity(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.lock().await;
            Ok(guard
                .activity
                .iter()
                .filter(|entry| entry.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl QuizStore for InMemoryDuelStore {
    fn insert_quiz(
        &self,
        quiz_id: Uuid,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.lock().await.quizzes.insert(quiz_id, questions);
            Ok(())
        })
    }

    fn quiz_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.lock().await.quizzes.get(&quiz_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        duel_store::{Finalization, ParticipantSettlement},
        models::ActivityKind,
    };

    fn settle_for(winner: Uuid) -> Settle {
        Box::new(move |duel: &DuelEntity, answers: &[DuelAnswerEntity]| {
            let now = SystemTime::now();
            let score = 100 * answers.iter().filter(|row| row.correct).count() as u32;
            Finalization {
                duel_id: duel.id,
                challenger_score: score,
                opponent_score: 0,
                winner_id: Some(winner),
                forfeited_by: None,
                finished_at: now,
                participants: vec![ParticipantSettlement {
                    user_id: winner,
                    score,
                    won: true,
                    xp: 50,
                    week: "2026-W42".into(),
                    activity: ActivityEntity {
                        id: Uuid::new_v4(),
                        user_id: winner,
                        kind: ActivityKind::DuelWon,
                        duel_id: duel.id,
                        opponent_id: duel.opponent_id,
                        score,
                        forfeit: false,
                        created_at: now,
                    },
                }],
            }
        })
    }

    fn answer(duel: &DuelEntity, user_id: Uuid, question_index: u32) -> DuelAnswerEntity {
        DuelAnswerEntity {
            duel_id: duel.id,
            user_id,
            question_index,
            question_id: Uuid::new_v4(),
            option_id: Uuid::new_v4(),
            correct: true,
            answered_at: SystemTime::now(),
        }
    }

    async fn running(store: &InMemoryDuelStore, challenger: Uuid) -> DuelEntity {
        let mut duel = DuelEntity::accepted(Uuid::new_v4(), challenger, Uuid::new_v4(), 50);
        duel.status = DuelStatus::InProgress;
        store.insert_duel(duel.clone()).await.unwrap();
        duel
    }

    #[tokio::test]
    async fn begin_is_guarded_on_accepted() {
        let store = InMemoryDuelStore::new();
        let duel = DuelEntity::accepted(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 50);
        store.insert_duel(duel.clone()).await.unwrap();

        let first = store
            .begin_duel(duel.id, Vec::new(), SystemTime::now())
            .await
            .unwrap();
        assert!(matches!(first, CasOutcome::Applied(ref d) if d.status == DuelStatus::InProgress));

        let second = store
            .begin_duel(duel.id, Vec::new(), SystemTime::now())
            .await
            .unwrap();
        assert!(matches!(second, CasOutcome::Lost(_)));

        let missing = store
            .begin_duel(Uuid::new_v4(), Vec::new(), SystemTime::now())
            .await
            .unwrap();
        assert_eq!(missing, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn answers_are_written_once() {
        let store = InMemoryDuelStore::new();
        let duel = running(&store, Uuid::new_v4()).await;
        let first = answer(&duel, duel.challenger_id, 0);

        assert_eq!(
            store.record_answer(first.clone()).await.unwrap(),
            AnswerOutcome::Recorded
        );
        let mut retry = first.clone();
        retry.correct = false;
        assert_eq!(
            store.record_answer(retry).await.unwrap(),
            AnswerOutcome::Duplicate(first.clone())
        );

        let rows = store.list_answers(duel.id).await.unwrap();
        assert_eq!(rows, vec![first]);
    }

    #[tokio::test]
    async fn answers_need_a_running_duel() {
        let store = InMemoryDuelStore::new();
        let pending = DuelEntity::accepted(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 50);
        store.insert_duel(pending.clone()).await.unwrap();

        let outcome = store
            .record_answer(answer(&pending, pending.challenger_id, 0))
            .await
            .unwrap();
        assert_eq!(outcome, AnswerOutcome::Closed(pending.clone()));

        let ghost = DuelEntity::accepted(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 50);
        let outcome = store
            .record_answer(answer(&ghost, ghost.challenger_id, 0))
            .await
            .unwrap();
        assert_eq!(outcome, AnswerOutcome::Missing);
        assert!(store.list_answers(pending.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalize_settles_once() {
        let store = InMemoryDuelStore::new();
        let user = UserEntity::human("ada");
        store.insert_user(user.clone()).await.unwrap();
        let duel = running(&store, user.id).await;
        store
            .record_answer(answer(&duel, user.id, 0))
            .await
            .unwrap();
        store
            .record_answer(answer(&duel, user.id, 1))
            .await
            .unwrap();

        let first = store
            .finalize_duel(duel.id, settle_for(user.id))
            .await
            .unwrap();
        let FinalizeOutcome::Applied { duel: finished, settlement } = first else {
            panic!("expected the first finalization to apply");
        };
        assert_eq!(finished.status, DuelStatus::Finished);
        assert_eq!(finished.challenger_score, 200);
        assert_eq!(settlement.participants[0].score, 200);

        let second = store
            .finalize_duel(duel.id, settle_for(user.id))
            .await
            .unwrap();
        assert_eq!(second, FinalizeOutcome::Lost(finished.clone()));

        let late = store
            .record_answer(answer(&duel, user.id, 2))
            .await
            .unwrap();
        assert_eq!(late, AnswerOutcome::Closed(finished));
        assert_eq!(store.list_answers(duel.id).await.unwrap().len(), 2);

        let users = store.find_users(vec![user.id]).await.unwrap();
        assert_eq!(users[0].duel_count, 1);
        assert_eq!(users[0].duel_wins, 1);
        assert_eq!(users[0].xp, 50);
        assert_eq!(users[0].best_duel_score, 200);

        let weekly = store
            .weekly_score(user.id, "2026-W42".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(weekly.duel_count, 1);
        assert_eq!(store.list_activity(user.id).await.unwrap().len(), 1);
    }
}
