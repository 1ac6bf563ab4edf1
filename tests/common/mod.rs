#![allow(dead_code)]

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Notify, mpsc};
use uuid::Uuid;

use duel_arena_back::{
    config::AppConfig,
    dao::{
        duel_store::{
            AnswerOutcome, CasOutcome, DuelStore, FinalizeOutcome, QuizStore, Settle,
            memory::InMemoryDuelStore,
        },
        models::{
            ActivityEntity, DuelAnswerEntity, DuelEntity, OptionEntity, QuestionEntity,
            UserEntity, WeeklyScoreEntity,
        },
        storage::StorageResult,
    },
    dto::duel::{AnswerRequest, StartResponse},
    services::{
        duel_service,
        notifier::{Notifier, NotifierError, OutcomeNotice},
    },
    state::{AppState, SharedState, Storage},
};

pub const XP_REWARD: u32 = 50;

/// Collects every notice handed to the notifier.
#[derive(Clone)]
pub struct RecordingNotifier {
    sender: mpsc::UnboundedSender<OutcomeNotice>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: OutcomeNotice) -> BoxFuture<'static, Result<(), NotifierError>> {
        let sender = self.sender.clone();
        Box::pin(async move {
            let _ = sender.send(notice);
            Ok(())
        })
    }
}

pub struct Arena {
    pub state: SharedState,
    pub store: InMemoryDuelStore,
    pub quiz_id: Uuid,
    pub notices: Mutex<mpsc::UnboundedReceiver<OutcomeNotice>>,
}

impl Arena {
    /// Fresh in-memory arena with a quiz of `question_count` questions.
    pub async fn new(question_count: usize) -> Self {
        Self::with_config(question_count, AppConfig::default()).await
    }

    pub async fn with_config(question_count: usize, config: AppConfig) -> Self {
        Self::build(question_count, config, Storage::new).await
    }

    /// Arena whose `finalize_duel` calls wait at the returned gate.
    pub async fn gated(question_count: usize) -> (Self, FinalizeGate) {
        let gate = FinalizeGate::default();
        let wrap = gate.clone();
        let arena = Self::build(question_count, AppConfig::default(), move |store| {
            Storage::new(GatedStore { inner: store, gate: wrap })
        })
        .await;
        (arena, gate)
    }

    async fn build(
        question_count: usize,
        config: AppConfig,
        storage: impl FnOnce(InMemoryDuelStore) -> Storage,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = AppState::new(config, Arc::new(RecordingNotifier { sender }));
        let store = InMemoryDuelStore::new();
        let quiz_id = Uuid::new_v4();
        store
            .insert_quiz(quiz_id, (0..question_count).map(question).collect())
            .await
            .unwrap();
        state.set_storage(storage(store.clone())).await;
        Self {
            state,
            store,
            quiz_id,
            notices: Mutex::new(receiver),
        }
    }

    pub async fn user(&self, user: UserEntity) -> UserEntity {
        self.store.insert_user(user.clone()).await.unwrap();
        user
    }

    /// Accepted duel between `challenger` and `opponent`.
    pub async fn duel(&self, challenger: &UserEntity, opponent: &UserEntity) -> DuelEntity {
        let duel = DuelEntity::accepted(self.quiz_id, challenger.id, opponent.id, XP_REWARD);
        self.store.insert_duel(duel.clone()).await.unwrap();
        duel
    }

    pub async fn reload_user(&self, id: Uuid) -> UserEntity {
        self.store
            .find_users(vec![id])
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    /// Submit answers for the first `count` questions, `correct` of them right.
    pub async fn play(
        &self,
        started: &StartResponse,
        user_id: Uuid,
        count: usize,
        correct: usize,
    ) {
        for (index, question) in started.questions.iter().enumerate().take(count) {
            let option_id = if index < correct {
                question.correct_option_id
            } else {
                question
                    .options
                    .iter()
                    .find(|option| option.id != question.correct_option_id)
                    .unwrap()
                    .id
            };
            duel_service::answer(
                &self.state,
                started.duel.id,
                user_id,
                AnswerRequest {
                    question_index: index as u32,
                    option_id,
                },
            )
            .await
            .unwrap();
        }
    }

    /// Next outcome notice, waiting for the fire-and-forget dispatch.
    pub async fn next_notice(&self) -> Option<OutcomeNotice> {
        let mut notices = self.notices.lock().await;
        tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .ok()
            .flatten()
    }
}

pub fn question(n: usize) -> QuestionEntity {
    let options: Vec<OptionEntity> = (0..4)
        .map(|i| OptionEntity {
            id: Uuid::new_v4(),
            text: format!("answer {n}.{i}"),
        })
        .collect();
    QuestionEntity {
        id: Uuid::new_v4(),
        prompt: format!("question {n}"),
        correct_option_id: options[2].id,
        options,
    }
}

/// Holds finalizations between "entered" and "released".
#[derive(Clone, Default)]
pub struct FinalizeGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl FinalizeGate {
    /// Wait until a finalization reaches the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting finalization through.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory store whose `finalize_duel` stalls at a [`FinalizeGate`] before running.
struct GatedStore {
    inner: InMemoryDuelStore,
    gate: FinalizeGate,
}

impl DuelStore for GatedStore {
    fn insert_duel(&self, duel: DuelEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_duel(duel)
    }

    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelEntity>>> {
        self.inner.find_duel(id)
    }

    fn begin_duel(
        &self,
        id: Uuid,
        questions: Vec<QuestionEntity>,
        started_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        self.inner.begin_duel(id, questions, started_at)
    }

    fn record_answer(
        &self,
        answer: DuelAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerOutcome>> {
        self.inner.record_answer(answer)
    }

    fn list_answers(
        &self,
        duel_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<DuelAnswerEntity>>> {
        self.inner.list_answers(duel_id)
    }

    fn finalize_duel(
        &self,
        duel_id: Uuid,
        settle: Settle,
    ) -> BoxFuture<'static, StorageResult<FinalizeOutcome>> {
        let inner = self.inner.clone();
        let gate = self.gate.clone();
        Box::pin(async move {
            gate.entered.notify_one();
            gate.release.notified().await;
            inner.finalize_duel(duel_id, settle).await
        })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_user(user)
    }

    fn find_users(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        self.inner.find_users(ids)
    }

    fn weekly_score(
        &self,
        user_id: Uuid,
        week: String,
    ) -> BoxFuture<'static, StorageResult<Option<WeeklyScoreEntity>>> {
        self.inner.weekly_score(user_id, week)
    }

    fn weekly_leaderboard(
        &self,
        week: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WeeklyScoreEntity>>> {
        self.inner.weekly_leaderboard(week, limit)
    }

    fn list_activity(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>> {
        self.inner.list_activity(user_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

impl QuizStore for GatedStore {
    fn insert_quiz(
        &self,
        quiz_id: Uuid,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_quiz(quiz_id, questions)
    }

    fn quiz_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>> {
        self.inner.quiz_questions(quiz_id)
    }
}
