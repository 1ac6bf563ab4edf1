use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::doc,
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    connection::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{
        ACTIVITY_COLLECTION_NAME, ANSWER_COLLECTION_NAME, DUEL_COLLECTION_NAME,
        MongoActivityDocument, MongoAnswerDocument, MongoDuelDocument, MongoQuestionDocument,
        MongoQuizDocument, MongoUserDocument, MongoWeeklyDocument, QUIZ_COLLECTION_NAME,
        USER_COLLECTION_NAME, WEEKLY_COLLECTION_NAME, doc_id,
    },
};
use crate::dao::{
    duel_store::{AnswerOutcome, CasOutcome, DuelStore, FinalizeOutcome, QuizStore, Settle},
    models::{
        ActivityEntity, DuelAnswerEntity, DuelEntity, DuelStatus, QuestionEntity, UserEntity,
        WeeklyScoreEntity,
    },
    storage::StorageResult,
};

const TRANSACTION_ATTEMPTS: u32 = 3;

/// MongoDB-backed duel store.
///
/// Guarded transitions are `replace_one` calls filtered on `{_id, status}`: a zero matched
/// count means another writer moved the duel first. Answer inserts and finalization run in
/// multi-document transactions that both write the duel document, so they serialize
/// against each other. Transactions require a replica set deployment.
#[derive(Clone)]
pub struct MongoDuelStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.config.connect().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoDuelStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = config.connect().await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let answers = database.collection::<MongoAnswerDocument>(ANSWER_COLLECTION_NAME);
        let answer_index = IndexModel::builder()
            .keys(doc! {"duel_id": 1, "user_id": 1, "question_index": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("answer_once_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        answers
            .create_index(answer_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ANSWER_COLLECTION_NAME,
                index: "duel_id,user_id,question_index",
                source,
            })?;

        let weekly = database.collection::<MongoWeeklyDocument>(WEEKLY_COLLECTION_NAME);
        let weekly_index = IndexModel::builder()
            .keys(doc! {"user_id": 1, "week": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("weekly_user_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        weekly
            .create_index(weekly_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: WEEKLY_COLLECTION_NAME,
                index: "user_id,week",
                source,
            })?;

        let activity = database.collection::<MongoActivityDocument>(ACTIVITY_COLLECTION_NAME);
        let activity_index = IndexModel::builder()
            .keys(doc! {"user_id": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("activity_user_idx".to_owned()))
                    .build(),
            )
            .build();
        activity
            .create_index(activity_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ACTIVITY_COLLECTION_NAME,
                index: "user_id,created_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn duels(&self) -> Collection<MongoDuelDocument> {
        self.database().await.collection(DUEL_COLLECTION_NAME)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION_NAME)
    }

    async fn users(&self) -> Collection<MongoUserDocument> {
        self.database().await.collection(USER_COLLECTION_NAME)
    }

    async fn weekly(&self) -> Collection<MongoWeeklyDocument> {
        self.database().await.collection(WEEKLY_COLLECTION_NAME)
    }

    async fn activity(&self) -> Collection<MongoActivityDocument> {
        self.database().await.collection(ACTIVITY_COLLECTION_NAME)
    }

    async fn quizzes(&self) -> Collection<MongoQuizDocument> {
        self.database().await.collection(QUIZ_COLLECTION_NAME)
    }

    async fn insert_duel(&self, duel: DuelEntity) -> MongoResult<()> {
        let id = duel.id;
        let document: MongoDuelDocument = duel.into();
        self.duels()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveDuel { id, source })?;
        Ok(())
    }

    async fn find_duel(&self, id: Uuid) -> MongoResult<Option<DuelEntity>> {
        let document = self
            .duels()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadDuel { id, source })?;

        document.map(DuelEntity::try_from).transpose()
    }

    /// Resolve a guarded write that matched nothing into the current record.
    async fn lost_or_missing(&self, id: Uuid) -> MongoResult<CasOutcome> {
        Ok(match self.find_duel(id).await? {
            Some(current) => CasOutcome::Lost(current),
            None => CasOutcome::Missing,
        })
    }

    async fn begin_duel(
        &self,
        id: Uuid,
        questions: Vec<QuestionEntity>,
        started_at: SystemTime,
    ) -> MongoResult<CasOutcome> {
        let Some(current) = self.find_duel(id).await? else {
            return Ok(CasOutcome::Missing);
        };
        if current.status != DuelStatus::Accepted {
            return Ok(CasOutcome::Lost(current));
        }

        let mut started = current;
        started.status = DuelStatus::InProgress;
        started.questions = questions;
        started.started_at = Some(started_at);

        let document: MongoDuelDocument = started.clone().into();
        let result = self
            .duels()
            .await
            .replace_one(
                doc! {"_id": id.to_string(), "status": DuelStatus::Accepted.as_str()},
                &document,
            )
            .await
            .map_err(|source| MongoDaoError::BeginDuel { id, source })?;

        if result.matched_count == 0 {
            return self.lost_or_missing(id).await;
        }
        Ok(CasOutcome::Applied(started))
    }

    async fn record_answer(&self, answer: DuelAnswerEntity) -> MongoResult<AnswerOutcome> {
        let mut attempt = 1;
        loop {
            match self.try_record_answer(&answer).await {
                Err(err) if err.is_transient_transaction() && attempt < TRANSACTION_ATTEMPTS => {
                    debug!(duel_id = %answer.duel_id, attempt, "answer write conflict; retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn try_record_answer(&self, answer: &DuelAnswerEntity) -> MongoResult<AnswerOutcome> {
        let id = answer.duel_id;
        let mut session = self
            .transaction()
            .await
            .map_err(|source| MongoDaoError::RecordAnswer { id, source })?;

        let outcome = self.record_in_session(&mut session, answer).await;
        match outcome {
            Ok(AnswerOutcome::Recorded) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|source| MongoDaoError::RecordAnswer { id, source })?;
                Ok(AnswerOutcome::Recorded)
            }
            other => {
                abort(&mut session, id).await;
                other
            }
        }
    }

    /// Bumping `answer_count` under the status filter makes the insert conflict with a
    /// concurrent finalization of the same duel.
    async fn record_in_session(
        &self,
        session: &mut ClientSession,
        answer: &DuelAnswerEntity,
    ) -> MongoResult<AnswerOutcome> {
        let id = answer.duel_id;
        let failed = |source| MongoDaoError::RecordAnswer { id, source };
        let duels = self.duels().await;

        let guarded = duels
            .update_one(
                doc! {"_id": id.to_string(), "status": DuelStatus::InProgress.as_str()},
                doc! {"$inc": {"answer_count": 1_i64}},
            )
            .session(&mut *session)
            .await
            .map_err(failed)?;
        if guarded.matched_count == 0 {
            let current = duels
                .find_one(doc_id(id))
                .session(&mut *session)
                .await
                .map_err(failed)?;
            return Ok(match current {
                Some(document) => AnswerOutcome::Closed(DuelEntity::try_from(document)?),
                None => AnswerOutcome::Missing,
            });
        }

        let answers = self.answers().await;
        let document: MongoAnswerDocument = answer.clone().into();
        let existing = answers
            .find_one(document.key())
            .session(&mut *session)
            .await
            .map_err(failed)?;
        if let Some(existing) = existing {
            return Ok(AnswerOutcome::Duplicate(DuelAnswerEntity::try_from(
                existing,
            )?));
        }

        answers
            .insert_one(&document)
            .session(&mut *session)
            .await
            .map_err(failed)?;
        Ok(AnswerOutcome::Recorded)
    }

    async fn list_answers(&self, duel_id: Uuid) -> MongoResult<Vec<DuelAnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! {"duel_id": duel_id.to_string()})
            .sort(doc! {"user_id": 1, "question_index": 1})
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { id: duel_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers { id: duel_id, source })?;

        documents
            .into_iter()
            .map(DuelAnswerEntity::try_from)
            .collect()
    }

    async fn finalize_duel(&self, id: Uuid, settle: Settle) -> MongoResult<FinalizeOutcome> {
        let mut attempt = 1;
        loop {
            match self.try_finalize_duel(id, &settle).await {
                Err(err) if err.is_transient_transaction() && attempt < TRANSACTION_ATTEMPTS => {
                    info!(duel_id = %id, attempt, "finalize write conflict; retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn try_finalize_duel(&self, id: Uuid, settle: &Settle) -> MongoResult<FinalizeOutcome> {
        let mut session = self
            .transaction()
            .await
            .map_err(|source| MongoDaoError::FinalizeDuel { id, source })?;

        let outcome = self.finalize_in_session(&mut session, id, settle).await;
        match outcome {
            Ok(FinalizeOutcome::Applied { duel, settlement }) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|source| MongoDaoError::FinalizeDuel { id, source })?;
                Ok(FinalizeOutcome::Applied { duel, settlement })
            }
            other => {
                abort(&mut session, id).await;
                other
            }
        }
    }

    /// Reads the duel and its answer rows, settles, and writes everything inside the
    /// caller's transaction.
    async fn finalize_in_session(
        &self,
        session: &mut ClientSession,
        id: Uuid,
        settle: &Settle,
    ) -> MongoResult<FinalizeOutcome> {
        let failed = |source| MongoDaoError::FinalizeDuel { id, source };
        let duels = self.duels().await;

        let Some(document) = duels
            .find_one(doc_id(id))
            .session(&mut *session)
            .await
            .map_err(failed)?
        else {
            return Ok(FinalizeOutcome::Missing);
        };
        let current = DuelEntity::try_from(document)?;
        if current.status != DuelStatus::InProgress {
            return Ok(FinalizeOutcome::Lost(current));
        }

        let mut cursor = self
            .answers()
            .await
            .find(doc! {"duel_id": id.to_string()})
            .sort(doc! {"user_id": 1, "question_index": 1})
            .session(&mut *session)
            .await
            .map_err(failed)?;
        let rows: Vec<MongoAnswerDocument> = cursor
            .stream(&mut *session)
            .try_collect()
            .await
            .map_err(failed)?;
        let answers = rows
            .into_iter()
            .map(DuelAnswerEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;

        let settlement = settle(&current, &answers);
        let mut finished = current;
        settlement.apply_to(&mut finished);

        let document: MongoDuelDocument = finished.clone().into();
        let replaced = duels
            .replace_one(
                doc! {"_id": id.to_string(), "status": DuelStatus::InProgress.as_str()},
                &document,
            )
            .session(&mut *session)
            .await
            .map_err(failed)?;
        if replaced.matched_count == 0 {
            let current = duels
                .find_one(doc_id(id))
                .session(&mut *session)
                .await
                .map_err(failed)?;
            return Ok(match current {
                Some(document) => FinalizeOutcome::Lost(DuelEntity::try_from(document)?),
                None => FinalizeOutcome::Missing,
            });
        }

        let users = self.users().await;
        let weekly = self.weekly().await;
        let activity = self.activity().await;

        for participant in &settlement.participants {
            let user_id = participant.user_id.to_string();
            let score = i64::from(participant.score);
            let won = i64::from(participant.won);

            users
                .update_one(
                    doc! {"_id": &user_id},
                    doc! {
                        "$inc": {"duel_count": 1_i64, "duel_wins": won, "xp": i64::from(participant.xp)},
                        "$max": {"best_duel_score": score},
                    },
                )
                .session(&mut *session)
                .await
                .map_err(failed)?;

            weekly
                .update_one(
                    doc! {"user_id": &user_id, "week": &participant.week},
                    doc! {
                        "$inc": {"duel_count": 1_i64, "duel_wins": won},
                        "$max": {"best_score": score},
                    },
                )
                .upsert(true)
                .session(&mut *session)
                .await
                .map_err(failed)?;

            let entry: MongoActivityDocument = participant.activity.clone().into();
            activity
                .insert_one(&entry)
                .session(&mut *session)
                .await
                .map_err(failed)?;
        }

        Ok(FinalizeOutcome::Applied {
            duel: finished,
            settlement,
        })
    }

    /// Open a client session with a started transaction.
    async fn transaction(&self) -> mongodb::error::Result<ClientSession> {
        let mut session = self.client().await.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    async fn insert_user(&self, user: UserEntity) -> MongoResult<()> {
        let id = user.id;
        let document: MongoUserDocument = user.into();
        self.users()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveUser { id, source })?;
        Ok(())
    }

    async fn find_users(&self, ids: Vec<Uuid>) -> MongoResult<Vec<UserEntity>> {
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let documents: Vec<MongoUserDocument> = self
            .users()
            .await
            .find(doc! {"_id": {"$in": ids}})
            .await
            .map_err(|source| MongoDaoError::LoadUsers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadUsers { source })?;

        documents.into_iter().map(UserEntity::try_from).collect()
    }

    async fn weekly_score(
        &self,
        user_id: Uuid,
        week: String,
    ) -> MongoResult<Option<WeeklyScoreEntity>> {
        let document = self
            .weekly()
            .await
            .find_one(doc! {"user_id": user_id.to_string(), "week": &week})
            .await
            .map_err(|source| MongoDaoError::LoadWeekly {
                week: week.clone(),
                source,
            })?;

        document.map(WeeklyScoreEntity::try_from).transpose()
    }

    async fn weekly_leaderboard(
        &self,
        week: String,
        limit: usize,
    ) -> MongoResult<Vec<WeeklyScoreEntity>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let documents: Vec<MongoWeeklyDocument> = self
            .weekly()
            .await
            .find(doc! {"week": &week})
            .sort(doc! {"best_score": -1, "duel_wins": -1})
            .limit(limit)
            .await
            .map_err(|source| MongoDaoError::LoadWeekly {
                week: week.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadWeekly {
                week: week.clone(),
                source,
            })?;

        documents
            .into_iter()
            .map(WeeklyScoreEntity::try_from)
            .collect()
    }

    async fn list_activity(&self, user_id: Uuid) -> MongoResult<Vec<ActivityEntity>> {
        let documents: Vec<MongoActivityDocument> = self
            .activity()
            .await
            .find(doc! {"user_id": user_id.to_string()})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::LoadActivity {
                id: user_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadActivity {
                id: user_id,
                source,
            })?;

        documents.into_iter().map(ActivityEntity::try_from).collect()
    }

    async fn insert_quiz(&self, quiz_id: Uuid, questions: Vec<QuestionEntity>) -> MongoResult<()> {
        let document = MongoQuizDocument {
            id: quiz_id.to_string(),
            questions: questions.into_iter().map(Into::into).collect(),
        };
        self.quizzes()
            .await
            .replace_one(doc_id(quiz_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveQuiz {
                id: quiz_id,
                source,
            })?;
        Ok(())
    }

    async fn quiz_questions(&self, quiz_id: Uuid) -> MongoResult<Option<Vec<QuestionEntity>>> {
        let document = self
            .quizzes()
            .await
            .find_one(doc_id(quiz_id))
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: quiz_id,
                source,
            })?;

        document
            .map(|quiz| {
                quiz.questions
                    .into_iter()
                    .map(|question: MongoQuestionDocument| {
                        question.into_entity(QUIZ_COLLECTION_NAME)
                    })
                    .collect::<MongoResult<Vec<_>>>()
            })
            .transpose()
    }
}

impl DuelStore for MongoDuelStore {
    fn insert_duel(&self, duel: DuelEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_duel(duel).await.map_err(Into::into) })
    }

    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_duel(id).await.map_err(Into::into) })
    }

    fn begin_duel(
        &self,
        id: Uuid,
        questions: Vec<QuestionEntity>,
        started_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<CasOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .begin_duel(id, questions, started_at)
                .await
                .map_err(Into::into)
        })
    }

    fn record_answer(
        &self,
        answer: DuelAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        duel_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<DuelAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(duel_id).await.map_err(Into::into) })
    }

    fn finalize_duel(
        &self,
        duel_id: Uuid,
        settle: Settle,
    ) -> BoxFuture<'static, StorageResult<FinalizeOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.finalize_duel(duel_id, settle).await.map_err(Into::into) })
    }

    fn insert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_user(user).await.map_err(Into::into) })
    }

    fn find_users(&self, ids: Vec<Uuid>) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_users(ids).await.map_err(Into::into) })
    }

    fn weekly_score(
        &self,
        user_id: Uuid,
        week: String,
    ) -> BoxFuture<'static, StorageResult<Option<WeeklyScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.weekly_score(user_id, week).await.map_err(Into::into) })
    }

    fn weekly_leaderboard(
        &self,
        week: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<WeeklyScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .weekly_leaderboard(week, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn list_activity(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_activity(user_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl QuizStore for MongoDuelStore {
    fn insert_quiz(
        &self,
        quiz_id: Uuid,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_quiz(quiz_id, questions)
                .await
                .map_err(Into::into)
        })
    }

    fn quiz_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Vec<QuestionEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.quiz_questions(quiz_id).await.map_err(Into::into) })
    }
}

async fn abort(session: &mut ClientSession, duel_id: Uuid) {
    if let Err(err) = session.abort_transaction().await {
        warn!(duel_id = %duel_id, error = %err, "failed to abort transaction");
    }
}
