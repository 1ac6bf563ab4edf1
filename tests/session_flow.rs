mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use uuid::Uuid;

use duel_arena_back::{
    config::AppConfig,
    dao::{
        duel_store::DuelStore,
        models::{DuelStatus, UserEntity},
    },
    dto::duel::{
        AnswerRequest, AnswerResponse, DuelResponse, FinishRequest, FinishResponse, StartResponse,
    },
    session::{
        self, AuthorityClient, LocalAuthorityClient, LocalRoomChannel, Phase, SessionError,
        SessionHandle,
    },
};

use common::Arena;

fn quick_config() -> AppConfig {
    AppConfig::from_json(r#"{"countdown_ms": 50, "question_time_ms": 1000, "reveal_dwell_ms": 50}"#)
        .unwrap()
}

fn join(arena: &Arena, duel_id: Uuid, user_id: Uuid) -> SessionHandle {
    let channel = LocalRoomChannel::join(arena.state.rooms(), duel_id, user_id);
    let authority = LocalAuthorityClient::new(arena.state.clone(), user_id);
    session::spawn(duel_id, user_id, Box::new(channel), Arc::new(authority))
}

/// Local authority whose answer acknowledgements arrive after a lag, logging call order.
struct LaggingAnswers {
    inner: LocalAuthorityClient,
    lag: Duration,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl AuthorityClient for LaggingAnswers {
    fn start(&self, duel_id: Uuid) -> BoxFuture<'static, Result<StartResponse, SessionError>> {
        self.inner.start(duel_id)
    }

    fn answer(
        &self,
        duel_id: Uuid,
        request: AnswerRequest,
    ) -> BoxFuture<'static, Result<AnswerResponse, SessionError>> {
        let call = self.inner.answer(duel_id, request);
        let lag = self.lag;
        let calls = self.calls.clone();
        Box::pin(async move {
            tokio::time::sleep(lag).await;
            let response = call.await;
            calls.lock().unwrap().push("answer");
            response
        })
    }

    fn finish(
        &self,
        duel_id: Uuid,
        request: FinishRequest,
    ) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
        self.calls.lock().unwrap().push("finish");
        self.inner.finish(duel_id, request)
    }

    fn forfeit(&self, duel_id: Uuid) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
        self.inner.forfeit(duel_id)
    }

    fn get(&self, duel_id: Uuid) -> BoxFuture<'static, Result<DuelResponse, SessionError>> {
        self.inner.get(duel_id)
    }
}

/// Answer every displayed question until the session leaves play.
async fn play(handle: &SessionHandle, pick_correct: bool) {
    let mut view = handle.view();
    loop {
        let snapshot = view.borrow_and_update().clone();
        if snapshot.phase == Phase::Finished {
            return;
        }
        if snapshot.phase == Phase::Playing && snapshot.selected_option.is_none() {
            if let Some(question) = snapshot.question {
                let option_id = if pick_correct {
                    question.correct_option_id
                } else {
                    question
                        .options
                        .iter()
                        .find(|option| option.id != question.correct_option_id)
                        .unwrap()
                        .id
                };
                handle.answer(option_id).await.unwrap();
            }
        }
        if view.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn two_players_reach_the_same_result() {
    let arena = Arena::with_config(5, quick_config()).await;
    let ada = arena.user(UserEntity::human("ada")).await;
    let grace = arena.user(UserEntity::human("grace")).await;
    let duel = arena.duel(&ada, &grace).await;

    let ada_session = join(&arena, duel.id, ada.id);
    let grace_session = join(&arena, duel.id, grace.id);
    tokio::join!(play(&ada_session, true), play(&grace_session, false));

    let ada_result = ada_session.outcome().await.unwrap();
    let grace_result = grace_session.outcome().await.unwrap();
    assert_eq!(ada_result, grace_result);
    assert_eq!(ada_result.status, DuelStatus::Finished);
    assert_eq!(ada_result.challenger_score, 500);
    assert_eq!(ada_result.opponent_score, 0);
    assert_eq!(ada_result.winner_id, Some(ada.id));
    assert_eq!(ada_result.forfeited_by, None);

    let ada_after = arena.reload_user(ada.id).await;
    assert_eq!(ada_after.duel_count, 1);
    assert_eq!(ada_after.duel_wins, 1);
}

#[tokio::test(start_paused = true)]
async fn forfeit_ends_the_duel_for_both_players() {
    let arena = Arena::with_config(5, quick_config()).await;
    let ada = arena.user(UserEntity::human("ada")).await;
    let grace = arena.user(UserEntity::human("grace")).await;
    let duel = arena.duel(&ada, &grace).await;

    let ada_session = join(&arena, duel.id, ada.id);
    let grace_session = join(&arena, duel.id, grace.id);

    let mut grace_view = grace_session.view();
    grace_view
        .wait_for(|view| view.phase == Phase::Playing)
        .await
        .unwrap();
    grace_session.forfeit().await.unwrap();

    let grace_result = grace_session.outcome().await.unwrap();
    let ada_result = ada_session.outcome().await.unwrap();
    assert_eq!(grace_result, ada_result);
    assert_eq!(ada_result.forfeited_by, Some(grace.id));
    assert_eq!(ada_result.winner_id, Some(ada.id));
    assert_eq!(ada_result.opponent_score, 0);
}

#[tokio::test(start_paused = true)]
async fn bot_duels_start_without_waiting() {
    let arena = Arena::with_config(3, quick_config()).await;
    let ada = arena.user(UserEntity::human("ada")).await;
    let bot = arena.user(UserEntity::bot("quizbot")).await;
    let duel = arena.duel(&ada, &bot).await;

    let ada_session = join(&arena, duel.id, ada.id);
    play(&ada_session, true).await;

    let result = ada_session.outcome().await.unwrap();
    assert_eq!(result.challenger_score, 300);
    assert_eq!(result.opponent_score, 0);
    assert_eq!(result.winner_id, Some(ada.id));
    assert!(arena.store.list_activity(bot.id).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reopening_a_finished_duel_shows_the_result() {
    let arena = Arena::with_config(3, quick_config()).await;
    let ada = arena.user(UserEntity::human("ada")).await;
    let grace = arena.user(UserEntity::human("grace")).await;
    let duel = arena.duel(&ada, &grace).await;

    let first = join(&arena, duel.id, ada.id);
    let grace_session = join(&arena, duel.id, grace.id);
    first
        .view()
        .wait_for(|view| view.phase == Phase::Countdown)
        .await
        .unwrap();
    first.forfeit().await.unwrap();
    let settled = first.outcome().await.unwrap();
    grace_session.outcome().await.unwrap();

    let reopened = join(&arena, duel.id, ada.id);
    let view = reopened.view();
    let result = reopened.outcome().await.unwrap();
    assert_eq!(result, settled);
    assert_eq!(view.borrow().phase, Phase::Finished);
}

#[tokio::test(start_paused = true)]
async fn finish_waits_for_answers_in_flight() {
    let arena = Arena::with_config(1, quick_config()).await;
    let ada = arena.user(UserEntity::human("ada")).await;
    let bot = arena.user(UserEntity::bot("quizbot")).await;
    let duel = arena.duel(&ada, &bot).await;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let authority = LaggingAnswers {
        inner: LocalAuthorityClient::new(arena.state.clone(), ada.id),
        lag: Duration::from_secs(3),
        calls: calls.clone(),
    };
    let channel = LocalRoomChannel::join(arena.state.rooms(), duel.id, ada.id);
    let ada_session = session::spawn(duel.id, ada.id, Box::new(channel), Arc::new(authority));
    play(&ada_session, true).await;

    let result = ada_session.outcome().await.unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["answer", "finish"]);
    assert_eq!(result.challenger_score, 100);
    let rows = arena.store.list_answers(duel.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].correct);
}
