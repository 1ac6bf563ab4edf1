use std::time::SystemTime;

use rand::seq::SliceRandom;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        duel_store::{AnswerOutcome, CasOutcome, FinalizeOutcome, Settle},
        models::{DuelAnswerEntity, DuelEntity, DuelStatus, QuestionEntity, UserEntity},
    },
    dto::{
        duel::{
            AnswerRequest, AnswerResponse, DuelResponse, DuelView, FinishRequest, FinishResponse,
            ParticipantPayload, QuestionPayload, StartResponse, TimingPayload,
        },
        leaderboard::{LeaderboardEntry, LeaderboardQuery, LeaderboardResponse},
    },
    error::{ErrorCode, ServiceError},
    services::{
        notifier::{self, OutcomeNotice},
        scoring, settler,
        settler::{Scoreboard, Termination},
        sse_events,
    },
    state::{
        SharedState, Storage,
        state_machine::{DuelEvent, InvalidTransition, compute_transition},
    },
};

const DEFAULT_LEADERBOARD_LIMIT: u32 = 20;

/// Open the duel: freeze the question order on the first call and return it to every caller.
pub async fn start(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
) -> Result<StartResponse, ServiceError> {
    let storage = state.require_storage().await?;
    let duel = load_for_participant(&storage, duel_id, caller_id).await?;

    let (duel, already_started) = match duel.status {
        DuelStatus::InProgress => (duel, true),
        DuelStatus::Accepted => begin(&storage, duel).await?,
        from => return Err(rejected(from, DuelEvent::Start)),
    };

    let users = storage
        .duels
        .find_users(vec![duel.challenger_id, duel.opponent_id])
        .await?;
    let participants = [duel.challenger_id, duel.opponent_id]
        .into_iter()
        .map(|id| participant_payload(id, &users))
        .collect();

    Ok(StartResponse {
        ok: true,
        duel: DuelView::from(&duel),
        questions: duel.questions.iter().map(QuestionPayload::from).collect(),
        participants,
        timing: TimingPayload::from(state.config().as_ref()),
        already_started,
    })
}

async fn begin(storage: &Storage, duel: DuelEntity) -> Result<(DuelEntity, bool), ServiceError> {
    let Some(mut questions) = storage.quizzes.quiz_questions(duel.quiz_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "quiz `{}` not found",
            duel.quiz_id
        )));
    };
    if questions.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "quiz `{}` has no questions",
            duel.quiz_id
        )));
    }
    shuffle(&mut questions);

    match storage
        .duels
        .begin_duel(duel.id, questions, SystemTime::now())
        .await?
    {
        CasOutcome::Applied(duel) => {
            info!(duel_id = %duel.id, questions = duel.questions.len(), "duel started");
            Ok((duel, false))
        }
        CasOutcome::Lost(current) if current.status == DuelStatus::InProgress => {
            info!(duel_id = %current.id, "start raced; returning frozen questions");
            Ok((current, true))
        }
        CasOutcome::Lost(current) => Err(rejected(current.status, DuelEvent::Start)),
        CasOutcome::Missing => Err(duel_not_found(duel.id)),
    }
}

fn shuffle(questions: &mut [QuestionEntity]) {
    questions.shuffle(&mut rand::rng());
}

/// Record one answer, judged against the frozen key. The first answer per question wins.
pub async fn answer(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
    request: AnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    let storage = state.require_storage().await?;
    let duel = load_for_participant(&storage, duel_id, caller_id).await?;
    ensure_in_progress(&duel)?;

    let AnswerRequest {
        question_index,
        option_id,
    } = request;
    let question = usize::try_from(question_index)
        .ok()
        .and_then(|index| duel.questions.get(index))
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "question index {question_index} is outside the {} frozen questions",
                duel.questions.len()
            ))
        })?;
    if !question.options.iter().any(|option| option.id == option_id) {
        return Err(ServiceError::InvalidInput(format!(
            "option `{option_id}` does not belong to question {question_index}"
        )));
    }

    let correct = question.correct_option_id == option_id;
    let outcome = storage
        .duels
        .record_answer(DuelAnswerEntity {
            duel_id,
            user_id: caller_id,
            question_index,
            question_id: question.id,
            option_id,
            correct,
            answered_at: SystemTime::now(),
        })
        .await?;

    match outcome {
        AnswerOutcome::Recorded => {
            debug!(duel_id = %duel_id, user_id = %caller_id, question_index, correct, "answer recorded");
            Ok(AnswerResponse {
                ok: true,
                recorded: true,
                correct,
            })
        }
        AnswerOutcome::Duplicate(existing) => {
            debug!(duel_id = %duel_id, user_id = %caller_id, question_index, "duplicate answer ignored");
            Ok(AnswerResponse {
                ok: true,
                recorded: false,
                correct: existing.correct,
            })
        }
        AnswerOutcome::Closed(current) => {
            debug!(duel_id = %duel_id, user_id = %caller_id, question_index, status = current.status.as_str(), "answer refused; duel closed");
            Err(not_accepting_answers(&current))
        }
        AnswerOutcome::Missing => Err(duel_not_found(duel_id)),
    }
}

/// Current record of a duel.
pub async fn get(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
) -> Result<DuelResponse, ServiceError> {
    let storage = state.require_storage().await?;
    let duel = load_for_participant(&storage, duel_id, caller_id).await?;
    Ok(DuelResponse {
        ok: true,
        duel: DuelView::from(&duel),
    })
}

/// Natural end of the duel. Scores are recomputed from the answer rows.
pub async fn finish(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
    reported: FinishRequest,
) -> Result<FinishResponse, ServiceError> {
    conclude(state, duel_id, caller_id, Termination::Completed, reported).await
}

/// Concession by the caller: their score is zero and the opponent wins.
pub async fn forfeit(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
) -> Result<FinishResponse, ServiceError> {
    conclude(
        state,
        duel_id,
        caller_id,
        Termination::Forfeited { by: caller_id },
        FinishRequest::default(),
    )
    .await
}

async fn conclude(
    state: &SharedState,
    duel_id: Uuid,
    caller_id: Uuid,
    termination: Termination,
    reported: FinishRequest,
) -> Result<FinishResponse, ServiceError> {
    let storage = state.require_storage().await?;
    let duel = load_for_participant(&storage, duel_id, caller_id).await?;

    let event = match termination {
        Termination::Completed => DuelEvent::Finish,
        Termination::Forfeited { .. } => DuelEvent::Forfeit,
    };
    if duel.status == DuelStatus::Finished {
        debug!(duel_id = %duel_id, user_id = %caller_id, ?event, "duel already finished");
        return Ok(already_finished(&duel));
    }
    compute_transition(duel.status, event).map_err(ServiceError::from)?;

    let config = state.config();
    let users = storage
        .duels
        .find_users(vec![duel.challenger_id, duel.opponent_id])
        .await?;
    let finished_at = SystemTime::now();
    let settle: Settle = Box::new(move |duel: &DuelEntity, answers: &[DuelAnswerEntity]| {
        let scores = scoreboard(
            duel,
            answers,
            termination,
            &reported,
            config.points_per_correct(),
        );
        settler::settle(duel, scores, termination, &users, &config, finished_at)
    });

    match storage.duels.finalize_duel(duel_id, settle).await? {
        FinalizeOutcome::Applied {
            duel: finished,
            settlement,
        } => {
            info!(
                duel_id = %duel_id,
                user_id = %caller_id,
                ?event,
                challenger_score = finished.challenger_score,
                opponent_score = finished.opponent_score,
                winner_id = ?finished.winner_id,
                "duel finalized"
            );
            let view = DuelView::from(&finished);
            sse_events::broadcast_duel_finished(state, &view);
            let notices: Vec<OutcomeNotice> = settlement
                .participants
                .iter()
                .map(OutcomeNotice::from)
                .collect();
            notifier::dispatch(state.notifier(), notices);
            Ok(FinishResponse {
                ok: true,
                duel: view,
                already_finished: false,
            })
        }
        FinalizeOutcome::Lost(current) if current.status == DuelStatus::Finished => {
            info!(duel_id = %duel_id, user_id = %caller_id, ?event, "finalization race lost");
            Ok(already_finished(&current))
        }
        FinalizeOutcome::Lost(current) => Err(rejected(current.status, event)),
        FinalizeOutcome::Missing => Err(duel_not_found(duel_id)),
    }
}

/// Scores from the answer rows read alongside the status flip. A forfeiter scores zero and
/// their opponent keeps only what their rows earned.
fn scoreboard(
    duel: &DuelEntity,
    answers: &[DuelAnswerEntity],
    termination: Termination,
    reported: &FinishRequest,
    points: u32,
) -> Scoreboard {
    let question_count = duel.questions.len();
    let score_for = |user_id: Uuid, reported: Option<u32>| match termination {
        Termination::Forfeited { by } if by == user_id => 0,
        Termination::Forfeited { .. } => {
            scoring::participant_score(answers, user_id, None, question_count, points)
        }
        Termination::Completed => {
            scoring::participant_score(answers, user_id, reported, question_count, points)
        }
    };
    Scoreboard {
        challenger: score_for(duel.challenger_id, reported.challenger_score),
        opponent: score_for(duel.opponent_id, reported.opponent_score),
    }
}

fn already_finished(duel: &DuelEntity) -> FinishResponse {
    FinishResponse {
        ok: true,
        duel: DuelView::from(duel),
        already_finished: true,
    }
}

/// Weekly leaderboard, ordered by best score then wins.
pub async fn weekly_leaderboard(
    state: &SharedState,
    query: LeaderboardQuery,
) -> Result<LeaderboardResponse, ServiceError> {
    let storage = state.require_storage().await?;
    let week = query
        .week
        .unwrap_or_else(|| settler::iso_week(SystemTime::now()));
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    let rows = storage
        .duels
        .weekly_leaderboard(week.clone(), limit)
        .await?;
    let users = storage
        .duels
        .find_users(rows.iter().map(|row| row.user_id).collect())
        .await?;

    let entries = rows
        .into_iter()
        .enumerate()
        .map(|(position, row)| LeaderboardEntry {
            rank: u32::try_from(position + 1).unwrap_or(u32::MAX),
            display_name: users
                .iter()
                .find(|user| user.id == row.user_id)
                .map(|user| user.display_name.clone()),
            user_id: row.user_id,
            best_score: row.best_score,
            duel_count: row.duel_count,
            duel_wins: row.duel_wins,
        })
        .collect();

    Ok(LeaderboardResponse {
        ok: true,
        week,
        entries,
    })
}

/// Load the duel and check that `caller_id` may act on it.
pub async fn load_for_participant(
    storage: &Storage,
    duel_id: Uuid,
    caller_id: Uuid,
) -> Result<DuelEntity, ServiceError> {
    let Some(duel) = storage.duels.find_duel(duel_id).await? else {
        return Err(duel_not_found(duel_id));
    };
    if !duel.is_participant(caller_id) {
        debug!(duel_id = %duel_id, user_id = %caller_id, "caller is not a participant");
        return Err(ServiceError::NotParticipant);
    }
    Ok(duel)
}

fn ensure_in_progress(duel: &DuelEntity) -> Result<(), ServiceError> {
    match duel.status {
        DuelStatus::InProgress => Ok(()),
        _ => Err(not_accepting_answers(duel)),
    }
}

fn not_accepting_answers(duel: &DuelEntity) -> ServiceError {
    match duel.status {
        DuelStatus::Finished => ServiceError::WrongState {
            code: ErrorCode::DuelFinished,
            message: format!("duel `{}` is already finished", duel.id),
        },
        status => ServiceError::WrongState {
            code: ErrorCode::DuelNotStarted,
            message: format!("duel `{}` is {} and not accepting answers", duel.id, status.as_str()),
        },
    }
}

fn participant_payload(user_id: Uuid, users: &[UserEntity]) -> ParticipantPayload {
    users
        .iter()
        .find(|user| user.id == user_id)
        .map(ParticipantPayload::from)
        .unwrap_or_else(|| ParticipantPayload {
            user_id,
            display_name: String::new(),
            is_bot: false,
        })
}

fn duel_not_found(duel_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("duel `{duel_id}` not found"))
}

fn rejected(from: DuelStatus, event: DuelEvent) -> ServiceError {
    InvalidTransition { from, event }.into()
}
