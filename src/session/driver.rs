//! Async task running one participant's duel session.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        duel::{AnswerRequest, DuelView, FinishRequest, FinishResponse},
        room::RoomServerMessage,
    },
    error::ErrorCode,
    session::{
        authority::AuthorityClient,
        channel::RoomChannel,
        error::SessionError,
        machine::{DuelSession, Effect, SessionInput, SessionView, TimerToken},
        timer::TimerSlot,
    },
};

const COMMAND_CAPACITY: usize = 16;
const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(4);

/// Player actions accepted by a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Answer { option_id: Uuid },
    Forfeit,
}

/// Handle on a spawned session. Dropping it tears the session down; the duel itself stays
/// in progress on the authority.
pub struct SessionHandle {
    view: watch::Receiver<SessionView>,
    commands: mpsc::Sender<SessionCommand>,
    task: Option<JoinHandle<Result<DuelView, SessionError>>>,
}

impl SessionHandle {
    /// Live view of the session.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub async fn answer(&self, option_id: Uuid) -> Result<(), SessionError> {
        self.command(SessionCommand::Answer { option_id }).await
    }

    pub async fn forfeit(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Forfeit).await
    }

    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Aborted)
    }

    /// Wait for the authoritative result.
    pub async fn outcome(mut self) -> Result<DuelView, SessionError> {
        let Some(task) = self.task.take() else {
            return Err(SessionError::Aborted);
        };
        task.await.map_err(|_| SessionError::Aborted)?
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start the session of `user_id` in `duel_id`.
pub fn spawn(
    duel_id: Uuid,
    user_id: Uuid,
    channel: Box<dyn RoomChannel>,
    authority: Arc<dyn AuthorityClient>,
) -> SessionHandle {
    let (view_tx, view) = watch::channel(SessionView::default());
    let (commands, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (done, done_rx) = mpsc::unbounded_channel();
    let (timers, fired) = TimerSlot::new();

    let driver = Driver {
        duel_id,
        machine: DuelSession::new(user_id),
        channel,
        room_open: true,
        pending_answers: 0,
        deferred_finish: None,
        timers,
        authority,
        done,
    };
    let task = tokio::spawn(driver.run(commands_rx, done_rx, fired, view_tx));

    SessionHandle {
        view,
        commands,
        task: Some(task),
    }
}

enum Completion {
    Input(SessionInput),
    /// One answer submission ended, with its failure if it was not recorded.
    AnswerSettled(Option<SessionError>),
    Fatal(SessionError),
}

struct Driver {
    duel_id: Uuid,
    machine: DuelSession,
    channel: Box<dyn RoomChannel>,
    room_open: bool,
    /// Answer submissions still in flight; `finish` waits for them.
    pending_answers: usize,
    deferred_finish: Option<FinishRequest>,
    timers: TimerSlot,
    authority: Arc<dyn AuthorityClient>,
    done: mpsc::UnboundedSender<Completion>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut done: mpsc::UnboundedReceiver<Completion>,
        mut fired: mpsc::UnboundedReceiver<TimerToken>,
        view: watch::Sender<SessionView>,
    ) -> Result<DuelView, SessionError> {
        self.start();
        let mut commands_open = true;

        loop {
            let input = tokio::select! {
                Some(completion) = done.recv() => match completion {
                    Completion::Input(input) => input,
                    Completion::AnswerSettled(failure) => {
                        self.answer_settled();
                        match failure {
                            Some(err) => SessionInput::AuthorityFailed(err.to_string()),
                            None => continue,
                        }
                    }
                    Completion::Fatal(err) => {
                        warn!(duel_id = %self.duel_id, error = %err, "session failed");
                        view.send_modify(|view| view.error = Some(err.to_string()));
                        return Err(err);
                    }
                },
                Some(token) = fired.recv() => SessionInput::Timer(token),
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Answer { option_id }) => SessionInput::Answer { option_id },
                    Some(SessionCommand::Forfeit) => SessionInput::Forfeit,
                    None => {
                        commands_open = false;
                        continue;
                    }
                },
                frame = self.channel.recv(), if self.room_open => match frame {
                    Some(RoomServerMessage::PresenceSync { peers }) => SessionInput::Peers(peers),
                    Some(RoomServerMessage::Broadcast { from, event }) => SessionInput::Room { from, event },
                    Some(RoomServerMessage::Joined { connection_id }) => {
                        debug!(duel_id = %self.duel_id, connection_id = %connection_id, "joined room");
                        continue;
                    }
                    None => {
                        warn!(duel_id = %self.duel_id, "room channel closed; continuing on local timers");
                        self.room_open = false;
                        continue;
                    }
                },
            };

            for effect in self.machine.handle(input) {
                self.apply(effect);
            }
            view.send_replace(self.machine.view());

            if self.machine.is_settled() {
                if let Some(result) = self.machine.result() {
                    info!(duel_id = %self.duel_id, winner_id = ?result.winner_id, "session settled");
                    return Ok(result.clone());
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Track(state) => {
                if !self.room_open {
                    return;
                }
                if let Err(err) = self.channel.track(state) {
                    self.room_lost(err);
                }
            }
            Effect::Broadcast(event) => {
                if !self.room_open {
                    return;
                }
                if let Err(err) = self.channel.broadcast(event) {
                    self.room_lost(err);
                }
            }
            Effect::Arm { token, after } => self.timers.arm(token, after),
            Effect::Disarm => self.timers.disarm(),
            Effect::SubmitAnswer {
                question_index,
                option_id,
            } => self.submit_answer(AnswerRequest {
                question_index,
                option_id,
            }),
            Effect::CallFinish(request) if self.pending_answers > 0 => {
                debug!(duel_id = %self.duel_id, pending = self.pending_answers, "finish waits for answers in flight");
                self.deferred_finish = Some(request);
            }
            Effect::CallFinish(request) => self.finish(request),
            Effect::CallForfeit => self.forfeit(),
        }
    }

    fn room_lost(&mut self, err: SessionError) {
        warn!(duel_id = %self.duel_id, error = %err, "room channel failed; continuing on local timers");
        self.room_open = false;
    }

    fn start(&self) {
        let authority = self.authority.clone();
        let duel_id = self.duel_id;
        let done = self.done.clone();
        tokio::spawn(async move {
            let completion = match retrying("start", || authority.start(duel_id)).await {
                Ok(response) => Completion::Input(SessionInput::Started(response)),
                Err(err) if err.code() == Some(ErrorCode::DuelFinished) => {
                    info!(duel_id = %duel_id, "duel already finished; loading result");
                    match retrying("get", || authority.get(duel_id)).await {
                        Ok(response) => Completion::Input(SessionInput::Concluded(response.duel)),
                        Err(err) => Completion::Fatal(err),
                    }
                }
                Err(err) => Completion::Fatal(err),
            };
            let _ = done.send(completion);
        });
    }

    fn submit_answer(&mut self, request: AnswerRequest) {
        self.pending_answers += 1;
        let authority = self.authority.clone();
        let duel_id = self.duel_id;
        let done = self.done.clone();
        tokio::spawn(async move {
            let index = request.question_index;
            let failure = match retrying("answer", || authority.answer(duel_id, request.clone()))
                .await
            {
                Ok(response) => {
                    debug!(duel_id = %duel_id, index, recorded = response.recorded, "answer acknowledged");
                    None
                }
                Err(err) => {
                    warn!(duel_id = %duel_id, index, error = %err, "answer not recorded");
                    Some(err)
                }
            };
            let _ = done.send(Completion::AnswerSettled(failure));
        });
    }

    fn answer_settled(&mut self) {
        self.pending_answers = self.pending_answers.saturating_sub(1);
        if self.pending_answers > 0 {
            return;
        }
        if let Some(request) = self.deferred_finish.take() {
            self.finish(request);
        }
    }

    fn finish(&self, request: FinishRequest) {
        let authority = self.authority.clone();
        let duel_id = self.duel_id;
        self.conclude("finish", move || authority.finish(duel_id, request.clone()));
    }

    fn forfeit(&self) {
        let authority = self.authority.clone();
        let duel_id = self.duel_id;
        self.conclude("forfeit", move || authority.forfeit(duel_id));
    }

    fn conclude<F>(&self, what: &'static str, call: F)
    where
        F: FnMut() -> BoxFuture<'static, Result<FinishResponse, SessionError>>
            + Send
            + 'static,
    {
        let done = self.done.clone();
        let duel_id = self.duel_id;
        tokio::spawn(async move {
            let completion = match retrying(what, call).await {
                Ok(response) => {
                    if response.already_finished {
                        info!(duel_id = %duel_id, what, "duel was already finished");
                    }
                    Completion::Input(SessionInput::Concluded(response.duel))
                }
                Err(err) => Completion::Fatal(err),
            };
            let _ = done.send(completion);
        });
    }
}

/// Run an authority call, retrying transient failures with exponential back-off.
async fn retrying<T, F>(what: &'static str, mut call: F) -> Result<T, SessionError>
where
    F: FnMut() -> BoxFuture<'static, Result<T, SessionError>>,
{
    let mut delay = RETRY_DELAY;
    let mut attempt = 1;
    loop {
        match call().await {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(what, attempt, error = %err, "authority call failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::dto::duel::{AnswerResponse, DuelResponse, StartResponse};

    struct Flaky {
        calls: AtomicU32,
    }

    impl Flaky {
        fn call(&self) -> BoxFuture<'static, Result<u32, SessionError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < 2 {
                    Err(SessionError::Rejected {
                        code: ErrorCode::StorageUnavailable,
                        message: "degraded".into(),
                    })
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let flaky = Flaky {
            calls: AtomicU32::new(0),
        };
        assert_eq!(retrying("test", || flaky.call()).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome: Result<(), SessionError> = retrying("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Err(SessionError::Rejected {
                    code: ErrorCode::NotParticipant,
                    message: "no".into(),
                })
            })
        })
        .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Refusing;

    impl AuthorityClient for Refusing {
        fn start(&self, _: Uuid) -> BoxFuture<'static, Result<StartResponse, SessionError>> {
            Box::pin(async {
                Err(SessionError::Rejected {
                    code: ErrorCode::NotParticipant,
                    message: "outsider".into(),
                })
            })
        }
        fn answer(
            &self,
            _: Uuid,
            _: AnswerRequest,
        ) -> BoxFuture<'static, Result<AnswerResponse, SessionError>> {
            Box::pin(async { Err(SessionError::Aborted) })
        }
        fn finish(
            &self,
            _: Uuid,
            _: FinishRequest,
        ) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
            Box::pin(async { Err(SessionError::Aborted) })
        }
        fn forfeit(&self, _: Uuid) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
            Box::pin(async { Err(SessionError::Aborted) })
        }
        fn get(&self, _: Uuid) -> BoxFuture<'static, Result<DuelResponse, SessionError>> {
            Box::pin(async { Err(SessionError::Aborted) })
        }
    }

    struct Silent;

    impl RoomChannel for Silent {
        fn track(&mut self, _: crate::dto::room::PresenceUpdate) -> Result<(), SessionError> {
            Ok(())
        }
        fn broadcast(&mut self, _: crate::dto::room::RoomEvent) -> Result<(), SessionError> {
            Ok(())
        }
        fn recv(&mut self) -> BoxFuture<'_, Option<RoomServerMessage>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn rejected_start_ends_the_session() {
        let handle = spawn(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Box::new(Silent),
            Arc::new(Refusing),
        );
        let view = handle.view();
        let err = handle.outcome().await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotParticipant));
        assert!(view.borrow().error.is_some());
    }
}
