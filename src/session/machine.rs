//! Pure reducer of the client duel session.
//!
//! The reducer never performs I/O: every input returns the effects the driver must carry out.
//! Each phase change bumps a generation counter embedded in timer tokens, so a timer armed
//! for an earlier phase is ignored when it fires late.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use uuid::Uuid;

use crate::dto::{
    duel::{DuelView, FinishRequest, QuestionPayload, StartResponse, TimingPayload},
    room::{Presence, PresenceUpdate, RoomEvent, ScorePair},
};

/// Screen the player is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the authority to return the frozen questions.
    #[default]
    Loading,
    /// Ready; waiting for the other human to be ready too.
    Waiting,
    /// Local countdown before the first question.
    Countdown,
    /// A question is displayed and its clock is running.
    Playing,
    /// Correct option shown for a fixed dwell.
    QuestionResult,
    /// Questions exhausted or forfeited; the authority result is displayed once known.
    Finished,
}

/// Purpose of a local timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pre-game countdown before the first question.
    Countdown,
    /// Answer window of the displayed question.
    Question,
    /// Dwell on the revealed correct option.
    Reveal,
}

/// Identifies one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    /// Which phase armed the timer.
    pub kind: TimerKind,
    /// Bumped on every arm; a fired token with an older generation is stale.
    pub generation: u64,
}

/// Everything the session reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// The authority answered `start`.
    Started(StartResponse),
    /// Presence list of the room changed.
    Peers(Vec<Presence>),
    /// Event relayed from another peer.
    Room { from: Uuid, event: RoomEvent },
    /// The local player picked an option.
    Answer { option_id: Uuid },
    /// A local timer fired.
    Timer(TimerToken),
    /// The authority returned the terminal result.
    Concluded(DuelView),
    /// An authority call failed for good.
    AuthorityFailed(String),
    /// The local player conceded.
    Forfeit,
}

/// Side effect requested by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish the local presence to the room.
    Track(PresenceUpdate),
    /// Send an event to the other room members.
    Broadcast(RoomEvent),
    /// Replace the active timer.
    Arm { token: TimerToken, after: Duration },
    /// Cancel the active timer.
    Disarm,
    /// Record the local answer with the authority.
    SubmitAnswer {
        /// Position in the frozen question list.
        question_index: u32,
        /// Option picked by the local player.
        option_id: Uuid,
    },
    /// Ask the authority to finish the duel with the locally known scores.
    CallFinish(FinishRequest),
    /// Ask the authority to record the local player's concession.
    CallForfeit,
}

/// Snapshot published to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub phase: Phase,
    pub question_index: Option<u32>,
    pub question: Option<QuestionPayload>,
    pub selected_option: Option<Uuid>,
    /// Correct option, only while the result of a question is shown.
    pub revealed_option: Option<Uuid>,
    /// Locally accumulated score; informative only.
    pub local_score: u32,
    /// Authoritative outcome.
    pub result: Option<DuelView>,
    pub error: Option<String>,
}

struct Setup {
    questions: Vec<QuestionPayload>,
    humans: Vec<Uuid>,
    challenger_id: Uuid,
    timing: TimingPayload,
}

/// Client state machine of one participant.
pub struct DuelSession {
    user_id: Uuid,
    phase: Phase,
    setup: Option<Setup>,
    index: u32,
    generation: u64,
    answered: HashMap<u32, HashSet<Uuid>>,
    picks: HashMap<u32, Uuid>,
    correct: u32,
    peers: Vec<Presence>,
    result: Option<DuelView>,
    end_announced: bool,
    concluding: bool,
    error: Option<String>,
}

impl DuelSession {
    /// Fresh session of `user_id`, waiting for the `start` response.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            phase: Phase::Loading,
            setup: None,
            index: 0,
            generation: 0,
            answered: HashMap::new(),
            picks: HashMap::new(),
            correct: 0,
            peers: Vec::new(),
            result: None,
            end_announced: false,
            concluding: false,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> Option<&DuelView> {
        self.result.as_ref()
    }

    /// Finished and holding the authoritative result.
    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Finished && self.result.is_some()
    }

    /// Feed one input and collect the resulting effects.
    pub fn handle(&mut self, input: SessionInput) -> Vec<Effect> {
        let mut fx = Vec::new();
        match input {
            SessionInput::Started(response) => self.on_started(response, &mut fx),
            SessionInput::Peers(peers) => {
                self.peers = peers;
                self.on_peers(&mut fx);
            }
            SessionInput::Room { from, event } => self.on_room_event(from, event, &mut fx),
            SessionInput::Answer { option_id } => self.on_answer(option_id, &mut fx),
            SessionInput::Timer(token) => self.on_timer(token, &mut fx),
            SessionInput::Concluded(view) => self.on_concluded(view, &mut fx),
            SessionInput::AuthorityFailed(message) => self.error = Some(message),
            SessionInput::Forfeit => self.on_forfeit(&mut fx),
        }
        fx
    }

    pub fn view(&self) -> SessionView {
        let on_question = matches!(self.phase, Phase::Playing | Phase::QuestionResult);
        let question = on_question.then(|| self.question(self.index).cloned()).flatten();
        SessionView {
            phase: self.phase,
            question_index: on_question.then_some(self.index),
            revealed_option: (self.phase == Phase::QuestionResult)
                .then(|| question.as_ref().map(|q| q.correct_option_id))
                .flatten(),
            question,
            selected_option: on_question
                .then(|| self.picks.get(&self.index).copied())
                .flatten(),
            local_score: self.local_score(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn on_started(&mut self, response: StartResponse, fx: &mut Vec<Effect>) {
        if self.phase != Phase::Loading {
            return;
        }
        let facing_bot = response
            .participants
            .iter()
            .any(|p| p.user_id != self.user_id && p.is_bot);
        let humans = response
            .participants
            .iter()
            .filter(|p| !p.is_bot)
            .map(|p| p.user_id)
            .collect();
        let no_questions = response.questions.is_empty();
        self.setup = Some(Setup {
            questions: response.questions,
            humans,
            challenger_id: response.duel.challenger_id,
            timing: response.timing,
        });

        if no_questions {
            self.conclude(fx);
            return;
        }
        if facing_bot {
            self.enter_countdown(fx);
            fx.push(Effect::Track(self.presence()));
            return;
        }
        self.enter(Phase::Waiting);
        fx.push(Effect::Track(self.presence()));
        self.maybe_start_game(fx);
    }

    fn on_peers(&mut self, fx: &mut Vec<Effect>) {
        match self.phase {
            Phase::Waiting => self.maybe_start_game(fx),
            Phase::Playing => {
                let index = self.index;
                let done: Vec<Uuid> = self
                    .peers
                    .iter()
                    .filter(|p| p.state.question_index == Some(index) && p.state.has_answered)
                    .map(|p| p.user_id)
                    .collect();
                self.answered.entry(index).or_default().extend(done);
                self.check_all_answered(fx);
            }
            _ => {}
        }
    }

    fn on_room_event(&mut self, from: Uuid, event: RoomEvent, fx: &mut Vec<Effect>) {
        match event {
            RoomEvent::GameStart => {
                if self.phase == Phase::Waiting {
                    self.enter_countdown(fx);
                }
            }
            RoomEvent::QuestionReveal { index } => {
                if self.question(index).is_none() {
                    return;
                }
                match self.phase {
                    Phase::Waiting | Phase::Countdown => self.show_question(index, fx),
                    Phase::Playing if index == self.index => {
                        self.generation += 1;
                        self.arm(TimerKind::Question, fx);
                    }
                    Phase::Playing | Phase::QuestionResult if index > self.index => {
                        self.show_question(index, fx)
                    }
                    _ => {}
                }
            }
            RoomEvent::PlayerAnswered { user_id, index } => {
                if user_id != from {
                    return;
                }
                self.answered.entry(index).or_default().insert(user_id);
                if self.phase == Phase::Playing && index == self.index {
                    self.check_all_answered(fx);
                }
            }
            RoomEvent::AnswerReveal { index, .. } | RoomEvent::TimeUp { index } => {
                if self.phase == Phase::Playing && index == self.index {
                    self.enter_result(fx);
                }
            }
            RoomEvent::GameEnd { .. } => {
                self.end_announced = true;
                self.conclude(fx);
            }
        }
    }

    fn on_answer(&mut self, option_id: Uuid, fx: &mut Vec<Effect>) {
        if self.phase != Phase::Playing || self.picks.contains_key(&self.index) {
            return;
        }
        let Some(question) = self.question(self.index) else {
            return;
        };
        if !question.options.iter().any(|option| option.id == option_id) {
            return;
        }
        let correct = question.correct_option_id == option_id;

        let index = self.index;
        self.picks.insert(index, option_id);
        if correct {
            self.correct += 1;
        }
        self.answered.entry(index).or_default().insert(self.user_id);

        fx.push(Effect::Track(self.presence()));
        fx.push(Effect::Broadcast(RoomEvent::PlayerAnswered {
            user_id: self.user_id,
            index,
        }));
        fx.push(Effect::SubmitAnswer {
            question_index: index,
            option_id,
        });
        self.check_all_answered(fx);
    }

    fn on_timer(&mut self, token: TimerToken, fx: &mut Vec<Effect>) {
        if token.generation != self.generation {
            return;
        }
        match (token.kind, self.phase) {
            (TimerKind::Countdown, Phase::Countdown) => self.show_question(0, fx),
            (TimerKind::Question, Phase::Playing) => {
                fx.push(Effect::Broadcast(RoomEvent::TimeUp { index: self.index }));
                self.enter_result(fx);
            }
            (TimerKind::Reveal, Phase::QuestionResult) => {
                let next = self.index + 1;
                if self.question(next).is_some() {
                    self.show_question(next, fx);
                } else {
                    self.conclude(fx);
                }
            }
            _ => {}
        }
    }

    fn on_concluded(&mut self, view: DuelView, fx: &mut Vec<Effect>) {
        if self.phase != Phase::Finished {
            self.enter(Phase::Finished);
            fx.push(Effect::Disarm);
        }
        self.concluding = true;
        if !self.end_announced {
            self.end_announced = true;
            fx.push(Effect::Broadcast(RoomEvent::GameEnd {
                winner_id: view.winner_id,
                scores: ScorePair {
                    challenger_score: view.challenger_score,
                    opponent_score: view.opponent_score,
                },
            }));
        }
        self.result = Some(view);
    }

    fn on_forfeit(&mut self, fx: &mut Vec<Effect>) {
        if self.phase == Phase::Loading || self.concluding {
            return;
        }
        self.concluding = true;
        self.enter(Phase::Finished);
        fx.push(Effect::Disarm);
        fx.push(Effect::CallForfeit);
    }

    fn maybe_start_game(&mut self, fx: &mut Vec<Effect>) {
        if self.phase == Phase::Waiting && self.others_ready() {
            fx.push(Effect::Broadcast(RoomEvent::GameStart));
            self.enter_countdown(fx);
        }
    }

    fn others_ready(&self) -> bool {
        let Some(setup) = &self.setup else {
            return false;
        };
        setup
            .humans
            .iter()
            .filter(|&&human| human != self.user_id)
            .all(|&human| {
                self.peers
                    .iter()
                    .any(|peer| peer.user_id == human && peer.state.ready)
            })
    }

    fn check_all_answered(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != Phase::Playing {
            return;
        }
        let Some(setup) = &self.setup else {
            return;
        };
        let Some(answered) = self.answered.get(&self.index) else {
            return;
        };
        if !setup.humans.iter().all(|human| answered.contains(human)) {
            return;
        }
        let Some(correct_option_id) = self.question(self.index).map(|q| q.correct_option_id)
        else {
            return;
        };
        fx.push(Effect::Broadcast(RoomEvent::AnswerReveal {
            index: self.index,
            correct_option_id,
        }));
        self.enter_result(fx);
    }

    fn show_question(&mut self, index: u32, fx: &mut Vec<Effect>) {
        self.enter(Phase::Playing);
        self.index = index;
        fx.push(Effect::Track(self.presence()));
        fx.push(Effect::Broadcast(RoomEvent::QuestionReveal { index }));
        self.arm(TimerKind::Question, fx);
        self.check_all_answered(fx);
    }

    fn enter_countdown(&mut self, fx: &mut Vec<Effect>) {
        self.enter(Phase::Countdown);
        self.arm(TimerKind::Countdown, fx);
    }

    fn enter_result(&mut self, fx: &mut Vec<Effect>) {
        self.enter(Phase::QuestionResult);
        self.arm(TimerKind::Reveal, fx);
    }

    fn conclude(&mut self, fx: &mut Vec<Effect>) {
        if self.concluding {
            return;
        }
        self.concluding = true;
        self.enter(Phase::Finished);
        fx.push(Effect::Disarm);
        fx.push(Effect::CallFinish(self.reported_scores()));
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.generation += 1;
    }

    fn arm(&self, kind: TimerKind, fx: &mut Vec<Effect>) {
        let Some(setup) = &self.setup else {
            return;
        };
        let millis = match kind {
            TimerKind::Countdown => setup.timing.countdown_ms,
            TimerKind::Question => setup.timing.question_time_ms,
            TimerKind::Reveal => setup.timing.reveal_dwell_ms,
        };
        fx.push(Effect::Arm {
            token: TimerToken {
                kind,
                generation: self.generation,
            },
            after: Duration::from_millis(millis),
        });
    }

    fn presence(&self) -> PresenceUpdate {
        let on_question = matches!(self.phase, Phase::Playing | Phase::QuestionResult);
        PresenceUpdate {
            ready: self.phase != Phase::Loading,
            question_index: on_question.then_some(self.index),
            has_answered: on_question && self.picks.contains_key(&self.index),
        }
    }

    fn question(&self, index: u32) -> Option<&QuestionPayload> {
        let setup = self.setup.as_ref()?;
        setup.questions.get(usize::try_from(index).ok()?)
    }

    fn local_score(&self) -> u32 {
        let points = self
            .setup
            .as_ref()
            .map(|setup| setup.timing.points_per_correct)
            .unwrap_or_default();
        self.correct.saturating_mul(points)
    }

    fn reported_scores(&self) -> FinishRequest {
        let mine = Some(self.local_score());
        match &self.setup {
            Some(setup) if setup.challenger_id == self.user_id => FinishRequest {
                challenger_score: mine,
                opponent_score: None,
            },
            Some(_) => FinishRequest {
                challenger_score: None,
                opponent_score: mine,
            },
            None => FinishRequest::default(),
        }
    }
}
