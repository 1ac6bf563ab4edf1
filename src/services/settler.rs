//! Builds the settlement applied atomically with the terminal write of a duel.

use std::time::SystemTime;

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        duel_store::{Finalization, ParticipantSettlement},
        models::{ActivityEntity, ActivityKind, DuelEntity, UserEntity},
    },
};

/// How the duel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// All questions were exhausted.
    Completed,
    /// `by` conceded while the duel was in progress.
    Forfeited { by: Uuid },
}

/// Final scores, in participant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoreboard {
    /// Score of the duel's challenger.
    pub challenger: u32,
    /// Score of the challenged player.
    pub opponent: u32,
}

/// ISO-8601 week bucket (`YYYY-Www`) of `at`, in UTC.
pub fn iso_week(at: SystemTime) -> String {
    let (year, week, _) = OffsetDateTime::from(at).to_iso_week_date();
    format!("{year:04}-W{week:02}")
}

/// Winner implied by the scoreboard and termination; `None` is a draw.
pub fn winner_of(duel: &DuelEntity, scores: Scoreboard, termination: Termination) -> Option<Uuid> {
    match termination {
        Termination::Forfeited { by } => duel.other_participant(by),
        Termination::Completed => match scores.challenger.cmp(&scores.opponent) {
            std::cmp::Ordering::Greater => Some(duel.challenger_id),
            std::cmp::Ordering::Less => Some(duel.opponent_id),
            std::cmp::Ordering::Equal => None,
        },
    }
}

/// Compute every effect of finishing `duel`.
///
/// Only participants with a known, non-bot user record are settled.
pub fn settle(
    duel: &DuelEntity,
    scores: Scoreboard,
    termination: Termination,
    users: &[UserEntity],
    config: &AppConfig,
    finished_at: SystemTime,
) -> Finalization {
    let winner_id = winner_of(duel, scores, termination);
    let forfeited_by = match termination {
        Termination::Forfeited { by } => Some(by),
        Termination::Completed => None,
    };
    let week = iso_week(finished_at);

    let seats = [
        (duel.challenger_id, duel.opponent_id, scores.challenger),
        (duel.opponent_id, duel.challenger_id, scores.opponent),
    ];

    let participants = seats
        .into_iter()
        .filter_map(|(user_id, opponent_id, score)| {
            let Some(user) = users.iter().find(|user| user.id == user_id) else {
                warn!(duel_id = %duel.id, user_id = %user_id, "no user record; skipping settlement");
                return None;
            };
            if user.is_bot {
                debug!(duel_id = %duel.id, user_id = %user_id, "bot participant excluded from settlement");
                return None;
            }

            let won = winner_id == Some(user_id);
            let kind = match winner_id {
                None => ActivityKind::DuelDrawn,
                Some(_) if won => ActivityKind::DuelWon,
                Some(_) => ActivityKind::DuelLost,
            };
            let xp = if won {
                duel.xp_reward
            } else if forfeited_by == Some(user_id) {
                0
            } else {
                config.participation_xp()
            };

            Some(ParticipantSettlement {
                user_id,
                score,
                won,
                xp,
                week: week.clone(),
                activity: ActivityEntity {
                    id: Uuid::new_v4(),
                    user_id,
                    kind,
                    duel_id: duel.id,
                    opponent_id,
                    score,
                    forfeit: forfeited_by.is_some(),
                    created_at: finished_at,
                },
            })
        })
        .collect();

    Finalization {
        duel_id: duel.id,
        challenger_score: scores.challenger,
        opponent_score: scores.opponent,
        winner_id,
        forfeited_by,
        finished_at,
        participants,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::dao::models::DuelStatus;

    fn fixture() -> (DuelEntity, UserEntity, UserEntity) {
        let challenger = UserEntity::human("ada");
        let opponent = UserEntity::human("grace");
        let mut duel = DuelEntity::accepted(Uuid::new_v4(), challenger.id, opponent.id, 50);
        duel.status = DuelStatus::InProgress;
        (duel, challenger, opponent)
    }

    #[test]
    fn iso_week_uses_iso_year() {
        // 2021-01-03 is a Sunday belonging to 2020-W53.
        let sunday = UNIX_EPOCH + Duration::from_secs(1_609_632_000);
        assert_eq!(iso_week(sunday), "2020-W53");
        // 2026-10-19 is a Monday in week 43.
        let monday = UNIX_EPOCH + Duration::from_secs(1_792_368_000);
        assert_eq!(iso_week(monday), "2026-W43");
    }

    #[test]
    fn natural_win_rewards_winner_and_participation() {
        let (duel, challenger, opponent) = fixture();
        let finalization = settle(
            &duel,
            Scoreboard {
                challenger: 300,
                opponent: 100,
            },
            Termination::Completed,
            &[challenger.clone(), opponent.clone()],
            &AppConfig::default(),
            SystemTime::now(),
        );

        assert_eq!(finalization.winner_id, Some(challenger.id));
        assert_eq!(finalization.forfeited_by, None);
        let winner = &finalization.participants[0];
        let loser = &finalization.participants[1];
        assert!(winner.won);
        assert_eq!(winner.xp, 50);
        assert_eq!(winner.activity.kind, ActivityKind::DuelWon);
        assert!(!loser.won);
        assert_eq!(loser.xp, 10);
        assert_eq!(loser.activity.kind, ActivityKind::DuelLost);
        assert!(!loser.activity.forfeit);
    }

    #[test]
    fn draw_grants_participation_to_both() {
        let (duel, challenger, opponent) = fixture();
        let finalization = settle(
            &duel,
            Scoreboard {
                challenger: 500,
                opponent: 500,
            },
            Termination::Completed,
            &[challenger, opponent],
            &AppConfig::default(),
            SystemTime::now(),
        );

        assert_eq!(finalization.winner_id, None);
        for participant in &finalization.participants {
            assert_eq!(participant.xp, 10);
            assert!(!participant.won);
            assert_eq!(participant.activity.kind, ActivityKind::DuelDrawn);
        }
    }

    #[test]
    fn forfeit_denies_reward_even_with_higher_score() {
        let (duel, challenger, opponent) = fixture();
        let finalization = settle(
            &duel,
            Scoreboard {
                challenger: 0,
                opponent: 0,
            },
            Termination::Forfeited { by: challenger.id },
            &[challenger.clone(), opponent.clone()],
            &AppConfig::default(),
            SystemTime::now(),
        );

        assert_eq!(finalization.winner_id, Some(opponent.id));
        assert_eq!(finalization.forfeited_by, Some(challenger.id));
        let forfeiter = &finalization.participants[0];
        let winner = &finalization.participants[1];
        assert_eq!(forfeiter.xp, 0);
        assert!(forfeiter.activity.forfeit);
        assert_eq!(winner.xp, duel.xp_reward);
        assert!(winner.activity.forfeit);
    }

    #[test]
    fn bots_and_unknown_users_are_not_settled() {
        let human = UserEntity::human("ada");
        let bot = UserEntity::bot("quizbot");
        let mut duel = DuelEntity::accepted(Uuid::new_v4(), human.id, bot.id, 50);
        duel.status = DuelStatus::InProgress;

        let finalization = settle(
            &duel,
            Scoreboard {
                challenger: 100,
                opponent: 400,
            },
            Termination::Completed,
            &[human.clone(), bot.clone()],
            &AppConfig::default(),
            SystemTime::now(),
        );
        assert_eq!(finalization.winner_id, Some(bot.id));
        assert_eq!(finalization.participants.len(), 1);
        assert_eq!(finalization.participants[0].user_id, human.id);
        assert_eq!(finalization.participants[0].activity.opponent_id, bot.id);

        let finalization = settle(
            &duel,
            Scoreboard {
                challenger: 100,
                opponent: 400,
            },
            Termination::Completed,
            &[],
            &AppConfig::default(),
            SystemTime::now(),
        );
        assert!(finalization.participants.is_empty());
    }
}
