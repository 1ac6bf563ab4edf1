//! Authoritative score recomputation from persisted answer rows.

use uuid::Uuid;

use crate::dao::models::DuelAnswerEntity;

/// Answer rows of one participant, reduced to what scoring needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerTally {
    /// Rows inside the frozen question list.
    pub rows: u32,
    /// Rows judged correct.
    pub correct: u32,
}

/// Count the rows and correct rows `user_id` has for questions inside the frozen list.
pub fn tally(answers: &[DuelAnswerEntity], user_id: Uuid, question_count: usize) -> AnswerTally {
    answers
        .iter()
        .filter(|answer| answer.user_id == user_id)
        .filter(|answer| usize::try_from(answer.question_index).is_ok_and(|i| i < question_count))
        .fold(AnswerTally::default(), |mut tally, answer| {
            tally.rows += 1;
            if answer.correct {
                tally.correct += 1;
            }
            tally
        })
}

/// Final score of a participant who did not forfeit.
///
/// Rows win whenever the participant has at least one. Without rows the reported figure is
/// used, clamped to the reachable range and rounded down to a whole number of answers.
pub fn participant_score(
    answers: &[DuelAnswerEntity],
    user_id: Uuid,
    reported: Option<u32>,
    question_count: usize,
    points_per_correct: u32,
) -> u32 {
    let tally = tally(answers, user_id, question_count);
    if tally.rows > 0 {
        return tally.correct.saturating_mul(points_per_correct);
    }

    let Some(reported) = reported else {
        return 0;
    };
    if points_per_correct == 0 {
        return 0;
    }
    let questions = u32::try_from(question_count).unwrap_or(u32::MAX);
    let ceiling = questions.saturating_mul(points_per_correct);
    let clamped = reported.min(ceiling);
    clamped - clamped % points_per_correct
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn row(user_id: Uuid, question_index: u32, correct: bool) -> DuelAnswerEntity {
        DuelAnswerEntity {
            duel_id: Uuid::nil(),
            user_id,
            question_index,
            question_id: Uuid::new_v4(),
            option_id: Uuid::new_v4(),
            correct,
            answered_at: SystemTime::now(),
        }
    }

    #[test]
    fn rows_override_reported_scores() {
        let user = Uuid::new_v4();
        let answers = vec![
            row(user, 0, true),
            row(user, 1, false),
            row(user, 2, true),
            row(user, 3, true),
        ];
        assert_eq!(participant_score(&answers, user, Some(500), 5, 100), 300);
        assert_eq!(participant_score(&answers, user, None, 5, 100), 300);
    }

    #[test]
    fn other_users_rows_are_ignored() {
        let (user, other) = (Uuid::new_v4(), Uuid::new_v4());
        let answers = vec![row(other, 0, true), row(other, 1, true)];
        assert_eq!(
            tally(&answers, user, 5),
            AnswerTally {
                rows: 0,
                correct: 0
            }
        );
    }

    #[test]
    fn out_of_range_rows_do_not_count() {
        let user = Uuid::new_v4();
        let answers = vec![row(user, 0, true), row(user, 7, true)];
        assert_eq!(participant_score(&answers, user, None, 5, 100), 100);
    }

    #[test]
    fn reported_fallback_is_clamped_and_floored() {
        let user = Uuid::new_v4();
        assert_eq!(participant_score(&[], user, Some(250), 5, 100), 200);
        assert_eq!(participant_score(&[], user, Some(9_999), 5, 100), 500);
        assert_eq!(participant_score(&[], user, None, 5, 100), 0);
    }

    #[test]
    fn all_wrong_answers_score_zero_even_if_reported_high() {
        let user = Uuid::new_v4();
        let answers = vec![row(user, 0, false)];
        assert_eq!(participant_score(&answers, user, Some(500), 5, 100), 0);
    }
}
