//! Grading reducer for completed attempts.
//!
//! The denominator is the number of *answered* questions: an unanswered
//! question is excluded rather than counted as wrong, matching the portal's
//! established scoring behavior. An attempt with no answers scores 0 instead
//! of dividing by zero.

use crate::model::{Answer, MAX_SCORE, Question};

/// Tally of one attempt's graded answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreSummary {
    answered: u32,
    correct: u32,
}

impl ScoreSummary {
    #[must_use]
    pub fn answered(&self) -> u32 {
        self.answered
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    /// Final score on the 0–1000 scale: `round(correct / answered × 1000)`,
    /// or 0 when nothing was answered.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn final_score(&self) -> u16 {
        if self.answered == 0 {
            return 0;
        }
        let ratio = f64::from(self.correct) / f64::from(self.answered);
        (ratio * f64::from(MAX_SCORE)).round() as u16
    }
}

/// Grades each answer against its question and accumulates the tally.
///
/// Answers with no recorded text are skipped entirely; they contribute to
/// neither numerator nor denominator.
pub fn grade<'a>(pairs: impl IntoIterator<Item = (&'a Answer, &'a Question)>) -> ScoreSummary {
    let mut summary = ScoreSummary::default();
    for (answer, question) in pairs {
        let Some(text) = answer.text() else {
            continue;
        };
        summary.answered += 1;
        if question.is_correct(text) {
            summary.correct += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttemptId, QuestionId, SectionId};
    use crate::time::fixed_now;
    use std::collections::BTreeMap;

    fn mc_question(id: u64, correct: &str) -> Question {
        let options = BTreeMap::from([
            ("A".to_string(), "first".to_string()),
            ("B".to_string(), "second".to_string()),
        ]);
        Question::multiple_choice(
            QuestionId::new(id),
            SectionId::new(1),
            "pick one",
            options,
            correct,
            fixed_now(),
        )
        .unwrap()
    }

    fn answered(question: &Question, text: &str) -> Answer {
        let mut answer = Answer::blank(AttemptId::new(1), question.id());
        answer.set_text(text);
        answer
    }

    #[test]
    fn all_correct_scores_full_scale() {
        let q1 = mc_question(1, "A");
        let q2 = mc_question(2, "B");
        let a1 = answered(&q1, "A");
        let a2 = answered(&q2, "B");

        let summary = grade([(&a1, &q1), (&a2, &q2)]);
        assert_eq!(summary.final_score(), 1000);
    }

    #[test]
    fn half_correct_scores_half_scale() {
        let q1 = mc_question(1, "A");
        let q2 = mc_question(2, "B");
        let a1 = answered(&q1, "A");
        let a2 = answered(&q2, "A");

        let summary = grade([(&a1, &q1), (&a2, &q2)]);
        assert_eq!(summary.final_score(), 500);
    }

    #[test]
    fn unanswered_questions_leave_the_denominator() {
        let q1 = mc_question(1, "A");
        let q2 = mc_question(2, "B");
        let a1 = answered(&q1, "A");
        let a2 = Answer::blank(AttemptId::new(1), q2.id());

        let summary = grade([(&a1, &q1), (&a2, &q2)]);
        assert_eq!(summary.answered(), 1);
        assert_eq!(summary.final_score(), 1000);
    }

    #[test]
    fn no_answers_scores_zero_not_nan() {
        let summary = grade(std::iter::empty::<(&Answer, &Question)>());
        assert_eq!(summary.final_score(), 0);
    }

    #[test]
    fn one_of_three_rounds_to_nearest() {
        let q1 = mc_question(1, "A");
        let q2 = mc_question(2, "B");
        let q3 = mc_question(3, "B");
        let a1 = answered(&q1, "A");
        let a2 = answered(&q2, "A");
        let a3 = answered(&q3, "A");

        let summary = grade([(&a1, &q1), (&a2, &q2), (&a3, &q3)]);
        // 1/3 * 1000 = 333.33..., rounds down.
        assert_eq!(summary.final_score(), 333);
    }
}
