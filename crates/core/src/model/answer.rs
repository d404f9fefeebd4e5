use crate::model::ids::{AttemptId, QuestionId};

/// A learner's recorded response to one question within an attempt.
///
/// There is at most one answer per (attempt, question) pair; storage upserts
/// replace on conflict rather than ever inserting a second row. Text and flag
/// are independent: updating one must preserve the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    attempt_id: AttemptId,
    question_id: QuestionId,
    text: Option<String>,
    flagged: bool,
}

impl Answer {
    /// A blank answer: no text yet, not flagged.
    #[must_use]
    pub fn blank(attempt_id: AttemptId, question_id: QuestionId) -> Self {
        Self {
            attempt_id,
            question_id,
            text: None,
            flagged: false,
        }
    }

    /// Rehydrate an answer from persisted storage.
    #[must_use]
    pub fn from_persisted(
        attempt_id: AttemptId,
        question_id: QuestionId,
        text: Option<String>,
        flagged: bool,
    ) -> Self {
        Self {
            attempt_id,
            question_id,
            text,
            flagged,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    /// True once the learner has responded at least once.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.text.is_some()
    }

    /// Overwrites the response text, preserving the flag.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// Flips the review flag, preserving the text.
    pub fn toggle_flag(&mut self) {
        self.flagged = !self.flagged;
    }
}
