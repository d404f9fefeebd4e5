use std::collections::HashMap;

use tryout_core::model::{
    Answer, Attempt, AttemptError, Question, QuestionId, Section,
};

use crate::error::TryoutError;

/// Identifies one arming of the section countdown.
///
/// Every entry into a section bumps the epoch; ticks and advance requests
/// carry the epoch they were issued under, so anything that arrives after the
/// machine has moved on is recognisably stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerEpoch(u64);

#[cfg(test)]
impl TimerEpoch {
    pub(crate) fn from_raw_for_tests(raw: u64) -> Self {
        Self(raw)
    }
}

/// Result of feeding one countdown tick to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belonged to an earlier section or the machine is done.
    Stale,
    /// Still counting down; the remaining seconds after this tick.
    Running(u32),
    /// The countdown just hit zero. Reported exactly once per section.
    Expired,
}

/// What the next transition out of the current section is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceTarget {
    /// Load this section's questions and keep going.
    NextSection(Section),
    /// The current section was the last one; complete the attempt.
    Finish,
}

/// In-memory state of one learner's run through a package.
///
/// The machine is pure and synchronous: it owns the session state exclusively
/// and never performs IO. Loading questions and persisting answers happen in
/// the flow layer around it, which is also what makes the advance protocol
/// two-phase: `begin_advance` claims the transition, then either
/// `enter_section` / `finish` commits it or `abort_advance` releases the claim
/// after a failed load.
#[derive(Debug)]
pub struct TryoutMachine {
    attempt: Attempt,
    sections: Vec<Section>,
    section_index: usize,
    questions: Vec<Question>,
    question_index: usize,
    remaining_secs: u32,
    answers: HashMap<QuestionId, Answer>,
    epoch: u64,
    expired: bool,
    advancing: bool,
    completed: bool,
}

impl TryoutMachine {
    /// Builds the machine positioned at the first question of the first
    /// section, countdown armed at the section's full duration.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::NoSections` / `TryoutError::NoQuestions` for
    /// empty inputs.
    pub fn new(
        attempt: Attempt,
        sections: Vec<Section>,
        first_questions: Vec<Question>,
    ) -> Result<Self, TryoutError> {
        let Some(first) = sections.first() else {
            return Err(TryoutError::NoSections);
        };
        if first_questions.is_empty() {
            return Err(TryoutError::NoQuestions);
        }
        let remaining_secs = first.duration_secs();
        Ok(Self {
            attempt,
            sections,
            section_index: 0,
            questions: first_questions,
            question_index: 0,
            remaining_secs,
            answers: HashMap::new(),
            epoch: 1,
            expired: false,
            advancing: false,
            completed: false,
        })
    }

    //
    // ─── READ SIDE ─────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn section_index(&self) -> usize {
        self.section_index
    }

    #[must_use]
    pub fn current_section(&self) -> Option<&Section> {
        if self.completed {
            None
        } else {
            self.sections.get(self.section_index)
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.completed {
            None
        } else {
            self.questions.get(self.question_index)
        }
    }

    /// True when the learner is looking at the last question of the section.
    #[must_use]
    pub fn on_last_question(&self) -> bool {
        !self.completed && self.question_index + 1 == self.questions.len()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn epoch(&self) -> TimerEpoch {
        TimerEpoch(self.epoch)
    }

    #[must_use]
    pub fn answer_for(&self, question_id: QuestionId) -> Option<&Answer> {
        self.answers.get(&question_id)
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────
    //

    /// Jump to a question by index. Out-of-range requests and calls outside a
    /// section are ignored, never fatal.
    pub fn go_to(&mut self, question_index: usize) {
        if self.completed || question_index >= self.questions.len() {
            return;
        }
        self.question_index = question_index;
    }

    /// Move to the next question, clamped at the section boundary.
    pub fn next(&mut self) {
        if self.question_index + 1 < self.questions.len() {
            self.go_to(self.question_index + 1);
        }
    }

    /// Move to the previous question, clamped at the section start.
    pub fn previous(&mut self) {
        if let Some(prev) = self.question_index.checked_sub(1) {
            self.go_to(prev);
        }
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────
    //

    /// Overwrites the current question's answer text, preserving the flag.
    ///
    /// Returns the updated record for persistence, or `None` outside a
    /// section. Navigation state is untouched.
    pub fn set_answer(&mut self, text: impl Into<String>) -> Option<Answer> {
        let question_id = self.current_question()?.id();
        let attempt_id = self.attempt.id();
        let answer = self
            .answers
            .entry(question_id)
            .or_insert_with(|| Answer::blank(attempt_id, question_id));
        answer.set_text(text);
        Some(answer.clone())
    }

    /// Flips the current question's flag, preserving the answer text.
    ///
    /// Returns the updated record for persistence, or `None` outside a
    /// section.
    pub fn toggle_flag(&mut self) -> Option<Answer> {
        let question_id = self.current_question()?.id();
        let attempt_id = self.attempt.id();
        let answer = self
            .answers
            .entry(question_id)
            .or_insert_with(|| Answer::blank(attempt_id, question_id));
        answer.toggle_flag();
        Some(answer.clone())
    }

    //
    // ─── COUNTDOWN ─────────────────────────────────────────────────────────
    //

    /// Applies one countdown tick issued under `epoch`.
    ///
    /// Expiry is reported exactly once; later ticks of the same epoch are
    /// stale, as is anything from a previous section.
    pub fn tick(&mut self, epoch: TimerEpoch) -> TickOutcome {
        if self.completed || epoch.0 != self.epoch || self.expired {
            return TickOutcome::Stale;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.expired = true;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining_secs)
        }
    }

    //
    // ─── SECTION TRANSITIONS ───────────────────────────────────────────────
    //

    /// Claims the transition out of the current section.
    ///
    /// Returns `None` when the request is stale (wrong epoch), the machine is
    /// already done, or another advance is in flight: the first caller out of
    /// a section is authoritative and every later request is a no-op.
    pub fn begin_advance(&mut self, epoch: TimerEpoch) -> Option<AdvanceTarget> {
        if self.completed || self.advancing || epoch.0 != self.epoch {
            return None;
        }
        self.advancing = true;
        match self.sections.get(self.section_index + 1) {
            Some(next) => Some(AdvanceTarget::NextSection(next.clone())),
            None => Some(AdvanceTarget::Finish),
        }
    }

    /// Releases a claimed advance after a failed load so it can be retried.
    pub fn abort_advance(&mut self) {
        self.advancing = false;
    }

    /// Commits a claimed advance into the next section.
    ///
    /// Resets the question cursor, re-arms the countdown at the new section's
    /// duration, and bumps the epoch so ticks from the old section die stale.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::NoQuestions` when the loaded list is empty; the
    /// claim stays held so the caller decides between retry and abort.
    pub fn enter_section(&mut self, questions: Vec<Question>) -> Result<TimerEpoch, TryoutError> {
        if questions.is_empty() {
            return Err(TryoutError::NoQuestions);
        }
        self.section_index += 1;
        self.questions = questions;
        self.question_index = 0;
        self.remaining_secs = self.sections[self.section_index].duration_secs();
        self.epoch += 1;
        self.expired = false;
        self.advancing = false;
        Ok(TimerEpoch(self.epoch))
    }

    /// Commits a claimed advance off the last section: the attempt is marked
    /// completed and the machine leaves `InSection` for good.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the attempt is not in progress.
    pub fn finish(&mut self) -> Result<(), AttemptError> {
        self.attempt.complete()?;
        self.completed = true;
        self.epoch += 1;
        self.expired = false;
        self.advancing = false;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
