use tokio::sync::mpsc;

use tryout_core::model::SessionId;

use crate::auth::AuthSession;
use crate::error::TryoutError;
use super::flow::{AdvanceOutcome, TryoutFlow};
use super::machine::{TickOutcome, TimerEpoch, TryoutMachine};
use super::progress::TryoutProgress;
use super::timer::{SectionTimer, TimerEvent};

/// What changed after the runner processed an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerUpdate {
    /// Nothing visible changed (stale tick, ignored request).
    None,
    /// The countdown moved; seconds left in the section.
    Countdown(u32),
    /// A new section began at this index.
    EnteredSection(usize),
    /// The attempt is completed; time to navigate away.
    Completed,
}

/// Owns the live tryout: machine, flow, and the one countdown timer.
///
/// All inputs (learner actions and timer events) funnel through `&mut self`
/// methods, so state changes are serialized exactly like the single UI task
/// queue this replaces. The timer handle is cancelled before every transition
/// out of a section and re-armed under the new epoch afterwards.
pub struct TryoutRunner {
    flow: TryoutFlow,
    machine: TryoutMachine,
    timer: Option<SectionTimer>,
    events_tx: mpsc::UnboundedSender<TimerEvent>,
    events_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl TryoutRunner {
    /// Starts the tryout and arms the first section's countdown.
    ///
    /// # Errors
    ///
    /// Propagates every [`TryoutFlow::start`] error.
    pub async fn start(
        flow: TryoutFlow,
        auth: &AuthSession,
        session_id: SessionId,
    ) -> Result<Self, TryoutError> {
        let machine = flow.start(auth, session_id).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut runner = Self {
            flow,
            machine,
            timer: None,
            events_tx,
            events_rx,
        };
        runner.arm_timer();
        Ok(runner)
    }

    #[must_use]
    pub fn machine(&self) -> &TryoutMachine {
        &self.machine
    }

    #[must_use]
    pub fn progress(&self) -> TryoutProgress {
        TryoutProgress::of(&self.machine)
    }

    /// Await the next countdown event. `None` once the attempt is completed.
    pub async fn next_event(&mut self) -> Option<TimerEvent> {
        if self.machine.is_complete() {
            return None;
        }
        self.events_rx.recv().await
    }

    /// Apply one countdown event: ticks the machine, auto-advancing when the
    /// section expires. Stale events are dropped here.
    ///
    /// # Errors
    ///
    /// Propagates advance failures; the section can be advanced again.
    pub async fn handle_event(&mut self, event: TimerEvent) -> Result<RunnerUpdate, TryoutError> {
        match self.machine.tick(event.epoch) {
            TickOutcome::Stale => Ok(RunnerUpdate::None),
            TickOutcome::Running(remaining) => Ok(RunnerUpdate::Countdown(remaining)),
            TickOutcome::Expired => self.advance(event.epoch).await,
        }
    }

    /// Learner-initiated completion of the current section (the "next
    /// subtest" / "finish tryout" action on the last question).
    ///
    /// # Errors
    ///
    /// Propagates advance failures; the section can be advanced again.
    pub async fn complete_section(&mut self) -> Result<RunnerUpdate, TryoutError> {
        let epoch = self.machine.epoch();
        self.advance(epoch).await
    }

    /// Records an answer for the current question (write-through, non-fatal
    /// persistence).
    pub async fn answer(&mut self, text: impl Into<String>) {
        self.flow.save_answer(&mut self.machine, text).await;
    }

    /// Toggles the flag on the current question.
    pub async fn toggle_flag(&mut self) {
        self.flow.toggle_flag(&mut self.machine).await;
    }

    pub fn go_to(&mut self, question_index: usize) {
        self.machine.go_to(question_index);
    }

    pub fn next_question(&mut self) {
        self.machine.next();
    }

    pub fn previous_question(&mut self) {
        self.machine.previous();
    }

    fn arm_timer(&mut self) {
        // Cancel first: there is never more than one live tick task.
        self.cancel_timer();
        self.timer = Some(SectionTimer::spawn(
            self.machine.epoch(),
            self.events_tx.clone(),
        ));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    async fn advance(&mut self, epoch: TimerEpoch) -> Result<RunnerUpdate, TryoutError> {
        // The old countdown dies before any transition logic runs.
        self.cancel_timer();
        let result = self.flow.advance_section(&mut self.machine, epoch).await;
        match result {
            Ok(AdvanceOutcome::Completed) => Ok(RunnerUpdate::Completed),
            Ok(AdvanceOutcome::EnteredSection(index)) => {
                self.arm_timer();
                Ok(RunnerUpdate::EnteredSection(index))
            }
            Ok(AdvanceOutcome::Ignored) => {
                if !self.machine.is_complete() {
                    self.arm_timer();
                }
                Ok(RunnerUpdate::None)
            }
            Err(err) => {
                // Load failed; keep the section running so the learner can
                // retry the transition.
                if !self.machine.is_complete() {
                    self.arm_timer();
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use chrono::Duration;
    use storage::repository::Storage;
    use tryout_core::model::{
        AttemptStatus, LearnerId, Package, PackageId, Question, QuestionId, Section, SectionId,
        TryoutSession,
    };
    use tryout_core::time::{fixed_clock, fixed_now};

    /// Two sections, one short-answer question each.
    async fn seed_two_sections() -> Storage {
        let storage = Storage::in_memory();
        let now = fixed_now();

        let package = Package::new(PackageId::new(1), "Bundle", None, now).unwrap();
        storage.packages.upsert_package(&package).await.unwrap();

        let session = TryoutSession::new(
            SessionId::new(1),
            "Tryout",
            package.id(),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .unwrap();
        storage.sessions.upsert_session(&session).await.unwrap();

        for (section_id, order, question_id) in [(1_u64, 1_u32, 10_u64), (2, 2, 20)] {
            let section = Section::new(
                SectionId::new(section_id),
                package.id(),
                format!("Section {order}"),
                1,
                order,
            )
            .unwrap();
            storage.sections.upsert_section(&section).await.unwrap();

            let question = Question::short_answer(
                QuestionId::new(question_id),
                section.id(),
                format!("Q{question_id}"),
                "answer",
                now,
            )
            .unwrap();
            storage.questions.upsert_question(&question).await.unwrap();
        }

        storage
    }

    fn auth() -> AuthSession {
        AuthSession::signed_in(Identity::learner(LearnerId::random(), "learner@example.com"))
    }

    async fn start_runner(storage: &Storage) -> TryoutRunner {
        let flow = TryoutFlow::new(fixed_clock(), storage);
        TryoutRunner::start(flow, &auth(), SessionId::new(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn expiry_auto_advances_into_the_next_section() {
        let storage = seed_two_sections().await;
        let mut runner = start_runner(&storage).await;
        let epoch = runner.machine().epoch();

        // Drive the 60-second countdown synthetically.
        for _ in 0..59 {
            let update = runner.handle_event(TimerEvent { epoch }).await.unwrap();
            assert!(matches!(update, RunnerUpdate::Countdown(_)));
        }
        let update = runner.handle_event(TimerEvent { epoch }).await.unwrap();
        assert_eq!(update, RunnerUpdate::EnteredSection(1));
        assert_eq!(runner.machine().remaining_secs(), 60);
        assert_ne!(runner.machine().epoch(), epoch);
    }

    #[tokio::test]
    async fn racing_timeout_and_manual_finish_transition_once() {
        let storage = seed_two_sections().await;
        let mut runner = start_runner(&storage).await;
        let first_epoch = runner.machine().epoch();

        // Manual advance wins the race.
        let update = runner.complete_section().await.unwrap();
        assert_eq!(update, RunnerUpdate::EnteredSection(1));

        // The first section's timeout lands afterwards: dead on arrival.
        let update = runner
            .handle_event(TimerEvent { epoch: first_epoch })
            .await
            .unwrap();
        assert_eq!(update, RunnerUpdate::None);
        assert_eq!(runner.machine().section_index(), 1);
    }

    #[tokio::test]
    async fn finishing_the_last_section_completes_the_attempt() {
        let storage = seed_two_sections().await;
        let mut runner = start_runner(&storage).await;

        runner.answer(" ANSWER ").await;
        runner.complete_section().await.unwrap();
        runner.answer("wrong").await;
        let update = runner.complete_section().await.unwrap();
        assert_eq!(update, RunnerUpdate::Completed);
        assert!(runner.machine().is_complete());
        assert!(runner.next_event().await.is_none());

        let attempt_id = runner.machine().attempt().id();
        let stored = storage.attempts.get_attempt(attempt_id).await.unwrap();
        assert_eq!(stored.status(), AttemptStatus::Completed);

        let answers = storage.answers.answers_for_attempt(attempt_id).await.unwrap();
        assert_eq!(answers.len(), 2);
    }
}
