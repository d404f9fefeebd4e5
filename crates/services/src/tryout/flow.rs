use std::sync::Arc;

use storage::repository::{
    AttemptRepository, NewAttemptRecord, PackageRepository, QuestionRepository,
    SectionRepository, SessionRepository, Storage,
};
use tryout_core::Clock;
use tryout_core::model::{AttemptStatus, SessionId};

use crate::auth::AuthSession;
use crate::error::TryoutError;
use super::gateway::AnswerGateway;
use super::loader::{SessionOverview, TryoutQueries};
use super::machine::{AdvanceTarget, TimerEpoch, TryoutMachine};

/// Result of asking the flow to leave the current section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The request was stale or another transition was already under way.
    Ignored,
    /// Entered the section at this index; the countdown must be re-armed.
    EnteredSection(usize),
    /// The last section ended; the attempt is now completed.
    Completed,
}

/// Orchestrates attempt creation, section transitions, and answer
/// persistence around a [`TryoutMachine`].
///
/// The flow itself is stateless; the caller owns the machine and passes it
/// in, which keeps the single mutable session state in exactly one place.
#[derive(Clone)]
pub struct TryoutFlow {
    clock: Clock,
    packages: Arc<dyn PackageRepository>,
    sessions: Arc<dyn SessionRepository>,
    sections: Arc<dyn SectionRepository>,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    gateway: AnswerGateway,
}

impl TryoutFlow {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            packages: Arc::clone(&storage.packages),
            sessions: Arc::clone(&storage.sessions),
            sections: Arc::clone(&storage.sections),
            questions: Arc::clone(&storage.questions),
            attempts: Arc::clone(&storage.attempts),
            gateway: AnswerGateway::new(Arc::clone(&storage.answers)),
        }
    }

    /// Replace the default answer gateway, e.g. to change the retry budget or
    /// install an error hook.
    #[must_use]
    pub fn with_gateway(mut self, gateway: AnswerGateway) -> Self {
        self.gateway = gateway;
        self
    }

    /// Session metadata for the pre-start screen.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::Storage` when the session or package cannot be
    /// read.
    pub async fn overview(&self, session_id: SessionId) -> Result<SessionOverview, TryoutError> {
        TryoutQueries::load_overview(session_id, self.sessions.as_ref(), self.packages.as_ref())
            .await
    }

    /// Starts a tryout: creates exactly one in-progress attempt and positions
    /// the machine at the first question of the first section.
    ///
    /// The session window is checked before anything is written; a closed
    /// window never creates an attempt. Load failures after the insert are
    /// surfaced without rolling the attempt back, so `start` may be retried.
    ///
    /// # Errors
    ///
    /// `AuthError::Unauthenticated` without a learner, `OutOfWindow` outside
    /// the schedule, `NoSections` / `NoQuestions` for malformed packages, and
    /// `Storage` for repository failures.
    pub async fn start(
        &self,
        auth: &AuthSession,
        session_id: SessionId,
    ) -> Result<TryoutMachine, TryoutError> {
        let learner_id = auth.require_learner()?;
        let session = self.sessions.get_session(session_id).await?;

        let now = self.clock.now();
        if !session.window_contains(now) {
            return Err(TryoutError::OutOfWindow {
                starts_at: session.starts_at(),
                ends_at: session.ends_at(),
            });
        }

        let attempt = self
            .attempts
            .insert_attempt(&NewAttemptRecord {
                learner_id,
                package_id: session.package_id(),
                session_id,
                created_at: now,
            })
            .await?;
        tracing::info!(attempt = %attempt.id(), learner = %learner_id, "attempt started");

        let sections =
            TryoutQueries::load_sections(session.package_id(), self.sections.as_ref()).await?;
        let first = sections.first().ok_or(TryoutError::NoSections)?;
        let first_questions =
            TryoutQueries::load_questions(first.id(), self.questions.as_ref()).await?;

        TryoutMachine::new(attempt, sections, first_questions)
    }

    /// Records the learner's answer for the current question and writes it
    /// through the gateway.
    ///
    /// Persistence failures are reported by the gateway (log + error hook)
    /// but never fail the call: the in-memory answer stands and the next
    /// change retries the row.
    pub async fn save_answer(&self, machine: &mut TryoutMachine, text: impl Into<String>) {
        let Some(answer) = machine.set_answer(text) else {
            return;
        };
        let _ = self.gateway.save(&answer).await;
    }

    /// Flips the flag on the current question, with the same persistence
    /// contract as [`TryoutFlow::save_answer`].
    pub async fn toggle_flag(&self, machine: &mut TryoutMachine) {
        let Some(answer) = machine.toggle_flag() else {
            return;
        };
        let _ = self.gateway.save(&answer).await;
    }

    /// Leaves the current section: enters the next one or completes the
    /// attempt when none remains.
    ///
    /// The epoch makes the call idempotent under races: a countdown expiry
    /// and a manual finish issued in the same second produce one transition,
    /// and the loser reports [`AdvanceOutcome::Ignored`].
    ///
    /// # Errors
    ///
    /// `NoQuestions` when the next section is empty and `Storage` on
    /// repository failures. Both leave the machine where it was so the
    /// advance can be retried.
    pub async fn advance_section(
        &self,
        machine: &mut TryoutMachine,
        epoch: TimerEpoch,
    ) -> Result<AdvanceOutcome, TryoutError> {
        let Some(target) = machine.begin_advance(epoch) else {
            return Ok(AdvanceOutcome::Ignored);
        };

        match target {
            AdvanceTarget::Finish => {
                if let Err(err) = self
                    .attempts
                    .set_status(machine.attempt().id(), AttemptStatus::Completed)
                    .await
                {
                    machine.abort_advance();
                    return Err(err.into());
                }
                machine.finish()?;
                tracing::info!(attempt = %machine.attempt().id(), "tryout completed");
                Ok(AdvanceOutcome::Completed)
            }
            AdvanceTarget::NextSection(section) => {
                let questions =
                    match TryoutQueries::load_questions(section.id(), self.questions.as_ref())
                        .await
                    {
                        Ok(questions) => questions,
                        Err(err) => {
                            machine.abort_advance();
                            return Err(err);
                        }
                    };
                if let Err(err) = machine.enter_section(questions) {
                    machine.abort_advance();
                    return Err(err);
                }
                tracing::debug!(
                    attempt = %machine.attempt().id(),
                    section = machine.section_index(),
                    "entered section"
                );
                Ok(AdvanceOutcome::EnteredSection(machine.section_index()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use chrono::Duration;
    use tryout_core::model::{
        LearnerId, Package, PackageId, Question, QuestionId, Section, SectionId, TryoutSession,
    };
    use tryout_core::time::{fixed_clock, fixed_now};

    async fn seed_storage() -> Storage {
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

        let section = Section::new(SectionId::new(1), package.id(), "Math", 1, 1).unwrap();
        storage.sections.upsert_section(&section).await.unwrap();

        let question = Question::short_answer(
            QuestionId::new(1),
            section.id(),
            "Velocity formula?",
            "v = s/t",
            now,
        )
        .unwrap();
        storage.questions.upsert_question(&question).await.unwrap();

        storage
    }

    fn learner_auth() -> (AuthSession, LearnerId) {
        let learner_id = LearnerId::random();
        (
            AuthSession::signed_in(Identity::learner(learner_id, "learner@example.com")),
            learner_id,
        )
    }

    #[tokio::test]
    async fn start_requires_a_signed_in_learner() {
        let storage = seed_storage().await;
        let flow = TryoutFlow::new(fixed_clock(), &storage);

        let err = flow
            .start(&AuthSession::anonymous(), SessionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TryoutError::Auth(crate::error::AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn closed_window_creates_no_attempt() {
        let storage = seed_storage().await;
        let late = Clock::fixed(fixed_now() + Duration::hours(2));
        let flow = TryoutFlow::new(late, &storage);
        let (auth, learner_id) = learner_auth();

        let err = flow.start(&auth, SessionId::new(1)).await.unwrap_err();
        assert!(matches!(err, TryoutError::OutOfWindow { .. }));

        let attempts = storage
            .attempts
            .recent_for_learner(learner_id, 10)
            .await
            .unwrap();
        assert!(attempts.is_empty());
    }

    #[tokio::test]
    async fn start_creates_exactly_one_in_progress_attempt() {
        let storage = seed_storage().await;
        let flow = TryoutFlow::new(fixed_clock(), &storage);
        let (auth, learner_id) = learner_auth();

        let machine = flow.start(&auth, SessionId::new(1)).await.unwrap();
        assert_eq!(machine.remaining_secs(), 60);
        assert_eq!(machine.attempt().status(), AttemptStatus::InProgress);

        let attempts = storage
            .attempts
            .recent_for_learner(learner_id, 10)
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn stale_advance_requests_are_ignored() {
        let storage = seed_storage().await;
        let flow = TryoutFlow::new(fixed_clock(), &storage);
        let (auth, _) = learner_auth();

        let mut machine = flow.start(&auth, SessionId::new(1)).await.unwrap();
        let epoch = machine.epoch();
        let outcome = flow.advance_section(&mut machine, epoch).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Completed);

        // The countdown from the finished section fires late: no effect.
        let outcome = flow.advance_section(&mut machine, epoch).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Ignored);
    }
}
