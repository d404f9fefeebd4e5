use std::collections::HashMap;
use std::sync::Arc;

use storage::repository::{
    AnswerRepository, AttemptRepository, QuestionRepository, SectionRepository,
    SessionRepository, Storage,
};
use tryout_core::model::{Attempt, AttemptId, LearnerId, Question, QuestionId, SessionId};
use tryout_core::scoring;

use crate::error::ScoringError;

/// One attempt successfully graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAttempt {
    pub attempt_id: AttemptId,
    pub learner_id: LearnerId,
    pub final_score: u16,
    pub answered: u32,
    pub correct: u32,
}

/// One attempt that could not be graded; the batch kept going.
#[derive(Debug)]
pub struct ScoringFailure {
    pub attempt_id: AttemptId,
    pub error: ScoringError,
}

/// Outcome of scoring one session.
#[derive(Debug, Default)]
pub struct ScoringReport {
    pub scored: Vec<ScoredAttempt>,
    pub failures: Vec<ScoringFailure>,
}

impl ScoringReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Stateless batch grader for completed attempts.
///
/// Only attempts in completed status are selected, so re-running the engine
/// on an already-scored session grades nothing further.
#[derive(Clone)]
pub struct ScoringService {
    sessions: Arc<dyn SessionRepository>,
    sections: Arc<dyn SectionRepository>,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
}

impl ScoringService {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            sessions: Arc::clone(&storage.sessions),
            sections: Arc::clone(&storage.sections),
            questions: Arc::clone(&storage.questions),
            attempts: Arc::clone(&storage.attempts),
            answers: Arc::clone(&storage.answers),
        }
    }

    /// Grades every completed attempt of the session and writes final scores.
    ///
    /// Attempts are processed independently: a failure lands in the report's
    /// failure list and the batch continues.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::Storage` only when the session itself or its
    /// question set cannot be loaded; per-attempt failures never abort the
    /// batch.
    pub async fn score_session(&self, session_id: SessionId) -> Result<ScoringReport, ScoringError> {
        let session = self.sessions.get_session(session_id).await?;
        let questions = self.load_question_map(session.package_id()).await?;
        let attempts = self.attempts.completed_for_session(session_id).await?;
        tracing::info!(
            session = %session_id,
            attempts = attempts.len(),
            "scoring session"
        );

        let mut report = ScoringReport::default();
        for attempt in attempts {
            match self.score_attempt(&attempt, &questions).await {
                Ok(scored) => report.scored.push(scored),
                Err(error) => {
                    tracing::warn!(
                        attempt = %attempt.id(),
                        error = %error,
                        "failed to score attempt"
                    );
                    report.failures.push(ScoringFailure {
                        attempt_id: attempt.id(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Every question of the package, keyed by id, for the answer join.
    async fn load_question_map(
        &self,
        package_id: tryout_core::model::PackageId,
    ) -> Result<HashMap<QuestionId, Question>, ScoringError> {
        let sections = self.sections.sections_for_package(package_id).await?;
        let mut map = HashMap::new();
        for section in &sections {
            for question in self.questions.questions_for_section(section.id()).await? {
                map.insert(question.id(), question);
            }
        }
        Ok(map)
    }

    async fn score_attempt(
        &self,
        attempt: &Attempt,
        questions: &HashMap<QuestionId, Question>,
    ) -> Result<ScoredAttempt, ScoringError> {
        let answers = self.answers.answers_for_attempt(attempt.id()).await?;
        let pairs = answers
            .iter()
            .filter_map(|answer| questions.get(&answer.question_id()).map(|q| (answer, q)));
        let summary = scoring::grade(pairs);
        let final_score = summary.final_score();

        // Validate the transition on the domain object before writing.
        let mut updated = attempt.clone();
        updated.record_score(final_score)?;
        self.attempts.record_score(attempt.id(), final_score).await?;

        Ok(ScoredAttempt {
            attempt_id: attempt.id(),
            learner_id: attempt.learner_id(),
            final_score,
            answered: summary.answered(),
            correct: summary.correct(),
        })
    }
}
