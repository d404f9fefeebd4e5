use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use tryout_core::model::{
    Answer, Attempt, AttemptId, AttemptStatus, LearnerId, Package, PackageId, Question,
    QuestionId, Section, SectionId, SessionId, TryoutSession,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Insert shape for a new attempt; the adapter assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttemptRecord {
    pub learner_id: LearnerId,
    pub package_id: PackageId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Persist or update a package.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the package cannot be stored.
    async fn upsert_package(&self, package: &Package) -> Result<(), StorageError>;

    /// Fetch a package by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_package(&self, id: PackageId) -> Result<Package, StorageError>;

    /// List packages, optionally restricted to active ones, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_packages(&self, active_only: bool) -> Result<Vec<Package>, StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist or update a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn upsert_session(&self, session: &TryoutSession) -> Result<(), StorageError>;

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<TryoutSession, StorageError>;

    /// Active sessions whose window has not ended yet, soonest start first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_open_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TryoutSession>, StorageError>;
}

#[async_trait]
pub trait SectionRepository: Send + Sync {
    /// Persist or update a section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the section cannot be stored.
    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError>;

    /// Ordered section list for a package, ascending by `order_index`.
    ///
    /// The traversal order of a tryout is defined by this ordering; adapters
    /// must never return sections unsorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn sections_for_package(
        &self,
        package_id: PackageId,
    ) -> Result<Vec<Section>, StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Ordered question list for a section, ascending by creation time then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn questions_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<Question>, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert a new attempt in progress and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn insert_attempt(&self, new: &NewAttemptRecord) -> Result<Attempt, StorageError>;

    /// Fetch an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError>;

    /// Overwrite the attempt status.
    ///
    /// Transition legality is the caller's concern; adapters store what they
    /// are given.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn set_status(&self, id: AttemptId, status: AttemptStatus) -> Result<(), StorageError>;

    /// Write the final score and move the attempt to scored in one update.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn record_score(&self, id: AttemptId, score: u16) -> Result<(), StorageError>;

    /// All attempts for a session currently in completed status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn completed_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError>;

    /// A learner's most recent attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn recent_for_learner(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Upsert an answer keyed by (attempt, question).
    ///
    /// Replace-on-conflict semantics: there is never a second row for the same
    /// pair, only the latest text and flag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the answer cannot be stored.
    async fn upsert_answer(&self, answer: &Answer) -> Result<(), StorageError>;

    /// All answers recorded for an attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<Answer>, StorageError>;
}

//
// ─── IN-MEMORY ADAPTER ─────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    packages: Arc<Mutex<HashMap<PackageId, Package>>>,
    sessions: Arc<Mutex<HashMap<SessionId, TryoutSession>>>,
    sections: Arc<Mutex<HashMap<SectionId, Section>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    answers: Arc<Mutex<HashMap<(AttemptId, QuestionId), Answer>>>,
    next_attempt_id: Arc<Mutex<u64>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(guard: &Arc<Mutex<T>>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
        guard
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl PackageRepository for InMemoryRepository {
    async fn upsert_package(&self, package: &Package) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.packages)?;
        guard.insert(package.id(), package.clone());
        Ok(())
    }

    async fn get_package(&self, id: PackageId) -> Result<Package, StorageError> {
        let guard = Self::lock(&self.packages)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_packages(&self, active_only: bool) -> Result<Vec<Package>, StorageError> {
        let guard = Self::lock(&self.packages)?;
        let mut packages: Vec<Package> = guard
            .values()
            .filter(|p| !active_only || p.is_active())
            .cloned()
            .collect();
        packages.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(a.id().cmp(&b.id())));
        Ok(packages)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn upsert_session(&self, session: &TryoutSession) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.sessions)?;
        guard.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<TryoutSession, StorageError> {
        let guard = Self::lock(&self.sessions)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_open_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TryoutSession>, StorageError> {
        let guard = Self::lock(&self.sessions)?;
        let mut sessions: Vec<TryoutSession> = guard
            .values()
            .filter(|s| s.is_open_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.starts_at().cmp(&b.starts_at()).then(a.id().cmp(&b.id())));
        Ok(sessions)
    }
}

#[async_trait]
impl SectionRepository for InMemoryRepository {
    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.sections)?;
        guard.insert(section.id(), section.clone());
        Ok(())
    }

    async fn sections_for_package(
        &self,
        package_id: PackageId,
    ) -> Result<Vec<Section>, StorageError> {
        let guard = Self::lock(&self.sections)?;
        let mut sections: Vec<Section> = guard
            .values()
            .filter(|s| s.package_id() == package_id)
            .cloned()
            .collect();
        sections.sort_by_key(Section::order_index);
        Ok(sections)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.questions)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn questions_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = Self::lock(&self.questions)?;
        let mut questions: Vec<Question> = guard
            .values()
            .filter(|q| q.section_id() == section_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        Ok(questions)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, new: &NewAttemptRecord) -> Result<Attempt, StorageError> {
        let id = {
            let mut guard = Self::lock(&self.next_attempt_id)?;
            *guard += 1;
            AttemptId::new(*guard)
        };
        let attempt = Attempt::started(
            id,
            new.learner_id,
            new.package_id,
            new.session_id,
            new.created_at,
        );
        let mut guard = Self::lock(&self.attempts)?;
        if guard.contains_key(&id) {
            return Err(StorageError::Conflict);
        }
        guard.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn set_status(&self, id: AttemptId, status: AttemptStatus) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.attempts)?;
        let attempt = guard.get(&id).ok_or(StorageError::NotFound)?;
        let updated = Attempt::from_persisted(
            attempt.id(),
            attempt.learner_id(),
            attempt.package_id(),
            attempt.session_id(),
            status,
            attempt.final_score(),
            attempt.created_at(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.insert(id, updated);
        Ok(())
    }

    async fn record_score(&self, id: AttemptId, score: u16) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.attempts)?;
        let attempt = guard.get(&id).ok_or(StorageError::NotFound)?;
        let updated = Attempt::from_persisted(
            attempt.id(),
            attempt.learner_id(),
            attempt.package_id(),
            attempt.session_id(),
            AttemptStatus::Scored,
            Some(score),
            attempt.created_at(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.insert(id, updated);
        Ok(())
    }

    async fn completed_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        let mut attempts: Vec<Attempt> = guard
            .values()
            .filter(|a| a.session_id() == session_id && a.status() == AttemptStatus::Completed)
            .cloned()
            .collect();
        attempts.sort_by_key(Attempt::id);
        Ok(attempts)
    }

    async fn recent_for_learner(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        let mut attempts: Vec<Attempt> = guard
            .values()
            .filter(|a| a.learner_id() == learner_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        attempts.truncate(limit as usize);
        Ok(attempts)
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn upsert_answer(&self, answer: &Answer) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.answers)?;
        guard.insert((answer.attempt_id(), answer.question_id()), answer.clone());
        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<Answer>, StorageError> {
        let guard = Self::lock(&self.answers)?;
        let mut answers: Vec<Answer> = guard
            .values()
            .filter(|a| a.attempt_id() == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(Answer::question_id);
        Ok(answers)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the entity repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub packages: Arc<dyn PackageRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub sections: Arc<dyn SectionRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub answers: Arc<dyn AnswerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            packages: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            sections: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            answers: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use tryout_core::time::fixed_now;

    fn build_section(id: u64, order_index: u32) -> Section {
        Section::new(
            SectionId::new(id),
            PackageId::new(1),
            format!("Section {id}"),
            10,
            order_index,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sections_come_back_in_order_index_order() {
        let repo = InMemoryRepository::new();
        repo.upsert_section(&build_section(1, 3)).await.unwrap();
        repo.upsert_section(&build_section(2, 1)).await.unwrap();
        repo.upsert_section(&build_section(3, 2)).await.unwrap();

        let sections = repo.sections_for_package(PackageId::new(1)).await.unwrap();
        let orders: Vec<u32> = sections.iter().map(Section::order_index).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn answer_upsert_replaces_on_conflict() {
        let repo = InMemoryRepository::new();
        let mut answer = Answer::blank(AttemptId::new(1), QuestionId::new(1));
        answer.set_text("v");
        repo.upsert_answer(&answer).await.unwrap();
        answer.set_text("w");
        repo.upsert_answer(&answer).await.unwrap();

        let answers = repo.answers_for_attempt(AttemptId::new(1)).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].text(), Some("w"));
    }

    #[tokio::test]
    async fn attempt_ids_are_assigned_sequentially() {
        let repo = InMemoryRepository::new();
        let new = NewAttemptRecord {
            learner_id: LearnerId::random(),
            package_id: PackageId::new(1),
            session_id: SessionId::new(1),
            created_at: fixed_now(),
        };
        let first = repo.insert_attempt(&new).await.unwrap();
        let second = repo.insert_attempt(&new).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.status(), AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn completed_filter_ignores_other_statuses() {
        let repo = InMemoryRepository::new();
        let new = NewAttemptRecord {
            learner_id: LearnerId::random(),
            package_id: PackageId::new(1),
            session_id: SessionId::new(7),
            created_at: fixed_now(),
        };
        let in_progress = repo.insert_attempt(&new).await.unwrap();
        let completed = repo.insert_attempt(&new).await.unwrap();
        repo.set_status(completed.id(), AttemptStatus::Completed)
            .await
            .unwrap();

        let found = repo.completed_for_session(SessionId::new(7)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), completed.id());
        assert_ne!(found[0].id(), in_progress.id());
    }
}
