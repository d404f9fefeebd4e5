use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use storage::repository::{
    PackageRepository, QuestionRepository, SectionRepository, SessionRepository, Storage,
};
use tryout_core::Clock;
use tryout_core::model::{
    Package, PackageId, Question, QuestionId, Section, SectionId, SessionId, TryoutSession,
};

use crate::auth::AuthSession;
use crate::error::AdminError;

/// Authoring operations behind the admin screens: packages, sections,
/// questions, and session scheduling.
///
/// Every operation requires an admin identity in the passed-in context.
#[derive(Clone)]
pub struct AdminService {
    clock: Clock,
    packages: Arc<dyn PackageRepository>,
    sessions: Arc<dyn SessionRepository>,
    sections: Arc<dyn SectionRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl AdminService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            packages: Arc::clone(&storage.packages),
            sessions: Arc::clone(&storage.sessions),
            sections: Arc::clone(&storage.sections),
            questions: Arc::clone(&storage.questions),
        }
    }

    /// Create a package.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth` without admin rights, `AdminError::Package` for
    /// invalid fields, `AdminError::Storage` on write failures.
    pub async fn create_package(
        &self,
        auth: &AuthSession,
        id: PackageId,
        name: &str,
        description: Option<String>,
    ) -> Result<Package, AdminError> {
        auth.require_admin()?;
        let package = Package::new(id, name, description, self.clock.now())?;
        self.packages.upsert_package(&package).await?;
        tracing::info!(package = %package.id(), "package created");
        Ok(package)
    }

    /// Activate or retire a package.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth` without admin rights, `AdminError::Storage` when
    /// the package is missing or the write fails.
    pub async fn set_package_active(
        &self,
        auth: &AuthSession,
        id: PackageId,
        active: bool,
    ) -> Result<Package, AdminError> {
        auth.require_admin()?;
        let mut package = self.packages.get_package(id).await?;
        package.set_active(active);
        self.packages.upsert_package(&package).await?;
        Ok(package)
    }

    /// Add a timed section to a package.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth`, `AdminError::Section` for invalid fields,
    /// `AdminError::Storage` when the package is missing, the order index
    /// collides, or the write fails.
    pub async fn add_section(
        &self,
        auth: &AuthSession,
        id: SectionId,
        package_id: PackageId,
        name: &str,
        duration_minutes: u32,
        order_index: u32,
    ) -> Result<Section, AdminError> {
        auth.require_admin()?;
        // Fail early with NotFound rather than a foreign-key error later.
        self.packages.get_package(package_id).await?;
        let section = Section::new(id, package_id, name, duration_minutes, order_index)?;
        self.sections.upsert_section(&section).await?;
        Ok(section)
    }

    /// Add a multiple-choice question to a section.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth`, `AdminError::Question` for invalid fields,
    /// `AdminError::Storage` on write failures.
    pub async fn add_multiple_choice(
        &self,
        auth: &AuthSession,
        id: QuestionId,
        section_id: SectionId,
        text: &str,
        options: BTreeMap<String, String>,
        correct_key: &str,
    ) -> Result<Question, AdminError> {
        auth.require_admin()?;
        let question =
            Question::multiple_choice(id, section_id, text, options, correct_key, self.clock.now())?;
        self.questions.upsert_question(&question).await?;
        Ok(question)
    }

    /// Add a short-answer question to a section.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth`, `AdminError::Question` for invalid fields,
    /// `AdminError::Storage` on write failures.
    pub async fn add_short_answer(
        &self,
        auth: &AuthSession,
        id: QuestionId,
        section_id: SectionId,
        text: &str,
        correct_text: &str,
    ) -> Result<Question, AdminError> {
        auth.require_admin()?;
        let question = Question::short_answer(id, section_id, text, correct_text, self.clock.now())?;
        self.questions.upsert_question(&question).await?;
        Ok(question)
    }

    /// Schedule a tryout window for a package.
    ///
    /// # Errors
    ///
    /// `AdminError::Auth`, `AdminError::Session` for an inverted window,
    /// `AdminError::Storage` when the package is missing or the write fails.
    pub async fn schedule_session(
        &self,
        auth: &AuthSession,
        id: SessionId,
        name: &str,
        package_id: PackageId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<TryoutSession, AdminError> {
        auth.require_admin()?;
        self.packages.get_package(package_id).await?;
        let session = TryoutSession::new(id, name, package_id, starts_at, ends_at)?;
        self.sessions.upsert_session(&session).await?;
        tracing::info!(session = %session.id(), package = %package_id, "session scheduled");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::error::AuthError;
    use chrono::Duration;
    use tryout_core::model::LearnerId;
    use tryout_core::time::{fixed_clock, fixed_now};

    fn admin_auth() -> AuthSession {
        AuthSession::signed_in(Identity::admin(LearnerId::random(), "ops@example.com"))
    }

    fn learner_auth() -> AuthSession {
        AuthSession::signed_in(Identity::learner(LearnerId::random(), "learner@example.com"))
    }

    #[tokio::test]
    async fn learners_cannot_author_packages() {
        let storage = Storage::in_memory();
        let admin = AdminService::new(fixed_clock(), &storage);

        let err = admin
            .create_package(&learner_auth(), PackageId::new(1), "Bundle", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Auth(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn authoring_builds_a_loadable_package() {
        let storage = Storage::in_memory();
        let admin = AdminService::new(fixed_clock(), &storage);
        let auth = admin_auth();

        let package = admin
            .create_package(&auth, PackageId::new(1), "Bundle", None)
            .await
            .unwrap();
        let section = admin
            .add_section(&auth, SectionId::new(1), package.id(), "Math", 30, 1)
            .await
            .unwrap();
        admin
            .add_short_answer(&auth, QuestionId::new(1), section.id(), "Q?", "A")
            .await
            .unwrap();
        let now = fixed_now();
        admin
            .schedule_session(
                &auth,
                SessionId::new(1),
                "Tryout",
                package.id(),
                now,
                now + Duration::days(5),
            )
            .await
            .unwrap();

        let sections = storage
            .sections
            .sections_for_package(package.id())
            .await
            .unwrap();
        assert_eq!(sections.len(), 1);
        let questions = storage
            .questions
            .questions_for_section(section.id())
            .await
            .unwrap();
        assert_eq!(questions.len(), 1);
    }

    #[tokio::test]
    async fn sections_need_an_existing_package() {
        let storage = Storage::in_memory();
        let admin = AdminService::new(fixed_clock(), &storage);

        let err = admin
            .add_section(&admin_auth(), SectionId::new(1), PackageId::new(99), "Math", 30, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Storage(_)));
    }
}
