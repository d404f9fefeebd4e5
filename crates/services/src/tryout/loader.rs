use storage::repository::{
    PackageRepository, QuestionRepository, SectionRepository, SessionRepository,
};
use tryout_core::model::{Package, PackageId, Question, Section, SectionId, SessionId, TryoutSession};

use crate::error::TryoutError;

/// Session metadata shown before the learner starts: the session itself plus
/// its parent package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOverview {
    pub session: TryoutSession,
    pub package: Package,
}

/// Storage-backed loaders for the tryout flow.
pub(crate) struct TryoutQueries;

impl TryoutQueries {
    /// Fetch a session joined with its package.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::Storage` when either record cannot be read.
    pub async fn load_overview(
        session_id: SessionId,
        sessions: &dyn SessionRepository,
        packages: &dyn PackageRepository,
    ) -> Result<SessionOverview, TryoutError> {
        let session = sessions.get_session(session_id).await?;
        let package = packages.get_package(session.package_id()).await?;
        Ok(SessionOverview { session, package })
    }

    /// Ordered section list for a package.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::NoSections` for an empty package and
    /// `TryoutError::Storage` on repository failures.
    pub async fn load_sections(
        package_id: PackageId,
        sections: &dyn SectionRepository,
    ) -> Result<Vec<Section>, TryoutError> {
        let sections = sections.sections_for_package(package_id).await?;
        if sections.is_empty() {
            return Err(TryoutError::NoSections);
        }
        Ok(sections)
    }

    /// Ordered question list for a section.
    ///
    /// # Errors
    ///
    /// Returns `TryoutError::NoQuestions` for an empty section and
    /// `TryoutError::Storage` on repository failures.
    pub async fn load_questions(
        section_id: SectionId,
        questions: &dyn QuestionRepository,
    ) -> Result<Vec<Question>, TryoutError> {
        let questions = questions.questions_for_section(section_id).await?;
        if questions.is_empty() {
            return Err(TryoutError::NoQuestions);
        }
        Ok(questions)
    }
}
