//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use storage::repository::StorageError;
use tryout_core::model::{
    AttemptError, PackageError, QuestionError, SectionError, SessionError,
};

/// Errors raised by the auth context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("no learner is signed in")]
    Unauthenticated,
    #[error("administrator access required")]
    Forbidden,
}

/// Errors emitted by the tryout flow and state machine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TryoutError {
    #[error("session is not open now (window {starts_at} to {ends_at})")]
    OutOfWindow {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    #[error("package has no sections")]
    NoSections,

    #[error("section has no questions")]
    NoQuestions,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Attempt(#[from] AttemptError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ScoringService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoringError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AdminService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
