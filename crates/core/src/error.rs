use thiserror::Error;

use crate::model::{
    AttemptError, PackageError, QuestionError, SectionError, SessionError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
}
