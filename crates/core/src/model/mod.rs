mod answer;
mod attempt;
mod ids;
mod package;
mod question;
mod section;
mod session;

pub use ids::{
    AttemptId, LearnerId, PackageId, ParseIdError, QuestionId, SectionId, SessionId,
};

pub use answer::Answer;
pub use attempt::{Attempt, AttemptError, AttemptStatus, MAX_SCORE};
pub use package::{Package, PackageError};
pub use question::{Question, QuestionError, QuestionKind};
pub use section::{Section, SectionError};
pub use session::{SessionError, TryoutSession};
