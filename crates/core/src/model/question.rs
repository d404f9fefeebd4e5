use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("correct answer cannot be empty")]
    EmptyCorrectAnswer,

    #[error("multiple-choice question requires at least one option")]
    MissingOptions,

    #[error("short-answer question cannot carry options")]
    UnexpectedOptions,

    #[error("correct answer {0:?} is not an option key")]
    UnknownCorrectOption(String),

    #[error("unknown question kind: {0}")]
    UnknownKind(String),
}

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

/// How a question is presented and graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    /// Answered by an option key; graded by exact key equality.
    MultipleChoice,
    /// Answered by free text; graded after trimming and lowercasing.
    ShortAnswer,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "MC",
            QuestionKind::ShortAnswer => "SA",
        }
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MC" => Ok(QuestionKind::MultipleChoice),
            "SA" => Ok(QuestionKind::ShortAnswer),
            other => Err(QuestionError::UnknownKind(other.to_string())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// One question within a section.
///
/// Option keys are ordered (BTreeMap) so multiple-choice rendering is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    section_id: SectionId,
    text: String,
    kind: QuestionKind,
    options: Option<BTreeMap<String, String>>,
    correct_answer: String,
    created_at: DateTime<Utc>,
}

impl Question {
    /// Creates a multiple-choice question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when text or answer are blank, options are
    /// empty, or the correct answer is not one of the option keys.
    pub fn multiple_choice(
        id: QuestionId,
        section_id: SectionId,
        text: impl Into<String>,
        options: BTreeMap<String, String>,
        correct_key: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        Self::build(
            id,
            section_id,
            text.into(),
            QuestionKind::MultipleChoice,
            Some(options),
            correct_key.into(),
            created_at,
        )
    }

    /// Creates a short-answer question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when text or the canonical answer are blank.
    pub fn short_answer(
        id: QuestionId,
        section_id: SectionId,
        text: impl Into<String>,
        correct_text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        Self::build(
            id,
            section_id,
            text.into(),
            QuestionKind::ShortAnswer,
            None,
            correct_text.into(),
            created_at,
        )
    }

    /// Rehydrate a question from persisted storage.
    ///
    /// # Errors
    ///
    /// Applies the same validation as the kind-specific constructors.
    pub fn from_persisted(
        id: QuestionId,
        section_id: SectionId,
        text: String,
        kind: QuestionKind,
        options: Option<BTreeMap<String, String>>,
        correct_answer: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        Self::build(id, section_id, text, kind, options, correct_answer, created_at)
    }

    fn build(
        id: QuestionId,
        section_id: SectionId,
        text: String,
        kind: QuestionKind,
        options: Option<BTreeMap<String, String>>,
        correct_answer: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if correct_answer.trim().is_empty() {
            return Err(QuestionError::EmptyCorrectAnswer);
        }
        match kind {
            QuestionKind::MultipleChoice => {
                let Some(options) = options.as_ref() else {
                    return Err(QuestionError::MissingOptions);
                };
                if options.is_empty() {
                    return Err(QuestionError::MissingOptions);
                }
                if !options.contains_key(&correct_answer) {
                    return Err(QuestionError::UnknownCorrectOption(correct_answer));
                }
            }
            QuestionKind::ShortAnswer => {
                if options.is_some() {
                    return Err(QuestionError::UnexpectedOptions);
                }
            }
        }
        Ok(Self {
            id,
            section_id,
            text,
            kind,
            options,
            correct_answer,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn section_id(&self) -> SectionId {
        self.section_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> Option<&BTreeMap<String, String>> {
        self.options.as_ref()
    }

    #[must_use]
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Grades a learner's answer text against this question.
    ///
    /// Multiple choice requires the exact option key, case included. Short
    /// answers are compared after trimming surrounding whitespace and
    /// lowercasing both sides.
    #[must_use]
    pub fn is_correct(&self, answer_text: &str) -> bool {
        match self.kind {
            QuestionKind::MultipleChoice => answer_text == self.correct_answer,
            QuestionKind::ShortAnswer => {
                answer_text.trim().to_lowercase() == self.correct_answer.trim().to_lowercase()
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn mc_question() -> Question {
        let options = BTreeMap::from([
            ("A".to_string(), "3".to_string()),
            ("B".to_string(), "4".to_string()),
        ]);
        Question::multiple_choice(
            QuestionId::new(1),
            SectionId::new(1),
            "2 + 2 = ?",
            options,
            "B",
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn multiple_choice_requires_exact_key() {
        let question = mc_question();
        assert!(question.is_correct("B"));
        assert!(!question.is_correct("b"));
        assert!(!question.is_correct(" B "));
    }

    #[test]
    fn short_answer_trims_and_folds_case() {
        let question = Question::short_answer(
            QuestionId::new(2),
            SectionId::new(1),
            "Formula for velocity?",
            "v = s/t",
            fixed_now(),
        )
        .unwrap();

        assert!(question.is_correct("  V = S/T "));
        assert!(question.is_correct("v = s/t"));
        assert!(!question.is_correct("v = t/s"));
    }

    #[test]
    fn correct_key_must_be_an_option() {
        let options = BTreeMap::from([("A".to_string(), "3".to_string())]);
        let err = Question::multiple_choice(
            QuestionId::new(1),
            SectionId::new(1),
            "2 + 2 = ?",
            options,
            "Z",
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::UnknownCorrectOption("Z".into()));
    }

    #[test]
    fn short_answer_rejects_options() {
        let options = BTreeMap::from([("A".to_string(), "3".to_string())]);
        let err = Question::from_persisted(
            QuestionId::new(1),
            SectionId::new(1),
            "Q".into(),
            QuestionKind::ShortAnswer,
            Some(options),
            "A".into(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::UnexpectedOptions);
    }

    #[test]
    fn kind_parses_from_storage_tag() {
        assert_eq!("MC".parse::<QuestionKind>().unwrap(), QuestionKind::MultipleChoice);
        assert_eq!("SA".parse::<QuestionKind>().unwrap(), QuestionKind::ShortAnswer);
        assert!("essay".parse::<QuestionKind>().is_err());
    }
}
