use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AttemptId, LearnerId, PackageId, SessionId};

/// Upper bound of the 0–1000 score scale.
pub const MAX_SCORE: u16 = 1000;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("invalid attempt transition: {from} -> {to}")]
    InvalidTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("final score {0} exceeds the 0-1000 scale")]
    ScoreOutOfRange(u16),

    #[error("unknown attempt status: {0}")]
    UnknownStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. Transitions are strictly forward and may not skip
/// a state: NotStarted -> InProgress -> Completed -> Scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Completed,
    Scored,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Scored => "scored",
        }
    }

    /// True when `next` is the single legal successor of `self`.
    #[must_use]
    pub fn can_advance_to(&self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::NotStarted, AttemptStatus::InProgress)
                | (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::Completed, AttemptStatus::Scored)
        )
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(AttemptStatus::NotStarted),
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "scored" => Ok(AttemptStatus::Scored),
            other => Err(AttemptError::UnknownStatus(other.to_string())),
        }
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One learner's run through a session's sections ("user tryout").
///
/// Created exactly once per learner per session-start action; owns its
/// answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    learner_id: LearnerId,
    package_id: PackageId,
    session_id: SessionId,
    status: AttemptStatus,
    final_score: Option<u16>,
    created_at: DateTime<Utc>,
}

impl Attempt {
    /// Creates an attempt already in progress, as the start action does.
    #[must_use]
    pub fn started(
        id: AttemptId,
        learner_id: LearnerId,
        package_id: PackageId,
        session_id: SessionId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            package_id,
            session_id,
            status: AttemptStatus::InProgress,
            final_score: None,
            created_at,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::ScoreOutOfRange` if the stored score exceeds the
    /// scale.
    pub fn from_persisted(
        id: AttemptId,
        learner_id: LearnerId,
        package_id: PackageId,
        session_id: SessionId,
        status: AttemptStatus,
        final_score: Option<u16>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if let Some(score) = final_score {
            if score > MAX_SCORE {
                return Err(AttemptError::ScoreOutOfRange(score));
            }
        }
        Ok(Self {
            id,
            learner_id,
            package_id,
            session_id,
            status,
            final_score,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn final_score(&self) -> Option<u16> {
        self.final_score
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks the attempt completed after the last section.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTransition` unless currently in progress.
    pub fn complete(&mut self) -> Result<(), AttemptError> {
        self.transition(AttemptStatus::Completed)
    }

    /// Records the final score and moves the attempt to scored.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::ScoreOutOfRange` for scores above the scale and
    /// `AttemptError::InvalidTransition` unless currently completed.
    pub fn record_score(&mut self, score: u16) -> Result<(), AttemptError> {
        if score > MAX_SCORE {
            return Err(AttemptError::ScoreOutOfRange(score));
        }
        self.transition(AttemptStatus::Scored)?;
        self.final_score = Some(score);
        Ok(())
    }

    fn transition(&mut self, next: AttemptStatus) -> Result<(), AttemptError> {
        if !self.status.can_advance_to(next) {
            return Err(AttemptError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn build_attempt() -> Attempt {
        Attempt::started(
            AttemptId::new(1),
            LearnerId::random(),
            PackageId::new(1),
            SessionId::new(1),
            fixed_now(),
        )
    }

    #[test]
    fn happy_path_walks_forward() {
        let mut attempt = build_attempt();
        assert_eq!(attempt.status(), AttemptStatus::InProgress);
        attempt.complete().unwrap();
        attempt.record_score(500).unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Scored);
        assert_eq!(attempt.final_score(), Some(500));
    }

    #[test]
    fn scoring_requires_completion_first() {
        let mut attempt = build_attempt();
        let err = attempt.record_score(500).unwrap_err();
        assert!(matches!(err, AttemptError::InvalidTransition { .. }));
        assert_eq!(attempt.final_score(), None);
    }

    #[test]
    fn no_backward_transitions() {
        let mut attempt = build_attempt();
        attempt.complete().unwrap();
        assert!(attempt.complete().is_err());
        attempt.record_score(0).unwrap();
        assert!(attempt.complete().is_err());
    }

    #[test]
    fn score_above_scale_is_rejected() {
        let mut attempt = build_attempt();
        attempt.complete().unwrap();
        let err = attempt.record_score(1001).unwrap_err();
        assert_eq!(err, AttemptError::ScoreOutOfRange(1001));
        assert_eq!(attempt.status(), AttemptStatus::Completed);
    }

    #[test]
    fn status_round_trips_through_storage_tag() {
        for status in [
            AttemptStatus::NotStarted,
            AttemptStatus::InProgress,
            AttemptStatus::Completed,
            AttemptStatus::Scored,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
    }
}
