use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{PackageId, SessionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session name cannot be empty")]
    EmptyName,

    #[error("session window ends before it starts")]
    InvalidWindow,
}

/// A scheduled window during which learners may attempt a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryoutSession {
    id: SessionId,
    name: String,
    package_id: PackageId,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    active: bool,
}

impl TryoutSession {
    /// Creates a new session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyName` for a blank name and
    /// `SessionError::InvalidWindow` when `ends_at` precedes `starts_at`.
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        package_id: PackageId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SessionError::EmptyName);
        }
        if ends_at < starts_at {
            return Err(SessionError::InvalidWindow);
        }
        Ok(Self {
            id,
            name,
            package_id,
            starts_at,
            ends_at,
            active: true,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Same validation as [`TryoutSession::new`].
    pub fn from_persisted(
        id: SessionId,
        name: impl Into<String>,
        package_id: PackageId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        active: bool,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(id, name, package_id, starts_at, ends_at)?;
        session.active = active;
        Ok(session)
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// True when the schedule window contains `now`, both ends inclusive.
    ///
    /// This is the precondition for starting an attempt.
    #[must_use]
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    /// True when the session should appear in learner-facing listings:
    /// active and not yet past its end.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.active && now <= self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn build_session(starts_in: i64, ends_in: i64) -> TryoutSession {
        let now = fixed_now();
        TryoutSession::new(
            SessionId::new(1),
            "May Tryout",
            PackageId::new(1),
            now + Duration::hours(starts_in),
            now + Duration::hours(ends_in),
        )
        .unwrap()
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let session = build_session(0, 24);
        assert!(session.window_contains(session.starts_at()));
        assert!(session.window_contains(session.ends_at()));
        assert!(!session.window_contains(session.ends_at() + Duration::seconds(1)));
    }

    #[test]
    fn upcoming_session_is_open_but_not_startable() {
        let session = build_session(2, 24);
        let now = fixed_now();
        assert!(session.is_open_at(now));
        assert!(!session.window_contains(now));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = fixed_now();
        let err = TryoutSession::new(
            SessionId::new(1),
            "Broken",
            PackageId::new(1),
            now,
            now - Duration::hours(1),
        )
        .unwrap_err();
        assert_eq!(err, SessionError::InvalidWindow);
    }

    #[test]
    fn inactive_session_is_not_open() {
        let mut session = build_session(0, 24);
        session.set_active(false);
        assert!(!session.is_open_at(fixed_now()));
    }
}
