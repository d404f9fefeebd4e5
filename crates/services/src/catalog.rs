use std::sync::Arc;

use chrono::{DateTime, Utc};

use storage::repository::{
    AttemptRepository, PackageRepository, SessionRepository, Storage,
};
use tryout_core::Clock;
use tryout_core::model::{AttemptId, AttemptStatus, SessionId};

use crate::auth::AuthSession;
use crate::error::CatalogError;

/// An open session with its package resolved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSessionItem {
    pub session_id: SessionId,
    pub session_name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub package_name: String,
    pub package_description: Option<String>,
}

/// One row of the learner's attempt history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptListItem {
    pub attempt_id: AttemptId,
    pub status: AttemptStatus,
    pub final_score: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub package_name: String,
    pub session_name: String,
}

/// Dashboard tiles for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptStats {
    pub total: u32,
    pub scored: u32,
    pub average_score: Option<u16>,
}

/// Learner-facing listing queries: open sessions, attempt history, stats.
///
/// Hides repositories and the time source from the presentation layer.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    packages: Arc<dyn PackageRepository>,
    sessions: Arc<dyn SessionRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            packages: Arc::clone(&storage.packages),
            sessions: Arc::clone(&storage.sessions),
            attempts: Arc::clone(&storage.attempts),
        }
    }

    /// Sessions a learner could join right now or soon: active, not yet
    /// ended, soonest start first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` on repository failures.
    pub async fn open_sessions(&self) -> Result<Vec<OpenSessionItem>, CatalogError> {
        let now = self.clock.now();
        let sessions = self.sessions.list_open_sessions(now).await?;

        let mut items = Vec::with_capacity(sessions.len());
        for session in sessions {
            let package = self.packages.get_package(session.package_id()).await?;
            items.push(OpenSessionItem {
                session_id: session.id(),
                session_name: session.name().to_owned(),
                starts_at: session.starts_at(),
                ends_at: session.ends_at(),
                package_name: package.name().to_owned(),
                package_description: package.description().map(str::to_owned),
            });
        }
        Ok(items)
    }

    /// The signed-in learner's most recent attempts with names resolved.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Auth` without a learner and
    /// `CatalogError::Storage` on repository failures.
    pub async fn recent_attempts(
        &self,
        auth: &AuthSession,
        limit: u32,
    ) -> Result<Vec<AttemptListItem>, CatalogError> {
        let learner_id = auth.require_learner()?;
        let attempts = self.attempts.recent_for_learner(learner_id, limit).await?;

        let mut items = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let package = self.packages.get_package(attempt.package_id()).await?;
            let session = self.sessions.get_session(attempt.session_id()).await?;
            items.push(AttemptListItem {
                attempt_id: attempt.id(),
                status: attempt.status(),
                final_score: attempt.final_score(),
                created_at: attempt.created_at(),
                package_name: package.name().to_owned(),
                session_name: session.name().to_owned(),
            });
        }
        Ok(items)
    }

    /// Attempt counts and mean score for the dashboard tiles.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Auth` without a learner and
    /// `CatalogError::Storage` on repository failures.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn attempt_stats(&self, auth: &AuthSession) -> Result<AttemptStats, CatalogError> {
        let learner_id = auth.require_learner()?;
        let attempts = self
            .attempts
            .recent_for_learner(learner_id, u32::MAX)
            .await?;

        let mut stats = AttemptStats {
            total: attempts.len() as u32,
            ..AttemptStats::default()
        };
        let mut score_sum: u64 = 0;
        for attempt in &attempts {
            if let Some(score) = attempt.final_score() {
                stats.scored += 1;
                score_sum += u64::from(score);
            }
        }
        if stats.scored > 0 {
            stats.average_score = Some((score_sum / u64::from(stats.scored)) as u16);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use chrono::Duration;
    use storage::repository::NewAttemptRecord;
    use tryout_core::model::{LearnerId, Package, PackageId, TryoutSession};
    use tryout_core::time::{fixed_clock, fixed_now};

    async fn seed_storage() -> Storage {
        let storage = Storage::in_memory();
        let now = fixed_now();

        let package = Package::new(
            PackageId::new(1),
            "UTBK Saintek",
            Some("Science bundle".into()),
            now,
        )
        .unwrap();
        storage.packages.upsert_package(&package).await.unwrap();

        let open = TryoutSession::new(
            SessionId::new(1),
            "May Tryout",
            package.id(),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .unwrap();
        let ended = TryoutSession::new(
            SessionId::new(2),
            "April Tryout",
            package.id(),
            now - Duration::days(30),
            now - Duration::days(25),
        )
        .unwrap();
        storage.sessions.upsert_session(&open).await.unwrap();
        storage.sessions.upsert_session(&ended).await.unwrap();

        storage
    }

    #[tokio::test]
    async fn open_sessions_resolve_package_names() {
        let storage = seed_storage().await;
        let catalog = CatalogService::new(fixed_clock(), &storage);

        let items = catalog.open_sessions().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].session_name, "May Tryout");
        assert_eq!(items[0].package_name, "UTBK Saintek");
    }

    #[tokio::test]
    async fn stats_average_only_scored_attempts() {
        let storage = seed_storage().await;
        let learner_id = LearnerId::random();
        let auth = AuthSession::signed_in(Identity::learner(learner_id, "learner@example.com"));

        for score in [Some(600_u16), Some(800), None] {
            let attempt = storage
                .attempts
                .insert_attempt(&NewAttemptRecord {
                    learner_id,
                    package_id: PackageId::new(1),
                    session_id: SessionId::new(1),
                    created_at: fixed_now(),
                })
                .await
                .unwrap();
            if let Some(score) = score {
                storage
                    .attempts
                    .set_status(attempt.id(), AttemptStatus::Completed)
                    .await
                    .unwrap();
                storage.attempts.record_score(attempt.id(), score).await.unwrap();
            }
        }

        let catalog = CatalogService::new(fixed_clock(), &storage);
        let stats = catalog.attempt_stats(&auth).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.scored, 2);
        assert_eq!(stats.average_score, Some(700));
    }

    #[tokio::test]
    async fn recent_attempts_require_identity() {
        let storage = seed_storage().await;
        let catalog = CatalogService::new(fixed_clock(), &storage);
        assert!(
            catalog
                .recent_attempts(&AuthSession::anonymous(), 5)
                .await
                .is_err()
        );
    }
}
