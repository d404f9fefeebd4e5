use tryout_core::model::{Attempt, AttemptId, AttemptStatus, LearnerId, SessionId};

use super::SqliteRepository;
use super::mapping::{attempt_id_from_i64, id_i64, map_attempt_row};
use crate::repository::{AttemptRepository, NewAttemptRecord, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, new: &NewAttemptRecord) -> Result<Attempt, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO attempts (learner_id, package_id, session_id, status, final_score, created_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5)
            ",
        )
        .bind(new.learner_id.to_string())
        .bind(id_i64("package_id", new.package_id.value())?)
        .bind(id_i64("session_id", new.session_id.value())?)
        .bind(AttemptStatus::InProgress.as_str())
        .bind(new.created_at)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        let id = attempt_id_from_i64(result.last_insert_rowid())?;
        Ok(Attempt::started(
            id,
            new.learner_id,
            new.package_id,
            new.session_id,
            new.created_at,
        ))
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, learner_id, package_id, session_id, status, final_score, created_at
            FROM attempts
            WHERE id = ?1
            ",
        )
        .bind(id_i64("attempt_id", id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_attempt_row(&row)
    }

    async fn set_status(&self, id: AttemptId, status: AttemptStatus) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE attempts SET status = ?2 WHERE id = ?1")
            .bind(id_i64("attempt_id", id.value())?)
            .bind(status.as_str())
            .execute(self.pool())
            .await
            .map_err(conn)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn record_score(&self, id: AttemptId, score: u16) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE attempts SET final_score = ?2, status = ?3 WHERE id = ?1",
        )
        .bind(id_i64("attempt_id", id.value())?)
        .bind(i64::from(score))
        .bind(AttemptStatus::Scored.as_str())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn completed_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, learner_id, package_id, session_id, status, final_score, created_at
            FROM attempts
            WHERE session_id = ?1
              AND status = ?2
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("session_id", session_id.value())?)
        .bind(AttemptStatus::Completed.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_attempt_row).collect()
    }

    async fn recent_for_learner(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, learner_id, package_id, session_id, status, final_score, created_at
            FROM attempts
            WHERE learner_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(learner_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_attempt_row).collect()
    }
}
