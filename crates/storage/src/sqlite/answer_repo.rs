use tryout_core::model::{Answer, AttemptId};

use super::SqliteRepository;
use super::mapping::{id_i64, map_answer_row};
use crate::repository::{AnswerRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn upsert_answer(&self, answer: &Answer) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO answers (attempt_id, question_id, answer_text, flagged)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                answer_text = excluded.answer_text,
                flagged = excluded.flagged
            ",
        )
        .bind(id_i64("attempt_id", answer.attempt_id().value())?)
        .bind(id_i64("question_id", answer.question_id().value())?)
        .bind(answer.text())
        .bind(answer.is_flagged())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT attempt_id, question_id, answer_text, flagged
            FROM answers
            WHERE attempt_id = ?1
            ORDER BY question_id ASC
            ",
        )
        .bind(id_i64("attempt_id", attempt_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_answer_row).collect()
    }
}
