//! SQLite adapters for the content side of the catalog: packages, sessions,
//! sections, and questions.

use chrono::{DateTime, Utc};

use tryout_core::model::{
    Package, PackageId, Question, Section, SectionId, SessionId, TryoutSession,
};

use super::SqliteRepository;
use super::mapping::{
    id_i64, map_package_row, map_question_row, map_section_row, map_session_row, options_to_json,
};
use crate::repository::{
    PackageRepository, QuestionRepository, SectionRepository, SessionRepository, StorageError,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl PackageRepository for SqliteRepository {
    async fn upsert_package(&self, package: &Package) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO packages (id, name, description, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                -- created_at is immutable after the first insert
                name = excluded.name,
                description = excluded.description,
                active = excluded.active
            ",
        )
        .bind(id_i64("package_id", package.id().value())?)
        .bind(package.name())
        .bind(package.description())
        .bind(package.is_active())
        .bind(package.created_at())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_package(&self, id: PackageId) -> Result<Package, StorageError> {
        let row = sqlx::query(
            "SELECT id, name, description, active, created_at FROM packages WHERE id = ?1",
        )
        .bind(id_i64("package_id", id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_package_row(&row)
    }

    async fn list_packages(&self, active_only: bool) -> Result<Vec<Package>, StorageError> {
        let sql = if active_only {
            r"
            SELECT id, name, description, active, created_at
            FROM packages
            WHERE active = 1
            ORDER BY created_at DESC, id ASC
            "
        } else {
            r"
            SELECT id, name, description, active, created_at
            FROM packages
            ORDER BY created_at DESC, id ASC
            "
        };
        let rows = sqlx::query(sql)
            .fetch_all(self.pool())
            .await
            .map_err(conn)?;
        rows.iter().map(map_package_row).collect()
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn upsert_session(&self, session: &TryoutSession) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO tryout_sessions (id, name, package_id, starts_at, ends_at, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                package_id = excluded.package_id,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                active = excluded.active
            ",
        )
        .bind(id_i64("session_id", session.id().value())?)
        .bind(session.name())
        .bind(id_i64("package_id", session.package_id().value())?)
        .bind(session.starts_at())
        .bind(session.ends_at())
        .bind(session.is_active())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<TryoutSession, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, name, package_id, starts_at, ends_at, active
            FROM tryout_sessions
            WHERE id = ?1
            ",
        )
        .bind(id_i64("session_id", id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_session_row(&row)
    }

    async fn list_open_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TryoutSession>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, package_id, starts_at, ends_at, active
            FROM tryout_sessions
            WHERE active = 1
              AND ends_at >= ?1
            ORDER BY starts_at ASC, id ASC
            ",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_session_row).collect()
    }
}

#[async_trait::async_trait]
impl SectionRepository for SqliteRepository {
    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO sections (id, package_id, name, duration_minutes, order_index)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                package_id = excluded.package_id,
                name = excluded.name,
                duration_minutes = excluded.duration_minutes,
                order_index = excluded.order_index
            ",
        )
        .bind(id_i64("section_id", section.id().value())?)
        .bind(id_i64("package_id", section.package_id().value())?)
        .bind(section.name())
        .bind(i64::from(section.duration_minutes()))
        .bind(i64::from(section.order_index()))
        .execute(self.pool())
        .await
        .map_err(|e| match e.as_database_error() {
            // UNIQUE(package_id, order_index) collisions are caller errors,
            // not connectivity failures.
            Some(db) if db.is_unique_violation() => StorageError::Conflict,
            _ => conn(e),
        })?;
        Ok(())
    }

    async fn sections_for_package(
        &self,
        package_id: PackageId,
    ) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, package_id, name, duration_minutes, order_index
            FROM sections
            WHERE package_id = ?1
            ORDER BY order_index ASC
            ",
        )
        .bind(id_i64("package_id", package_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_section_row).collect()
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options_json = options_to_json(question.options())?;
        sqlx::query(
            r"
            INSERT INTO questions (id, section_id, text, kind, options, correct_answer, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                section_id = excluded.section_id,
                text = excluded.text,
                kind = excluded.kind,
                options = excluded.options,
                correct_answer = excluded.correct_answer
            ",
        )
        .bind(id_i64("question_id", question.id().value())?)
        .bind(id_i64("section_id", question.section_id().value())?)
        .bind(question.text())
        .bind(question.kind().as_str())
        .bind(options_json)
        .bind(question.correct_answer())
        .bind(question.created_at())
        .execute(self.pool())
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn questions_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, section_id, text, kind, options, correct_answer, created_at
            FROM questions
            WHERE section_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(id_i64("section_id", section_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;
        rows.iter().map(map_question_row).collect()
    }
}
