//! Repository adapter for a hosted relational backend exposing PostgREST-style
//! row endpoints (one path per table, filters and ordering as query params).
//!
//! The services never see this module directly; it implements the same traits
//! as the SQLite adapter so the transport stays an implementation detail.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use tryout_core::model::{
    Answer, Attempt, AttemptId, AttemptStatus, LearnerId, Package, PackageId, Question,
    QuestionId, QuestionKind, Section, SectionId, SessionId, TryoutSession,
};

use crate::repository::{
    AnswerRepository, AttemptRepository, NewAttemptRecord, PackageRepository,
    QuestionRepository, SectionRepository, SessionRepository, Storage, StorageError,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Connection settings for the hosted backend.
#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RestConfig {
    /// Reads `TRYOUT_API_URL` / `TRYOUT_API_KEY`; `None` when unset so callers
    /// can fall back to a local database.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("TRYOUT_API_URL").ok()?;
        let api_key = env::var("TRYOUT_API_KEY").ok()?;
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        Some(Self { base_url, api_key })
    }
}

#[derive(Clone)]
pub struct RestRepository {
    client: Client,
    config: RestConfig,
}

//
// ─── WIRE ROWS ─────────────────────────────────────────────────────────────────
//

#[derive(Serialize, Deserialize)]
struct PackageRow {
    id: u64,
    name: String,
    description: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct SessionRow {
    id: u64,
    name: String,
    package_id: u64,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    active: bool,
}

#[derive(Serialize, Deserialize)]
struct SectionRow {
    id: u64,
    package_id: u64,
    name: String,
    duration_minutes: u32,
    order_index: u32,
}

#[derive(Serialize, Deserialize)]
struct QuestionRow {
    id: u64,
    section_id: u64,
    text: String,
    kind: String,
    options: Option<BTreeMap<String, String>>,
    correct_answer: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct AttemptRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    learner_id: String,
    package_id: u64,
    session_id: u64,
    status: String,
    final_score: Option<u16>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct AnswerRow {
    attempt_id: u64,
    question_id: u64,
    answer_text: Option<String>,
    flagged: bool,
}

impl PackageRow {
    fn from_domain(package: &Package) -> Self {
        Self {
            id: package.id().value(),
            name: package.name().to_owned(),
            description: package.description().map(str::to_owned),
            active: package.is_active(),
            created_at: package.created_at(),
        }
    }

    fn into_domain(self) -> Result<Package, StorageError> {
        Package::from_persisted(
            PackageId::new(self.id),
            self.name,
            self.description,
            self.active,
            self.created_at,
        )
        .map_err(ser)
    }
}

impl SessionRow {
    fn from_domain(session: &TryoutSession) -> Self {
        Self {
            id: session.id().value(),
            name: session.name().to_owned(),
            package_id: session.package_id().value(),
            starts_at: session.starts_at(),
            ends_at: session.ends_at(),
            active: session.is_active(),
        }
    }

    fn into_domain(self) -> Result<TryoutSession, StorageError> {
        TryoutSession::from_persisted(
            SessionId::new(self.id),
            self.name,
            PackageId::new(self.package_id),
            self.starts_at,
            self.ends_at,
            self.active,
        )
        .map_err(ser)
    }
}

impl SectionRow {
    fn from_domain(section: &Section) -> Self {
        Self {
            id: section.id().value(),
            package_id: section.package_id().value(),
            name: section.name().to_owned(),
            duration_minutes: section.duration_minutes(),
            order_index: section.order_index(),
        }
    }

    fn into_domain(self) -> Result<Section, StorageError> {
        Section::new(
            SectionId::new(self.id),
            PackageId::new(self.package_id),
            self.name,
            self.duration_minutes,
            self.order_index,
        )
        .map_err(ser)
    }
}

impl QuestionRow {
    fn from_domain(question: &Question) -> Self {
        Self {
            id: question.id().value(),
            section_id: question.section_id().value(),
            text: question.text().to_owned(),
            kind: question.kind().as_str().to_owned(),
            options: question.options().cloned(),
            correct_answer: question.correct_answer().to_owned(),
            created_at: question.created_at(),
        }
    }

    fn into_domain(self) -> Result<Question, StorageError> {
        let kind = QuestionKind::from_str(&self.kind).map_err(ser)?;
        Question::from_persisted(
            QuestionId::new(self.id),
            SectionId::new(self.section_id),
            self.text,
            kind,
            self.options,
            self.correct_answer,
            self.created_at,
        )
        .map_err(ser)
    }
}

impl AttemptRow {
    fn into_domain(self) -> Result<Attempt, StorageError> {
        let id = self.id.ok_or_else(|| {
            StorageError::Serialization("attempt row missing id".into())
        })?;
        let learner_id = LearnerId::from_str(&self.learner_id).map_err(ser)?;
        let status = AttemptStatus::from_str(&self.status).map_err(ser)?;
        Attempt::from_persisted(
            AttemptId::new(id),
            learner_id,
            PackageId::new(self.package_id),
            SessionId::new(self.session_id),
            status,
            self.final_score,
            self.created_at,
        )
        .map_err(ser)
    }
}

impl AnswerRow {
    fn from_domain(answer: &Answer) -> Self {
        Self {
            attempt_id: answer.attempt_id().value(),
            question_id: answer.question_id().value(),
            answer_text: answer.text().map(str::to_owned),
            flagged: answer.is_flagged(),
        }
    }

    fn into_domain(self) -> Answer {
        Answer::from_persisted(
            AttemptId::new(self.attempt_id),
            QuestionId::new(self.question_id),
            self.answer_text,
            self.flagged,
        )
    }
}

//
// ─── REQUEST PLUMBING ──────────────────────────────────────────────────────────
//

impl RestRepository {
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if query.is_empty() {
            format!("{base}/{table}")
        } else {
            format!("{base}/{table}?{query}")
        }
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, StorageError> {
        let response = self
            .client
            .get(self.table_url(table, query))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(conn)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "{table} read failed with status {status}"
            )));
        }
        response.json::<Vec<T>>().await.map_err(ser)
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<T, StorageError> {
        let mut rows = self.fetch_rows::<T>(table, query).await?;
        if rows.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(rows.swap_remove(0))
    }

    /// Upsert via POST with merge-duplicates resolution on the table's
    /// conflict target.
    async fn upsert_row<T: Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        row: &T,
    ) -> Result<(), StorageError> {
        let query = format!("on_conflict={on_conflict}");
        let response = self
            .client
            .post(self.table_url(table, &query))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await
            .map_err(conn)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "{table} upsert failed with status {status}"
            )));
        }
        Ok(())
    }

    async fn patch_rows<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        patch: &T,
    ) -> Result<u64, StorageError> {
        let response = self
            .client
            .patch(self.table_url(table, query))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(conn)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "{table} update failed with status {status}"
            )));
        }
        let rows: Vec<serde_json::Value> = response.json().await.map_err(ser)?;
        Ok(rows.len() as u64)
    }
}

//
// ─── TRAIT IMPLEMENTATIONS ─────────────────────────────────────────────────────
//

#[async_trait]
impl PackageRepository for RestRepository {
    async fn upsert_package(&self, package: &Package) -> Result<(), StorageError> {
        self.upsert_row("packages", "id", &PackageRow::from_domain(package))
            .await
    }

    async fn get_package(&self, id: PackageId) -> Result<Package, StorageError> {
        let row: PackageRow = self
            .fetch_one("packages", &format!("id=eq.{}", id.value()))
            .await?;
        row.into_domain()
    }

    async fn list_packages(&self, active_only: bool) -> Result<Vec<Package>, StorageError> {
        let query = if active_only {
            "active=eq.true&order=created_at.desc,id.asc"
        } else {
            "order=created_at.desc,id.asc"
        };
        let rows: Vec<PackageRow> = self.fetch_rows("packages", query).await?;
        rows.into_iter().map(PackageRow::into_domain).collect()
    }
}

#[async_trait]
impl SessionRepository for RestRepository {
    async fn upsert_session(&self, session: &TryoutSession) -> Result<(), StorageError> {
        self.upsert_row("tryout_sessions", "id", &SessionRow::from_domain(session))
            .await
    }

    async fn get_session(&self, id: SessionId) -> Result<TryoutSession, StorageError> {
        let row: SessionRow = self
            .fetch_one("tryout_sessions", &format!("id=eq.{}", id.value()))
            .await?;
        row.into_domain()
    }

    async fn list_open_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TryoutSession>, StorageError> {
        let query = format!(
            "active=eq.true&ends_at=gte.{}&order=starts_at.asc,id.asc",
            now.to_rfc3339()
        );
        let rows: Vec<SessionRow> = self.fetch_rows("tryout_sessions", &query).await?;
        rows.into_iter().map(SessionRow::into_domain).collect()
    }
}

#[async_trait]
impl SectionRepository for RestRepository {
    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError> {
        self.upsert_row("sections", "id", &SectionRow::from_domain(section))
            .await
    }

    async fn sections_for_package(
        &self,
        package_id: PackageId,
    ) -> Result<Vec<Section>, StorageError> {
        let query = format!(
            "package_id=eq.{}&order=order_index.asc",
            package_id.value()
        );
        let rows: Vec<SectionRow> = self.fetch_rows("sections", &query).await?;
        rows.into_iter().map(SectionRow::into_domain).collect()
    }
}

#[async_trait]
impl QuestionRepository for RestRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        self.upsert_row("questions", "id", &QuestionRow::from_domain(question))
            .await
    }

    async fn questions_for_section(
        &self,
        section_id: SectionId,
    ) -> Result<Vec<Question>, StorageError> {
        let query = format!(
            "section_id=eq.{}&order=created_at.asc,id.asc",
            section_id.value()
        );
        let rows: Vec<QuestionRow> = self.fetch_rows("questions", &query).await?;
        rows.into_iter().map(QuestionRow::into_domain).collect()
    }
}

#[async_trait]
impl AttemptRepository for RestRepository {
    async fn insert_attempt(&self, new: &NewAttemptRecord) -> Result<Attempt, StorageError> {
        let row = AttemptRow {
            id: None,
            learner_id: new.learner_id.to_string(),
            package_id: new.package_id.value(),
            session_id: new.session_id.value(),
            status: AttemptStatus::InProgress.as_str().to_owned(),
            final_score: None,
            created_at: new.created_at,
        };
        let response = self
            .client
            .post(self.table_url("attempts", ""))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(conn)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!(
                "attempts insert failed with status {status}"
            )));
        }
        let mut rows: Vec<AttemptRow> = response.json().await.map_err(ser)?;
        if rows.is_empty() {
            return Err(StorageError::Serialization(
                "attempts insert returned no representation".into(),
            ));
        }
        rows.swap_remove(0).into_domain()
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let row: AttemptRow = self
            .fetch_one("attempts", &format!("id=eq.{}", id.value()))
            .await?;
        row.into_domain()
    }

    async fn set_status(&self, id: AttemptId, status: AttemptStatus) -> Result<(), StorageError> {
        let patch = serde_json::json!({ "status": status.as_str() });
        let updated = self
            .patch_rows("attempts", &format!("id=eq.{}", id.value()), &patch)
            .await?;
        if updated == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn record_score(&self, id: AttemptId, score: u16) -> Result<(), StorageError> {
        let patch = serde_json::json!({
            "final_score": score,
            "status": AttemptStatus::Scored.as_str(),
        });
        let updated = self
            .patch_rows("attempts", &format!("id=eq.{}", id.value()), &patch)
            .await?;
        if updated == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn completed_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let query = format!(
            "session_id=eq.{}&status=eq.{}&order=id.asc",
            session_id.value(),
            AttemptStatus::Completed.as_str()
        );
        let rows: Vec<AttemptRow> = self.fetch_rows("attempts", &query).await?;
        rows.into_iter().map(AttemptRow::into_domain).collect()
    }

    async fn recent_for_learner(
        &self,
        learner_id: LearnerId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let query = format!(
            "learner_id=eq.{learner_id}&order=created_at.desc,id.desc&limit={limit}"
        );
        let rows: Vec<AttemptRow> = self.fetch_rows("attempts", &query).await?;
        rows.into_iter().map(AttemptRow::into_domain).collect()
    }
}

#[async_trait]
impl AnswerRepository for RestRepository {
    async fn upsert_answer(&self, answer: &Answer) -> Result<(), StorageError> {
        self.upsert_row(
            "answers",
            "attempt_id,question_id",
            &AnswerRow::from_domain(answer),
        )
        .await
    }

    async fn answers_for_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<Answer>, StorageError> {
        let query = format!(
            "attempt_id=eq.{}&order=question_id.asc",
            attempt_id.value()
        );
        let rows: Vec<AnswerRow> = self.fetch_rows("answers", &query).await?;
        Ok(rows.into_iter().map(AnswerRow::into_domain).collect())
    }
}

impl Storage {
    /// Build a `Storage` backed by the hosted backend.
    #[must_use]
    pub fn rest(config: RestConfig) -> Self {
        let repo = RestRepository::new(config);
        Self {
            packages: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            sections: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            answers: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tryout_core::time::fixed_now;

    #[test]
    fn wire_rows_round_trip_through_domain() {
        let package = Package::new(
            PackageId::new(3),
            "UTBK Soshum",
            Some("Humanities bundle".into()),
            fixed_now(),
        )
        .unwrap();
        let row = PackageRow::from_domain(&package);
        let json = serde_json::to_string(&row).unwrap();
        let back: PackageRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_domain().unwrap(), package);
    }

    #[test]
    fn attempt_row_requires_an_assigned_id() {
        let row = AttemptRow {
            id: None,
            learner_id: LearnerId::random().to_string(),
            package_id: 1,
            session_id: 1,
            status: "in_progress".into(),
            final_score: None,
            created_at: fixed_now(),
        };
        assert!(row.into_domain().is_err());
    }

    #[test]
    fn table_url_joins_query_strings() {
        let repo = RestRepository::new(RestConfig {
            base_url: "https://backend.example/rest/v1/".into(),
            api_key: "key".into(),
        });
        assert_eq!(
            repo.table_url("packages", "id=eq.1"),
            "https://backend.example/rest/v1/packages?id=eq.1"
        );
        assert_eq!(
            repo.table_url("packages", ""),
            "https://backend.example/rest/v1/packages"
        );
    }
}
