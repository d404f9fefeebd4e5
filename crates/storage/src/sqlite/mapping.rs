use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;

use tryout_core::model::{
    Answer, Attempt, AttemptId, AttemptStatus, LearnerId, Package, PackageId, Question,
    QuestionId, QuestionKind, Section, SectionId, SessionId, TryoutSession,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn package_id_from_i64(v: i64) -> Result<PackageId, StorageError> {
    Ok(PackageId::new(i64_to_u64("package_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn section_id_from_i64(v: i64) -> Result<SectionId, StorageError> {
    Ok(SectionId::new(i64_to_u64("section_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

pub(crate) fn map_package_row(row: &sqlx::sqlite::SqliteRow) -> Result<Package, StorageError> {
    Package::from_persisted(
        package_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        row.try_get::<bool, _>("active").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TryoutSession, StorageError> {
    TryoutSession::from_persisted(
        session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        package_id_from_i64(row.try_get::<i64, _>("package_id").map_err(ser)?)?,
        row.try_get("starts_at").map_err(ser)?,
        row.try_get("ends_at").map_err(ser)?,
        row.try_get::<bool, _>("active").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_section_row(row: &sqlx::sqlite::SqliteRow) -> Result<Section, StorageError> {
    let duration_i64: i64 = row.try_get("duration_minutes").map_err(ser)?;
    let duration = u32::try_from(duration_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid duration: {duration_i64}")))?;
    let order_i64: i64 = row.try_get("order_index").map_err(ser)?;
    let order_index = u32::try_from(order_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid order_index: {order_i64}")))?;

    Section::new(
        section_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        package_id_from_i64(row.try_get::<i64, _>("package_id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        duration,
        order_index,
    )
    .map_err(ser)
}

pub(crate) fn options_to_json(
    options: Option<&BTreeMap<String, String>>,
) -> Result<Option<String>, StorageError> {
    options
        .map(|map| serde_json::to_string(map).map_err(ser))
        .transpose()
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let kind = QuestionKind::from_str(&kind_str).map_err(ser)?;

    let options = row
        .try_get::<Option<String>, _>("options")
        .map_err(ser)?
        .map(|raw| serde_json::from_str::<BTreeMap<String, String>>(&raw).map_err(ser))
        .transpose()?;

    Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        section_id_from_i64(row.try_get::<i64, _>("section_id").map_err(ser)?)?,
        row.try_get::<String, _>("text").map_err(ser)?,
        kind,
        options,
        row.try_get::<String, _>("correct_answer").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<Attempt, StorageError> {
    let learner_raw: String = row.try_get("learner_id").map_err(ser)?;
    let learner_id = LearnerId::from_str(&learner_raw).map_err(ser)?;

    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = AttemptStatus::from_str(&status_str).map_err(ser)?;

    let final_score = row
        .try_get::<Option<i64>, _>("final_score")
        .map_err(ser)?
        .map(|v| {
            u16::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid final_score: {v}")))
        })
        .transpose()?;

    Attempt::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        learner_id,
        package_id_from_i64(row.try_get::<i64, _>("package_id").map_err(ser)?)?,
        session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(ser)?)?,
        status,
        final_score,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<Answer, StorageError> {
    Ok(Answer::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?,
        question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        row.try_get::<Option<String>, _>("answer_text").map_err(ser)?,
        row.try_get::<bool, _>("flagged").map_err(ser)?,
    ))
}
