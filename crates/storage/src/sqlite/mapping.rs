use progress_core::model::{
    CourseId, LearnerId, ProgressKey, ProgressRecord, ProgressStatus, Statement,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{StatementRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn statement_to_json(statement: &Statement) -> Result<String, StorageError> {
    serde_json::to_string(statement).map_err(ser)
}

pub(crate) fn map_statement_row(row: &SqliteRow) -> Result<StatementRecord, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    let statement: Statement = serde_json::from_str(&payload).map_err(ser)?;

    Ok(StatementRecord {
        id: row.try_get("id").map_err(ser)?,
        learner_id: row
            .try_get::<Option<String>, _>("learner_id")
            .map_err(ser)?
            .map(LearnerId::new),
        course_id: row
            .try_get::<Option<String>, _>("course_id")
            .map_err(ser)?
            .map(CourseId::new),
        statement,
        received_at: row.try_get("received_at").map_err(ser)?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let key = ProgressKey::new(
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
    );
    let status: ProgressStatus = row
        .try_get::<String, _>("status")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    ProgressRecord::from_persisted(
        key,
        status,
        row.try_get("score").map_err(ser)?,
        row.try_get("success").map_err(ser)?,
        row.try_get("last_event_time").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
