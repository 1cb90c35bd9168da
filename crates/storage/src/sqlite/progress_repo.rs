use progress_core::model::{LearnerId, ProgressRecord};

use super::{SqliteRepository, mapping::map_progress_row};
use crate::repository::{ProgressRepository, ProgressUpsert, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    // A single upsert statement, so concurrent writers for one key are
    // serialized by SQLite and each sees the other's columns.
    async fn upsert_progress(
        &self,
        upsert: &ProgressUpsert,
    ) -> Result<ProgressRecord, StorageError> {
        let delta = &upsert.delta;

        let row = sqlx::query(
            r"
                INSERT INTO progress (
                    learner_id, course_id, status, score, success,
                    last_event_time, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(learner_id, course_id) DO UPDATE SET
                    status = CASE
                        WHEN excluded.status = 'completed' THEN 'completed'
                        ELSE progress.status
                    END,
                    score = COALESCE(excluded.score, progress.score),
                    success = COALESCE(excluded.success, progress.success),
                    last_event_time = COALESCE(excluded.last_event_time, progress.last_event_time),
                    updated_at = excluded.updated_at
                RETURNING
                    learner_id, course_id, status, score, success,
                    last_event_time, created_at, updated_at
            ",
        )
        .bind(upsert.key.learner_id.as_str())
        .bind(upsert.key.course_id.as_str())
        .bind(delta.insert_status().as_str())
        .bind(delta.score.map(i64::from))
        .bind(delta.success)
        .bind(delta.event_time.as_deref())
        .bind(upsert.at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let record = map_progress_row(&row)?;
        tracing::debug!(key = %record.key, status = %record.status, "progress upserted");
        Ok(record)
    }

    async fn progress_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    learner_id, course_id, status, score, success,
                    last_event_time, created_at, updated_at
                FROM progress
                WHERE learner_id = ?1
                ORDER BY created_at ASC, course_id ASC
            ",
        )
        .bind(learner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}
