use super::{
    SqliteRepository,
    mapping::{map_statement_row, statement_to_json},
};
use crate::repository::{
    NewStatementRecord, StatementFilter, StatementRecord, StatementRepository, StorageError,
};

#[async_trait::async_trait]
impl StatementRepository for SqliteRepository {
    async fn append_statement(&self, record: NewStatementRecord) -> Result<i64, StorageError> {
        let payload = statement_to_json(&record.statement)?;

        let res = sqlx::query(
            r"
                INSERT INTO statements (learner_id, course_id, payload, stored_by, received_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(record.learner_id.as_ref().map(|id| id.as_str().to_owned()))
        .bind(record.course_id.as_ref().map(|id| id.as_str().to_owned()))
        .bind(payload)
        .bind(record.statement.stored_by.as_str())
        .bind(record.received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn list_statements(
        &self,
        filter: &StatementFilter,
    ) -> Result<Vec<StatementRecord>, StorageError> {
        let mut sql = String::from(
            r"
                SELECT id, learner_id, course_id, payload, received_at
                FROM statements
            ",
        );

        let mut bind_index = 1;
        if filter.learner_id.is_some() {
            sql.push_str(" WHERE learner_id = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        sql.push_str(" ORDER BY id ASC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
            sql.push_str(&bind_index.to_string());
        }

        let mut query = sqlx::query(&sql);
        if let Some(learner_id) = &filter.learner_id {
            query = query.bind(learner_id.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_statement_row(&row)?);
        }
        Ok(out)
    }
}
