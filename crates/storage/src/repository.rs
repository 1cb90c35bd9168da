use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::extract;
use progress_core::model::{
    CourseId, LearnerId, ProgressDelta, ProgressKey, ProgressRecord, Statement,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── STATEMENTS ────────────────────────────────────────────────────────────────
//

/// A statement ready to be appended, with its query columns already derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatementRecord {
    pub learner_id: Option<LearnerId>,
    pub course_id: Option<CourseId>,
    pub statement: Statement,
    pub received_at: DateTime<Utc>,
}

impl NewStatementRecord {
    /// Derive the learner/course query columns from the statement body.
    #[must_use]
    pub fn from_statement(statement: Statement, received_at: DateTime<Utc>) -> Self {
        Self {
            learner_id: extract::learner_id(&statement.actor),
            course_id: extract::course_id(&statement.object),
            statement,
            received_at,
        }
    }
}

/// A stored statement. `id` grows with arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRecord {
    pub id: i64,
    pub learner_id: Option<LearnerId>,
    pub course_id: Option<CourseId>,
    pub statement: Statement,
    pub received_at: DateTime<Utc>,
}

/// Which statements to list. `limit: None` returns every match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementFilter {
    pub learner_id: Option<LearnerId>,
    pub limit: Option<u32>,
}

impl StatementFilter {
    #[must_use]
    pub fn for_learner(learner_id: LearnerId) -> Self {
        Self {
            learner_id: Some(learner_id),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &StatementRecord) -> bool {
        self.learner_id
            .as_ref()
            .is_none_or(|wanted| record.learner_id.as_ref() == Some(wanted))
    }
}

#[async_trait]
pub trait StatementRepository: Send + Sync {
    /// Durably store a statement and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the statement cannot be stored.
    async fn append_statement(&self, record: NewStatementRecord) -> Result<i64, StorageError>;

    /// List statements in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn list_statements(
        &self,
        filter: &StatementFilter,
    ) -> Result<Vec<StatementRecord>, StorageError>;
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// One atomic merge-or-create against the progress store.
///
/// On insert the record starts from `ProgressRecord::empty(key, at)`, so
/// `created_at` is `at` and the status is `in_progress` unless the delta
/// completes. On update only the fields the delta carries change, and
/// `updated_at` becomes `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpsert {
    pub key: ProgressKey,
    pub delta: ProgressDelta,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Merge the delta into the record for its key, creating it if needed,
    /// and return the resulting record.
    ///
    /// Implementations must make this atomic per key: concurrent upserts for
    /// the same key may not lose each other's fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn upsert_progress(
        &self,
        upsert: &ProgressUpsert,
    ) -> Result<ProgressRecord, StorageError>;

    /// All stored records for a learner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn progress_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    statements: Arc<Mutex<Vec<StatementRecord>>>,
    progress: Arc<Mutex<HashMap<ProgressKey, ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatementRepository for InMemoryRepository {
    async fn append_statement(&self, record: NewStatementRecord) -> Result<i64, StorageError> {
        let mut guard = self
            .statements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("statement id overflow".into()))?
            + 1;
        guard.push(StatementRecord {
            id,
            learner_id: record.learner_id,
            course_id: record.course_id,
            statement: record.statement,
            received_at: record.received_at,
        });
        Ok(id)
    }

    async fn list_statements(
        &self,
        filter: &StatementFilter,
    ) -> Result<Vec<StatementRecord>, StorageError> {
        let guard = self
            .statements
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = filter
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(guard
            .iter()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(
        &self,
        upsert: &ProgressUpsert,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let existing = guard.remove(&upsert.key);
        let record = upsert
            .delta
            .apply_to(upsert.key.clone(), existing, upsert.at);
        guard.insert(upsert.key.clone(), record.clone());
        Ok(record)
    }

    async fn progress_for_learner(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<ProgressRecord> = guard
            .values()
            .filter(|record| &record.key.learner_id == learner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.course_id.cmp(&b.key.course_id))
        });
        Ok(found)
    }
}

/// Aggregates statement and progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub statements: Arc<dyn StatementRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let statements: Arc<dyn StatementRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            statements,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::ProgressStatus;
    use progress_core::time::fixed_now;
    use serde_json::json;

    fn key(learner: &str, course: &str) -> ProgressKey {
        ProgressKey::new(LearnerId::new(learner), CourseId::new(course))
    }

    fn statement_for(learner: &str, course: &str) -> Statement {
        Statement::from_value(json!({
            "actor": { "account": { "name": learner } },
            "verb": { "id": "http://adlnet.gov/expapi/verbs/attempted" },
            "object": { "id": format!("https://lms.example.com/courses/{course}") }
        }))
        .unwrap()
    }

    #[test]
    fn new_record_derives_query_columns() {
        let record = NewStatementRecord::from_statement(statement_for("u1", "c1"), fixed_now());
        assert_eq!(record.learner_id, Some(LearnerId::new("u1")));
        assert_eq!(record.course_id, Some(CourseId::new("c1")));
    }

    #[tokio::test]
    async fn statements_list_in_arrival_order_with_filter_and_limit() {
        let repo = InMemoryRepository::new();
        for (learner, course) in [("u1", "c1"), ("u2", "c1"), ("u1", "c2"), ("u1", "c3")] {
            repo.append_statement(NewStatementRecord::from_statement(
                statement_for(learner, course),
                fixed_now(),
            ))
            .await
            .unwrap();
        }

        let all = repo
            .list_statements(&StatementFilter::default())
            .await
            .unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let u1 = repo
            .list_statements(&StatementFilter::for_learner(LearnerId::new("u1")).with_limit(2))
            .await
            .unwrap();
        let courses: Vec<_> = u1
            .iter()
            .filter_map(|r| r.course_id.as_ref().map(CourseId::as_str))
            .collect();
        assert_eq!(courses, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_record() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let later = now + chrono::Duration::minutes(1);

        repo.upsert_progress(&ProgressUpsert {
            key: key("u1", "c1"),
            delta: ProgressDelta {
                score: Some(60),
                ..ProgressDelta::default()
            },
            at: now,
        })
        .await
        .unwrap();

        let record = repo
            .upsert_progress(&ProgressUpsert {
                key: key("u1", "c1"),
                delta: ProgressDelta {
                    completed: true,
                    success: Some(true),
                    ..ProgressDelta::default()
                },
                at: later,
            })
            .await
            .unwrap();

        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.score, Some(60));
        assert_eq!(record.success, Some(true));
        assert_eq!(record.created_at, now);
        assert_eq!(record.updated_at, later);
    }

    #[tokio::test]
    async fn upserts_for_one_key_leave_other_keys_alone() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();

        repo.upsert_progress(&ProgressUpsert {
            key: key("u2", "c2"),
            delta: ProgressDelta {
                score: Some(10),
                ..ProgressDelta::default()
            },
            at: now,
        })
        .await
        .unwrap();
        repo.upsert_progress(&ProgressUpsert {
            key: key("u1", "c1"),
            delta: ProgressDelta {
                completed: true,
                score: Some(95),
                ..ProgressDelta::default()
            },
            at: now,
        })
        .await
        .unwrap();

        let other = repo
            .progress_for_learner(&LearnerId::new("u2"))
            .await
            .unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].score, Some(10));
        assert_eq!(other[0].status, ProgressStatus::InProgress);
    }
}
