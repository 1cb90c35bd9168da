use std::sync::Arc;

use progress_core::extract::{ProgressSignal, extract};
use progress_core::model::{ProgressRecord, Statement};
use progress_core::reduce::SkipReason;
use storage::repository::{
    NewStatementRecord, ProgressRepository, ProgressUpsert, StatementRepository,
};

use crate::Clock;
use crate::config::ServicesConfig;
use crate::error::{IngestError, ProgressWriteError};
use crate::observer::{IngestObserver, TracingObserver};

//
// ─── RECEIPT ───────────────────────────────────────────────────────────────────
//

/// What happened to the progress index for an ingested statement.
#[derive(Debug)]
pub enum ProgressOutcome {
    Updated(ProgressRecord),
    Skipped(SkipReason),
    Failed(ProgressWriteError),
}

impl ProgressOutcome {
    #[must_use]
    pub fn record(&self) -> Option<&ProgressRecord> {
        match self {
            ProgressOutcome::Updated(record) => Some(record),
            _ => None,
        }
    }
}

/// Acknowledgement for a stored statement.
///
/// `statement_id` proves the primary write succeeded; `progress` reports the
/// secondary index write separately.
#[derive(Debug)]
pub struct IngestReceipt {
    pub statement_id: i64,
    pub signal: ProgressSignal,
    pub progress: ProgressOutcome,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Stores statements and keeps the per-course progress index current.
#[derive(Clone)]
pub struct IngestService {
    clock: Clock,
    config: ServicesConfig,
    statements: Arc<dyn StatementRepository>,
    progress: Arc<dyn ProgressRepository>,
    observer: Arc<dyn IngestObserver>,
}

impl IngestService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: ServicesConfig,
        statements: Arc<dyn StatementRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            config,
            statements,
            progress,
            observer: Arc::new(TracingObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Store a statement, then fold it into the learner's progress.
    ///
    /// The progress write is best effort: once the statement is stored this
    /// returns `Ok`, and a failed or timed-out progress write is reported
    /// through the receipt and the observer.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Statement` if the statement lacks its actor, verb
    /// or object, and `IngestError::Storage` if it cannot be stored.
    pub async fn ingest(&self, statement: Statement) -> Result<IngestReceipt, IngestError> {
        statement.validate()?;

        let received_at = self.clock.now();
        let signal = extract(&statement);
        let statement_id = self
            .statements
            .append_statement(NewStatementRecord {
                learner_id: signal.learner_id.clone(),
                course_id: signal.course_id.clone(),
                statement,
                received_at,
            })
            .await?;

        let progress = self.update_progress(statement_id, &signal).await;
        Ok(IngestReceipt {
            statement_id,
            signal,
            progress,
        })
    }

    async fn update_progress(&self, statement_id: i64, signal: &ProgressSignal) -> ProgressOutcome {
        let key = match signal.key() {
            Ok(key) => key,
            Err(reason) => {
                tracing::debug!(statement_id, %reason, "statement skipped for progress");
                return ProgressOutcome::Skipped(reason);
            }
        };

        let upsert = ProgressUpsert {
            key,
            delta: signal.delta(),
            at: self.clock.now(),
        };
        let timeout = self.config.progress_write_timeout;

        let write = tokio::time::timeout(timeout, self.progress.upsert_progress(&upsert));
        let error = match write.await {
            Ok(Ok(record)) => return ProgressOutcome::Updated(record),
            Ok(Err(err)) => ProgressWriteError::Storage(err),
            Err(_) => ProgressWriteError::TimedOut(timeout),
        };

        self.observer
            .progress_write_failed(statement_id, &upsert.key, &error);
        ProgressOutcome::Failed(error)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{LearnerId, ProgressStatus, StatementError};
    use progress_core::time::fixed_clock;
    use serde_json::json;
    use storage::repository::{InMemoryRepository, StatementFilter};

    fn service(repo: &InMemoryRepository) -> IngestService {
        IngestService::new(
            fixed_clock(),
            ServicesConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn ingest_stores_statement_and_progress() {
        let repo = InMemoryRepository::new();
        let receipt = service(&repo)
            .ingest(
                Statement::from_value(json!({
                    "actor": { "mbox": "mailto:u1@example.com" },
                    "verb": { "display": { "en-US": "completed" } },
                    "object": { "id": "https://lms.example.com/c-code-of-conduct" },
                    "result": { "score": { "scaled": 0.92 }, "success": true }
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.statement_id, 1);
        let record = receipt.progress.record().expect("progress updated");
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.score, Some(92));
        assert_eq!(record.success, Some(true));

        let stored = repo
            .list_statements(&StatementFilter::for_learner(LearnerId::new(
                "mailto:u1@example.com",
            )))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn statement_without_course_is_stored_but_skipped() {
        let repo = InMemoryRepository::new();
        let receipt = service(&repo)
            .ingest(
                Statement::from_value(json!({
                    "actor": { "account": { "name": "u1" } },
                    "verb": { "id": "http://adlnet.gov/expapi/verbs/completed" },
                    "object": { "objectType": "Activity" }
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        assert!(matches!(
            receipt.progress,
            ProgressOutcome::Skipped(SkipReason::MissingCourse)
        ));
        assert!(
            repo.progress_for_learner(&LearnerId::new("u1"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn structurally_invalid_statement_is_rejected_before_storage() {
        let repo = InMemoryRepository::new();
        let err = service(&repo)
            .ingest(Statement::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Statement(StatementError::MissingField("actor"))
        ));
        assert!(
            repo.list_statements(&StatementFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
