use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use progress_core::model::{
    LearnerId, ProgressKey, ProgressRecord, ProgressStatus, Statement,
};
use progress_core::time::fixed_clock;
use serde_json::{Value, json};
use services::{
    AppServices, IngestError, IngestObserver, IngestService, ProgressOutcome, ProgressQueryError,
    ProgressService, ProgressSource, ProgressWriteError, ServicesConfig,
};
use storage::repository::{
    InMemoryRepository, NewStatementRecord, ProgressRepository, ProgressUpsert, StatementFilter,
    StatementRecord, StatementRepository, Storage, StorageError,
};

fn statement(verb: &str, result: Option<Value>) -> Statement {
    let mut body = json!({
        "actor": { "account": { "name": "u1", "homePage": "https://sso.example.com" } },
        "verb": {
            "id": format!("http://adlnet.gov/expapi/verbs/{verb}"),
            "display": { "en-US": verb }
        },
        "object": { "id": "https://lms.example.com/courses/c-ethics-101" }
    });
    if let Some(result) = result {
        body["result"] = result;
    }
    Statement::from_value(body).unwrap()
}

fn ethics_history() -> Vec<Statement> {
    vec![
        statement("attempted", None),
        statement("attempted", Some(json!({ "score": { "scaled": 0.6 } }))),
        statement(
            "completed",
            Some(json!({ "completion": true, "success": true })),
        ),
    ]
}

/// Progress store that refuses every write.
struct BrokenProgress;

#[async_trait]
impl ProgressRepository for BrokenProgress {
    async fn upsert_progress(
        &self,
        _upsert: &ProgressUpsert,
    ) -> Result<ProgressRecord, StorageError> {
        Err(StorageError::Connection("progress store offline".into()))
    }

    async fn progress_for_learner(
        &self,
        _learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(Vec::new())
    }
}

/// Progress store that never answers in time.
struct StalledProgress;

#[async_trait]
impl ProgressRepository for StalledProgress {
    async fn upsert_progress(
        &self,
        _upsert: &ProgressUpsert,
    ) -> Result<ProgressRecord, StorageError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(StorageError::Connection("unreachable".into()))
    }

    async fn progress_for_learner(
        &self,
        _learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(Vec::new())
    }
}

/// Statement store that is down for both reads and writes.
struct OfflineStatements;

#[async_trait]
impl StatementRepository for OfflineStatements {
    async fn append_statement(&self, _record: NewStatementRecord) -> Result<i64, StorageError> {
        Err(StorageError::Connection("statement store offline".into()))
    }

    async fn list_statements(
        &self,
        _filter: &StatementFilter,
    ) -> Result<Vec<StatementRecord>, StorageError> {
        Err(StorageError::Connection("statement store offline".into()))
    }
}

#[derive(Default)]
struct RecordingObserver {
    failures: Mutex<Vec<(i64, ProgressKey)>>,
}

impl IngestObserver for RecordingObserver {
    fn progress_write_failed(
        &self,
        statement_id: i64,
        key: &ProgressKey,
        _error: &ProgressWriteError,
    ) {
        self.failures
            .lock()
            .unwrap()
            .push((statement_id, key.clone()));
    }
}

#[tokio::test]
async fn ethics_course_scenario_ends_completed() {
    let services = AppServices::from_storage(
        &Storage::in_memory(),
        fixed_clock(),
        ServicesConfig::default(),
    );

    for st in ethics_history() {
        services.ingest().ingest(st).await.unwrap();
    }

    let view = services
        .progress()
        .progress_for(&LearnerId::new("u1"))
        .await
        .unwrap();
    assert_eq!(view.source, ProgressSource::Stored);
    assert_eq!(view.items.len(), 1);
    let record = &view.items[0];
    assert_eq!(record.key.course_id.as_str(), "c-ethics-101");
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.score, Some(60));
    assert_eq!(record.success, Some(true));
}

#[tokio::test]
async fn stored_and_replayed_progress_agree() {
    let repo = InMemoryRepository::new();
    let ingest = IngestService::new(
        fixed_clock(),
        ServicesConfig::default(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );
    let progress = ProgressService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );

    let mut history = ethics_history();
    history.insert(
        1,
        Statement::from_value(json!({
            "actor": { "account": { "name": "u1" } },
            "verb": { "id": "http://adlnet.gov/expapi/verbs/attempted" },
            "object": { "id": "https://lms.example.com/courses/c-privacy-gdpr" },
            "result": { "score": { "scaled": 0.45 }, "success": false },
            "timestamp": "2024-02-01T10:00:00Z"
        }))
        .unwrap(),
    );
    history.push(statement("attempted", Some(json!({ "success": false }))));

    for st in history {
        ingest.ingest(st).await.unwrap();
    }

    let stored = progress.progress_for(&LearnerId::new("u1")).await.unwrap();
    let replayed = progress.replay(&LearnerId::new("u1")).await.unwrap();

    assert_eq!(stored.items.len(), replayed.len());
    for record in &replayed {
        let live = stored
            .items
            .iter()
            .find(|r| r.key == record.key)
            .expect("same courses");
        assert_eq!(live.derived_view(), record.derived_view());
    }
}

#[tokio::test]
async fn ingesting_the_same_statement_twice_changes_nothing_derived() {
    let services = AppServices::from_storage(
        &Storage::in_memory(),
        fixed_clock(),
        ServicesConfig::default(),
    );
    let st = statement(
        "attempted",
        Some(json!({ "score": { "scaled": 0.77 }, "success": true })),
    );

    let first = services.ingest().ingest(st.clone()).await.unwrap();
    let second = services.ingest().ingest(st).await.unwrap();

    assert_ne!(first.statement_id, second.statement_id);
    assert_eq!(
        first.progress.record().unwrap().derived_view(),
        second.progress.record().unwrap().derived_view()
    );
}

#[tokio::test]
async fn progress_failure_does_not_fail_ingestion_and_falls_back_to_replay() {
    let statements = InMemoryRepository::new();
    let observer = Arc::new(RecordingObserver::default());
    let ingest = IngestService::new(
        fixed_clock(),
        ServicesConfig::default(),
        Arc::new(statements.clone()),
        Arc::new(BrokenProgress),
    )
    .with_observer(observer.clone());

    let mut ids = Vec::new();
    for st in ethics_history() {
        let receipt = ingest.ingest(st).await.unwrap();
        assert!(matches!(
            receipt.progress,
            ProgressOutcome::Failed(ProgressWriteError::Storage(_))
        ));
        ids.push(receipt.statement_id);
    }

    let failures = observer.failures.lock().unwrap().clone();
    assert_eq!(
        failures.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        ids
    );

    let progress = ProgressService::new(
        fixed_clock(),
        Arc::new(statements),
        Arc::new(BrokenProgress),
    );
    let view = progress.progress_for(&LearnerId::new("u1")).await.unwrap();
    assert_eq!(view.source, ProgressSource::Replayed);
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].status, ProgressStatus::Completed);
    assert_eq!(view.items[0].score, Some(60));
    assert_eq!(view.items[0].success, Some(true));
}

#[tokio::test]
async fn stalled_progress_write_times_out() {
    let statements = InMemoryRepository::new();
    let config = ServicesConfig::default().with_progress_write_timeout(Duration::from_millis(20));
    let ingest = IngestService::new(
        fixed_clock(),
        config,
        Arc::new(statements),
        Arc::new(StalledProgress),
    );

    let receipt = ingest
        .ingest(statement("attempted", None))
        .await
        .unwrap();
    assert!(matches!(
        receipt.progress,
        ProgressOutcome::Failed(ProgressWriteError::TimedOut(_))
    ));
}

#[tokio::test]
async fn unknown_learner_has_no_progress() {
    let services = AppServices::from_storage(
        &Storage::in_memory(),
        fixed_clock(),
        ServicesConfig::default(),
    );
    let view = services
        .progress()
        .progress_for(&LearnerId::new("ghost"))
        .await
        .unwrap();
    assert_eq!(view.source, ProgressSource::Replayed);
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn failed_statement_write_fails_ingestion_and_skips_progress() {
    let progress = InMemoryRepository::new();
    let observer = Arc::new(RecordingObserver::default());
    let ingest = IngestService::new(
        fixed_clock(),
        ServicesConfig::default(),
        Arc::new(OfflineStatements),
        Arc::new(progress.clone()),
    )
    .with_observer(observer.clone());

    let err = ingest
        .ingest(statement("completed", Some(json!({ "completion": true }))))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Storage(_)));
    assert!(
        progress
            .progress_for_learner(&LearnerId::new("u1"))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(observer.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_statements_fail_the_fallback_query() {
    let progress = ProgressService::new(
        fixed_clock(),
        Arc::new(OfflineStatements),
        Arc::new(InMemoryRepository::new()),
    );

    let err = progress
        .progress_for(&LearnerId::new("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressQueryError::Storage(_)));
}

#[tokio::test]
async fn replay_over_sqlite_rebuilds_lost_progress() {
    let storage = Storage::sqlite("sqlite:file:ingest_flow_replay?mode=memory&cache=shared")
        .await
        .expect("sqlite storage");
    let ingest = IngestService::new(
        fixed_clock(),
        ServicesConfig::default(),
        Arc::clone(&storage.statements),
        Arc::new(BrokenProgress),
    );
    for st in ethics_history() {
        ingest.ingest(st).await.unwrap();
    }

    let progress = ProgressService::new(
        fixed_clock(),
        Arc::clone(&storage.statements),
        Arc::clone(&storage.progress),
    );
    let view = progress.progress_for(&LearnerId::new("u1")).await.unwrap();

    assert_eq!(view.source, ProgressSource::Replayed);
    assert_eq!(view.items.len(), 1);
    let record = &view.items[0];
    assert_eq!(record.key.course_id.as_str(), "c-ethics-101");
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.score, Some(60));
    assert_eq!(record.success, Some(true));
    assert!(
        storage
            .progress
            .progress_for_learner(&LearnerId::new("u1"))
            .await
            .unwrap()
            .is_empty()
    );
}
