use progress_core::model::ProgressKey;

use crate::error::ProgressWriteError;

/// Receives notice of progress writes that were dropped during ingestion.
///
/// The statement itself is already stored when these fire; the callback is
/// only there so the lost index update is visible somewhere.
pub trait IngestObserver: Send + Sync {
    fn progress_write_failed(
        &self,
        statement_id: i64,
        key: &ProgressKey,
        error: &ProgressWriteError,
    );
}

/// Default observer: a `warn!` event per dropped write.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn progress_write_failed(
        &self,
        statement_id: i64,
        key: &ProgressKey,
        error: &ProgressWriteError,
    ) {
        tracing::warn!(
            statement_id,
            learner_id = %key.learner_id,
            course_id = %key.course_id,
            error = %error,
            "progress index not updated"
        );
    }
}
