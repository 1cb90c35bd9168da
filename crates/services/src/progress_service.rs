use std::sync::Arc;

use serde::Serialize;

use progress_core::extract::{ProgressSignal, extract};
use progress_core::model::{LearnerId, ProgressRecord};
use progress_core::reduce::reduce_all;
use storage::repository::{ProgressRepository, StatementFilter, StatementRepository};

use crate::Clock;
use crate::error::ProgressQueryError;

/// Where a learner's progress view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    /// Read from the progress index.
    Stored,
    /// Rebuilt from the learner's statements; nothing was persisted.
    Replayed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnerProgress {
    pub learner_id: LearnerId,
    pub source: ProgressSource,
    pub items: Vec<ProgressRecord>,
}

/// Answers "how far is this learner" for reporting.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    statements: Arc<dyn StatementRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        statements: Arc<dyn StatementRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            statements,
            progress,
        }
    }

    /// Stored progress for the learner, or a replay of their statements when
    /// the index holds nothing for them.
    ///
    /// Replayed records carry the current time as `created_at`/`updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressQueryError::Storage` if either store cannot be read.
    pub async fn progress_for(
        &self,
        learner_id: &LearnerId,
    ) -> Result<LearnerProgress, ProgressQueryError> {
        let stored = self.progress.progress_for_learner(learner_id).await?;
        if !stored.is_empty() {
            return Ok(LearnerProgress {
                learner_id: learner_id.clone(),
                source: ProgressSource::Stored,
                items: stored,
            });
        }

        let items = self.replay(learner_id).await?;
        tracing::debug!(%learner_id, courses = items.len(), "progress replayed from statements");
        Ok(LearnerProgress {
            learner_id: learner_id.clone(),
            source: ProgressSource::Replayed,
            items,
        })
    }

    /// Rebuild progress from statement history regardless of the index.
    ///
    /// # Errors
    ///
    /// Returns `ProgressQueryError::Storage` if statements cannot be read.
    pub async fn replay(
        &self,
        learner_id: &LearnerId,
    ) -> Result<Vec<ProgressRecord>, ProgressQueryError> {
        let records = self
            .statements
            .list_statements(&StatementFilter::for_learner(learner_id.clone()))
            .await?;
        let signals: Vec<ProgressSignal> = records
            .iter()
            .map(|record| extract(&record.statement))
            .collect();
        Ok(reduce_all(learner_id, &signals, self.clock.now()))
    }
}
