use std::sync::Arc;

use progress_core::model::LearnerId;
use storage::repository::{StatementFilter, StatementRecord, StatementRepository};

use crate::config::ServicesConfig;
use crate::error::StatementQueryError;

/// A page request for stored statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementQuery {
    pub learner_id: Option<LearnerId>,
    pub limit: Option<u32>,
}

/// Read access to the raw statement log.
#[derive(Clone)]
pub struct StatementService {
    config: ServicesConfig,
    statements: Arc<dyn StatementRepository>,
}

impl StatementService {
    #[must_use]
    pub fn new(config: ServicesConfig, statements: Arc<dyn StatementRepository>) -> Self {
        Self { config, statements }
    }

    /// List statements in arrival order, optionally for one learner.
    ///
    /// # Errors
    ///
    /// Returns `StatementQueryError::InvalidLimit` for a limit of zero or one
    /// above the configured maximum, and `Storage` on read failures.
    pub async fn list(
        &self,
        query: &StatementQuery,
    ) -> Result<Vec<StatementRecord>, StatementQueryError> {
        let max = self.config.max_statement_limit;
        let limit = query.limit.unwrap_or(self.config.default_statement_limit);
        if limit == 0 || limit > max {
            return Err(StatementQueryError::InvalidLimit { limit, max });
        }

        let filter = StatementFilter {
            learner_id: query.learner_id.clone(),
            limit: Some(limit),
        };
        Ok(self.statements.list_statements(&filter).await?)
    }
}
