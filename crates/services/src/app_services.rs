use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::config::ServicesConfig;
use crate::error::AppServicesError;
use crate::ingest_service::IngestService;
use crate::progress_service::ProgressService;
use crate::statement_service::StatementService;

/// Assembles the services over one shared storage bundle.
#[derive(Clone)]
pub struct AppServices {
    ingest: Arc<IngestService>,
    progress: Arc<ProgressService>,
    statements: Arc<StatementService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: ServicesConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, config))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, config: ServicesConfig) -> Self {
        let ingest = Arc::new(IngestService::new(
            clock,
            config.clone(),
            Arc::clone(&storage.statements),
            Arc::clone(&storage.progress),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.statements),
            Arc::clone(&storage.progress),
        ));
        let statements = Arc::new(StatementService::new(
            config,
            Arc::clone(&storage.statements),
        ));

        Self {
            ingest,
            progress,
            statements,
        }
    }

    #[must_use]
    pub fn ingest(&self) -> Arc<IngestService> {
        Arc::clone(&self.ingest)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn statements(&self) -> Arc<StatementService> {
        Arc::clone(&self.statements)
    }
}
