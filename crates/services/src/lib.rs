#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod ingest_service;
pub mod observer;
pub mod progress_service;
pub mod statement_service;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use config::ServicesConfig;
pub use error::{
    AppServicesError, IngestError, ProgressQueryError, ProgressWriteError, StatementQueryError,
};
pub use ingest_service::{IngestReceipt, IngestService, ProgressOutcome};
pub use observer::{IngestObserver, TracingObserver};
pub use progress_service::{LearnerProgress, ProgressService, ProgressSource};
pub use statement_service::{StatementQuery, StatementService};
