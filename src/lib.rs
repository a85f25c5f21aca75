//! # CouchDB Migrator
//!
//! Resumable schema-migration engine for the audience-response backend's
//! document database.
//!
//! The engine walks the live collection through partial indexes and
//! bookmark-paginated queries, rewrites documents matching an old schema
//! shape and bulk-writes them back, checkpointing after every page so an
//! interrupted run resumes exactly where it stopped. Unknown document fields
//! are preserved verbatim, transforms are idempotent (pages are processed at
//! least once), and a background runner applies the same step machinery
//! on demand to single imported datasets.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use couchdb_migrator::{CouchClient, MigrationRunner, migrations};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(CouchClient::new(
//!     "http://localhost:5984".into(),
//!     "arsbackend".into(),
//! ));
//! let runner = MigrationRunner::builder()
//!     .store(store)
//!     .registry(migrations::builtin_registry())
//!     .service_name("arsbackend")
//!     .build()?;
//! runner.initialize().await?;
//! runner.migrate_up().await?;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod couch;
pub mod error;
pub mod events;
pub mod import_job;
pub mod index;
pub mod migration;
pub mod migrations;
pub mod projection;
pub mod registry;
pub mod runner;
pub mod scanner;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for easy access
pub use checkpoint::{ActiveMigration, CheckpointStore, MigrationState};
pub use couch::CouchClient;
pub use error::{MigrationError, Result, StoreError, TransformError};
pub use events::{DomainEvent, EventPublisher, NoopPublisher};
pub use import_job::{ImportJob, ImportJobRunner, ImportJobStatus, MigrationProgress};
pub use index::IndexProvisioner;
pub use migration::{Migration, MigrationStep, StepContext};
pub use registry::MigrationRegistry;
pub use runner::{MigrationResult, MigrationRunner, MigrationRunnerBuilder, RunnerStatus};
pub use scanner::PageScanner;
pub use store::{DocumentStore, IndexSpec, Page};

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Id of the singleton state document holding checkpoints.
    pub state_doc_id: String,
    /// Documents fetched per `_find` page.
    pub page_size: usize,
    /// Base delay for index readiness polling; each poll backs off linearly.
    pub index_poll_base: std::time::Duration,
    /// Idle interval of the import job runner.
    pub job_poll_interval: std::time::Duration,
    /// Service name for logging and identification.
    pub service_name: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            state_doc_id: "migration-state".to_string(),
            page_size: 200,
            index_poll_base: std::time::Duration::from_millis(200),
            job_poll_interval: std::time::Duration::from_secs(10),
            service_name: "default".to_string(),
        }
    }
}
