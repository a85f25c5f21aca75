//! On-demand migrations scoped to one imported dataset.
//!
//! External request handlers persist an [`ImportJob`] in `PENDING` state; the
//! [`ImportJobRunner`] discovers it on its next poll, runs the migration's
//! steps restricted to the job's dataset, and reports the outcome through the
//! job's status field plus a published event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MigrationError, Result, StoreError};
use crate::events::{DomainEvent, EventPublisher};
use crate::index::IndexProvisioner;
use crate::migration::{Migration, MigrationStep, StepContext};
use crate::projection::FieldBag;
use crate::scanner::PageScanner;
use crate::store::{scoped_selector, DocumentStore, IndexSpec};
use crate::MigratorConfig;

/// Field stamped on every document of an imported dataset; the extra equality
/// filter that keeps a job's run away from the rest of the collection.
pub const SCOPE_FIELD: &str = "importJobId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobStatus {
    Pending,
    InProgress,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub migration_id: String,
    pub current_step: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default = "job_doc_type")]
    pub doc_type: String,
    pub owner_user_id: String,
    /// Identifier of the imported dataset. Doubles as the deterministic id of
    /// the result document resolved after a successful run.
    pub target_scope: String,
    pub status: ImportJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_progress: Option<MigrationProgress>,
    #[serde(flatten)]
    pub extra: FieldBag,
}

fn job_doc_type() -> String {
    "ImportJob".to_string()
}

fn pending_jobs_index() -> IndexSpec {
    IndexSpec {
        name: "import-jobs-pending".to_string(),
        fields: vec!["status".to_string()],
        partial_filter: json!({"type": "ImportJob"}),
    }
}

/// Background loop executing pending import jobs. One instance per
/// deployment; there is no distributed lock, so duplicate pickup under
/// multi-instance operation is at-least-once by design.
pub struct ImportJobRunner {
    store: Arc<dyn DocumentStore>,
    migration: Arc<dyn Migration>,
    events: Arc<dyn EventPublisher>,
    config: MigratorConfig,
}

impl ImportJobRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        migration: Arc<dyn Migration>,
        events: Arc<dyn EventPublisher>,
        config: MigratorConfig,
    ) -> Self {
        Self {
            store,
            migration,
            events,
            config,
        }
    }

    /// Poll loop with a fixed interval; returns once `shutdown` flips so
    /// process termination is clean rather than relying on mid-sleep
    /// interruption. Poll failures are logged and the loop keeps serving.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.job_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            migration = %self.migration.id(),
            interval_s = self.config.job_poll_interval.as_secs(),
            "import job runner started"
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("import job runner shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match self.poll_once(&shutdown).await {
                        Ok(()) => {}
                        Err(MigrationError::Interrupted) => {
                            tracing::info!("import job runner interrupted mid-poll");
                            return;
                        }
                        Err(e) => tracing::error!(error = %e, "import job poll failed"),
                    }
                }
            }
        }
    }

    /// One poll: pick up every pending job and execute it.
    pub async fn poll_once(
        &self,
        shutdown: &tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        let index = pending_jobs_index();
        self.store.create_index(&index).await?;
        let selector = json!({"type": "ImportJob", "status": "PENDING"});
        let mut scanner = PageScanner::new(
            self.store.as_ref(),
            selector,
            index.name.clone(),
            self.config.page_size,
            None,
        );
        while let Some(page) = scanner.next_page().await.map_err(MigrationError::Store)? {
            for doc in page.docs {
                if *shutdown.borrow() {
                    return Err(MigrationError::Interrupted);
                }
                let job: ImportJob = match serde_json::from_value(doc) {
                    Ok(job) => job,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed import job document");
                        continue;
                    }
                };
                self.run_job(job).await?;
            }
        }
        Ok(())
    }

    /// Execute one job. A failing step marks the job `FAILED` but later steps
    /// still run, best-effort, to maximize partial recovery. Only store
    /// failures while persisting the job itself propagate.
    async fn run_job(&self, mut job: ImportJob) -> Result<()> {
        tracing::info!(job = %job.id, scope = %job.target_scope, "starting import migration");
        job.status = ImportJobStatus::InProgress;
        job.migration_progress = Some(MigrationProgress {
            migration_id: self.migration.id().to_string(),
            current_step: 0,
        });
        self.save_job(&mut job).await?;

        let steps = self.migration.steps();
        let mut failed = false;
        for (step_no, step) in steps.iter().enumerate() {
            if let Err(e) = self.run_scoped_step(step.as_ref(), &job).await {
                tracing::warn!(
                    job = %job.id,
                    step = %step.id(),
                    error = %e,
                    "import step failed, continuing with remaining steps"
                );
                failed = true;
            }
            if let Some(progress) = job.migration_progress.as_mut() {
                progress.current_step = step_no + 1;
            }
            self.save_job(&mut job).await?;
        }

        if failed {
            job.status = ImportJobStatus::Failed;
            self.save_job(&mut job).await?;
            tracing::error!(job = %job.id, "import migration failed");
            return Ok(());
        }

        // The result document's id is derived deterministically from the
        // job's dataset scope.
        match self.store.get(&job.target_scope).await {
            Ok(Some(_)) => {
                job.status = ImportJobStatus::Finished;
                self.save_job(&mut job).await?;
                self.events
                    .publish(DomainEvent::EntityCreated {
                        entity_id: job.target_scope.clone(),
                        entity_type: "room".to_string(),
                    })
                    .await;
                tracing::info!(job = %job.id, result = %job.target_scope, "import migration finished");
            }
            Ok(None) => {
                job.status = ImportJobStatus::Failed;
                self.save_job(&mut job).await?;
                tracing::error!(
                    job = %job.id,
                    result = %job.target_scope,
                    "expected result document is absent after import migration"
                );
            }
            Err(StoreError::EmptyResponse) => {
                // Known transient client fault; the job fails but the loop
                // keeps serving other jobs.
                job.status = ImportJobStatus::Failed;
                self.save_job(&mut job).await?;
                tracing::error!(job = %job.id, "store returned an empty response resolving the result");
            }
            Err(e) => {
                job.status = ImportJobStatus::Failed;
                self.save_job(&mut job).await?;
                tracing::error!(job = %job.id, error = %e, "failed to resolve result document");
            }
        }
        Ok(())
    }

    /// Same page machinery as the whole-database coordinator, with the step
    /// selector additionally scoped by the job's identifier. Job runs are
    /// small; progress is tracked per step, not per page.
    async fn run_scoped_step(&self, step: &dyn MigrationStep, job: &ImportJob) -> Result<()> {
        let index = step.index();
        let selector = scoped_selector(&step.selector(), SCOPE_FIELD, &json!(job.target_scope));
        IndexProvisioner::new(self.store.as_ref(), self.config.index_poll_base)
            .ensure_ready(&index, &step.selector())
            .await?;

        let ctx = StepContext::new(self.store.as_ref(), self.events.as_ref());
        let mut scanner = PageScanner::new(
            self.store.as_ref(),
            selector,
            index.name.clone(),
            self.config.page_size,
            None,
        );
        while let Some(page) = scanner.next_page().await.map_err(MigrationError::Store)? {
            let mut outgoing = Vec::new();
            for doc in page.docs {
                let doc_id = doc
                    .get("_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<unknown>")
                    .to_string();
                match step.transform(doc, &ctx).await {
                    Ok(mut rewritten) => outgoing.append(&mut rewritten),
                    Err(e) => {
                        tracing::warn!(
                            job = %job.id,
                            step = %step.id(),
                            doc = %doc_id,
                            error = %e,
                            "skipping document"
                        );
                    }
                }
            }
            if !outgoing.is_empty() {
                self.store
                    .bulk_write(&outgoing)
                    .await
                    .map_err(MigrationError::Store)?;
            }
        }
        Ok(())
    }

    async fn save_job(&self, job: &mut ImportJob) -> Result<()> {
        let doc = serde_json::to_value(&*job).map_err(|e| MigrationError::State(e.to_string()))?;
        self.store.bulk_write(std::slice::from_ref(&doc)).await?;
        if let Some(fresh) = self.store.get(&job.id).await? {
            *job =
                serde_json::from_value(fresh).map_err(|e| MigrationError::State(e.to_string()))?;
        }
        Ok(())
    }
}
