use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::checkpoint::{CheckpointStore, MigrationState};
use crate::error::{MigrationError, Result};
use crate::events::{EventPublisher, NoopPublisher};
use crate::index::IndexProvisioner;
use crate::migration::{Migration, MigrationStep, StepContext};
use crate::registry::MigrationRegistry;
use crate::scanner::PageScanner;
use crate::store::DocumentStore;
use crate::MigratorConfig;

/// Outcome of one executed migration.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub id: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: usize,
}

/// Coordinates the ordered list of registered migrations: for each, executes
/// its steps in order, advances the checkpoint after each page, and marks the
/// migration complete only once all steps finish.
pub struct MigrationRunner {
    store: Arc<dyn DocumentStore>,
    registry: MigrationRegistry,
    events: Arc<dyn EventPublisher>,
    checkpoints: CheckpointStore,
    config: MigratorConfig,
}

impl MigrationRunner {
    pub fn new(store: Arc<dyn DocumentStore>, registry: MigrationRegistry) -> Self {
        Self::with_config(store, registry, MigratorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        registry: MigrationRegistry,
        config: MigratorConfig,
    ) -> Self {
        let checkpoints = CheckpointStore::new(store.clone(), config.state_doc_id.clone());
        Self {
            store,
            registry,
            events: Arc::new(NoopPublisher),
            checkpoints,
            config,
        }
    }

    pub fn builder() -> MigrationRunnerBuilder {
        MigrationRunnerBuilder::new()
    }

    /// Validate the registry and make sure the state record exists.
    pub async fn initialize(&self) -> Result<()> {
        self.registry.validate()?;
        let state = self.checkpoints.load_or_init().await?;
        tracing::info!(
            service = %self.config.service_name,
            registered = self.registry.count(),
            completed = state.completed.len(),
            resumable = state.active.is_some(),
            "migration system initialized"
        );
        Ok(())
    }

    /// Run every registered migration that has not completed yet, resuming
    /// an interrupted one from its checkpoint. Migrations are forward-only
    /// and run-once: completed ids are skipped entirely.
    pub async fn migrate_up(&self) -> Result<Vec<MigrationResult>> {
        let mut state = self.checkpoints.load_or_init().await?;
        let mut results = Vec::new();
        for migration in self.registry.ordered() {
            if state.is_completed(migration.id()) {
                tracing::debug!(migration = %migration.id(), "already completed, skipping");
                continue;
            }
            let started = Instant::now();
            let executed_at = Utc::now();
            self.run_migration(migration.as_ref(), &mut state).await?;
            results.push(MigrationResult {
                id: migration.id().to_string(),
                executed_at,
                duration_ms: started.elapsed().as_millis() as u64,
                steps: migration.steps().len(),
            });
        }
        if results.is_empty() {
            tracing::info!(service = %self.config.service_name, "no pending migrations");
        }
        Ok(results)
    }

    /// Current progress snapshot for operators.
    pub async fn status(&self) -> Result<RunnerStatus> {
        let state = self.checkpoints.load_or_init().await?;
        let pending = self
            .registry
            .ids()
            .into_iter()
            .filter(|id| !state.is_completed(id))
            .collect();
        Ok(RunnerStatus {
            service_name: self.config.service_name.clone(),
            completed: state.completed.clone(),
            active: state.active.as_ref().map(|a| (a.id.clone(), a.step)),
            pending,
        })
    }

    async fn run_migration(
        &self,
        migration: &dyn Migration,
        state: &mut MigrationState,
    ) -> Result<()> {
        let steps = migration.steps();
        let (start_step, start_bookmark) = match state.active.as_ref() {
            Some(active) if active.id == migration.id() => {
                if active.step >= steps.len() {
                    return Err(MigrationError::InvalidStepIndex {
                        migration: migration.id().to_string(),
                        step: active.step,
                        step_count: steps.len(),
                    });
                }
                (active.step, active.bookmark.clone())
            }
            _ => {
                state.begin(migration.id());
                self.checkpoints.save(state).await?;
                (0, None)
            }
        };
        tracing::info!(
            migration = %migration.id(),
            start_step,
            resuming = start_bookmark.is_some(),
            "running migration"
        );

        let mut bookmark = start_bookmark;
        for (step_no, step) in steps.iter().enumerate().skip(start_step) {
            self.run_step(migration.id(), step_no, step.as_ref(), bookmark.take(), state)
                .await?;
            if step_no + 1 < steps.len() {
                state.checkpoint(step_no + 1, None);
                self.checkpoints.save(state).await?;
            }
        }

        state.complete_active();
        self.checkpoints.save(state).await?;
        tracing::info!(migration = %migration.id(), "migration completed");
        Ok(())
    }

    /// Ensure the step's index, then scan page by page: transform every
    /// document of the page, issue one bulk write for the page's output and
    /// persist `{step, bookmark}`. Pages are processed at least once across
    /// restarts; the transforms carry the idempotence.
    async fn run_step(
        &self,
        migration_id: &str,
        step_no: usize,
        step: &dyn MigrationStep,
        start_bookmark: Option<String>,
        state: &mut MigrationState,
    ) -> Result<()> {
        let index = step.index();
        let selector = step.selector();
        IndexProvisioner::new(self.store.as_ref(), self.config.index_poll_base)
            .ensure_ready(&index, &selector)
            .await?;

        let ctx = StepContext::new(self.store.as_ref(), self.events.as_ref());
        let mut scanner = PageScanner::new(
            self.store.as_ref(),
            selector,
            index.name.clone(),
            self.config.page_size,
            start_bookmark,
        );
        let mut pages = 0u64;
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
                            migration = %migration_id,
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
            state.checkpoint(step_no, page.bookmark.clone());
            self.checkpoints.save(state).await?;
            pages += 1;
            tracing::debug!(
                migration = %migration_id,
                step = %step.id(),
                page = pages,
                written = outgoing.len(),
                "page committed"
            );
        }
        tracing::info!(migration = %migration_id, step = %step.id(), pages, "step finished");
        Ok(())
    }
}

/// Builder for a [`MigrationRunner`] with custom wiring.
pub struct MigrationRunnerBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    registry: Option<MigrationRegistry>,
    events: Option<Arc<dyn EventPublisher>>,
    config: MigratorConfig,
}

impl MigrationRunnerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            registry: None,
            events: None,
            config: MigratorConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: MigrationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn build(self) -> Result<MigrationRunner> {
        let store = self
            .store
            .ok_or_else(|| MigrationError::State("store is required".into()))?;
        let registry = self
            .registry
            .ok_or_else(|| MigrationError::State("registry is required".into()))?;
        let mut runner = MigrationRunner::with_config(store, registry, self.config);
        if let Some(events) = self.events {
            runner.events = events;
        }
        Ok(runner)
    }
}

impl Default for MigrationRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress report: which migrations are done, active and still pending.
#[derive(Debug, Clone)]
pub struct RunnerStatus {
    pub service_name: String,
    pub completed: Vec<String>,
    pub active: Option<(String, usize)>,
    pub pending: Vec<String>,
}

impl RunnerStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.active.is_none()
    }

    pub fn summary(&self) -> String {
        if self.is_up_to_date() {
            format!(
                "Service '{}' is up to date ({} migration(s) completed)",
                self.service_name,
                self.completed.len()
            )
        } else {
            format!(
                "Service '{}': {} completed, {} pending{}",
                self.service_name,
                self.completed.len(),
                self.pending.len(),
                match &self.active {
                    Some((id, step)) => format!(", '{id}' interrupted at step {step}"),
                    None => String::new(),
                }
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_config_overrides() {
        let builder = MigrationRunner::builder()
            .service_name("arsbackend")
            .page_size(50);
        assert_eq!(builder.config.service_name, "arsbackend");
        assert_eq!(builder.config.page_size, 50);
    }

    #[test]
    fn builder_requires_store_and_registry() {
        assert!(MigrationRunner::builder().build().is_err());
    }

    #[test]
    fn status_summary_reports_interrupted_migration() {
        let status = RunnerStatus {
            service_name: "arsbackend".into(),
            completed: vec!["a".into()],
            active: Some(("b".into(), 2)),
            pending: vec!["b".into()],
        };
        assert!(!status.is_up_to_date());
        assert!(status.summary().contains("'b' interrupted at step 2"));

        let status = RunnerStatus {
            service_name: "arsbackend".into(),
            completed: vec!["a".into(), "b".into()],
            active: None,
            pending: vec![],
        };
        assert!(status.is_up_to_date());
        assert!(status.summary().contains("up to date"));
    }
}
