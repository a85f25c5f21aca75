use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{MigrationError, Result};
use crate::migration::Migration;

/// Explicit, ordered registry of migrations, built once at startup and passed
/// into the coordinator. No implicit scanning or reflection: what is
/// registered is what runs.
pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Register a migration. Panics on a duplicate id: that is a programmer
    /// error caught at startup, not a runtime condition.
    pub fn register<M: Migration + 'static>(self, migration: M) -> Self {
        self.register_arc(Arc::new(migration))
    }

    pub fn register_arc(mut self, migration: Arc<dyn Migration>) -> Self {
        if self.migrations.iter().any(|m| m.id() == migration.id()) {
            panic!("migration id '{}' is already registered", migration.id());
        }
        self.migrations.push(migration);
        self.migrations.sort_by(|a, b| a.id().cmp(b.id()));
        self
    }

    /// All migrations ordered by id (ids are sortable timestamps).
    pub fn ordered(&self) -> &[Arc<dyn Migration>] {
        &self.migrations
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.iter().find(|m| m.id() == id).cloned()
    }

    /// Newest registered migration, if any.
    pub fn latest(&self) -> Option<Arc<dyn Migration>> {
        self.migrations.last().cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.migrations.iter().map(|m| m.id().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.migrations.len()
    }

    /// Startup validation: every migration has at least one step and step ids
    /// are unique across the registry (they name indexes and checkpoints).
    pub fn validate(&self) -> Result<()> {
        let mut step_ids: HashSet<String> = HashSet::new();
        for migration in &self.migrations {
            let steps = migration.steps();
            if steps.is_empty() {
                return Err(MigrationError::State(format!(
                    "migration '{}' has no steps",
                    migration.id()
                )));
            }
            for step in steps {
                if !step_ids.insert(step.id().to_string()) {
                    return Err(MigrationError::State(format!(
                        "step id '{}' is registered twice",
                        step.id()
                    )));
                }
            }
        }
        tracing::info!(migrations = self.count(), "migration registry validated");
        Ok(())
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
