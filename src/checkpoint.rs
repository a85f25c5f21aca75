use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::projection::FieldBag;
use crate::store::DocumentStore;

/// The step/cursor pair of a migration in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMigration {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

/// Singleton record tracking whole-database migrations: one per deployment,
/// created on first run, mutated after each page/step, never deleted.
///
/// `active` is non-null iff a migration is in progress or was interrupted
/// mid-run; an id appears in `completed` iff all of its steps finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default = "state_doc_type")]
    pub doc_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveMigration>,
    #[serde(default)]
    pub completed: Vec<String>,
    /// Store bookkeeping (`_rev` and anything else) rides along untouched.
    #[serde(flatten)]
    pub extra: FieldBag,
}

fn state_doc_type() -> String {
    "MigrationState".to_string()
}

impl MigrationState {
    pub fn new(doc_id: &str) -> Self {
        Self {
            id: doc_id.to_string(),
            doc_type: state_doc_type(),
            active: None,
            completed: Vec::new(),
            extra: FieldBag::new(),
        }
    }

    pub fn is_completed(&self, migration_id: &str) -> bool {
        self.completed.iter().any(|c| c == migration_id)
    }

    pub fn begin(&mut self, migration_id: &str) {
        self.active = Some(ActiveMigration {
            id: migration_id.to_string(),
            started_at: Utc::now(),
            step: 0,
            bookmark: None,
        });
    }

    pub fn checkpoint(&mut self, step: usize, bookmark: Option<String>) {
        if let Some(active) = self.active.as_mut() {
            active.step = step;
            active.bookmark = bookmark;
        }
    }

    /// Move the active migration into the completed set.
    pub fn complete_active(&mut self) {
        if let Some(active) = self.active.take() {
            if !self.is_completed(&active.id) {
                self.completed.push(active.id);
            }
        }
    }
}

/// Persists the singleton [`MigrationState`] document, enabling exact
/// resumption after crash or restart.
pub struct CheckpointStore {
    store: Arc<dyn DocumentStore>,
    doc_id: String,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn DocumentStore>, doc_id: impl Into<String>) -> Self {
        Self {
            store,
            doc_id: doc_id.into(),
        }
    }

    /// Load the state document, creating it on first run.
    pub async fn load_or_init(&self) -> Result<MigrationState> {
        if let Some(doc) = self.store.get(&self.doc_id).await? {
            return serde_json::from_value(doc).map_err(|e| MigrationError::State(e.to_string()));
        }
        tracing::info!(doc = %self.doc_id, "creating migration state record");
        let mut state = MigrationState::new(&self.doc_id);
        self.save(&mut state).await?;
        Ok(state)
    }

    /// Write the state back and refresh the store's revision bookkeeping so
    /// the next read-modify-write starts from the committed document.
    pub async fn save(&self, state: &mut MigrationState) -> Result<()> {
        let doc =
            serde_json::to_value(&*state).map_err(|e| MigrationError::State(e.to_string()))?;
        self.store.bulk_write(std::slice::from_ref(&doc)).await?;
        if let Some(fresh) = self.store.get(&self.doc_id).await? {
            *state =
                serde_json::from_value(fresh).map_err(|e| MigrationError::State(e.to_string()))?;
        }
        Ok(())
    }
}
