use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StoreError, TransformError};
use crate::events::{DomainEvent, EventPublisher};
use crate::store::{DocumentStore, IndexSpec};

/// Context handed to transforms for bounded cross-entity reads (joins) and
/// event publication. Joins are not paginated or checkpointed; they are
/// bounded by the parent document's own cardinality and assumed small.
pub struct StepContext<'a> {
    store: &'a dyn DocumentStore,
    events: &'a dyn EventPublisher,
}

impl<'a> StepContext<'a> {
    pub fn new(store: &'a dyn DocumentStore, events: &'a dyn EventPublisher) -> Self {
        Self { store, events }
    }

    /// Fetch a referenced document; `Ok(None)` when absent.
    pub async fn fetch(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(id).await
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(id).await?.is_some())
    }

    /// Fetch a referenced parent, failing the current document when it is
    /// missing or the lookup itself fails.
    pub async fn require(&self, id: &str) -> Result<Value, TransformError> {
        match self.store.get(id).await {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(TransformError::MissingReference { id: id.to_string() }),
            Err(source) => Err(TransformError::Lookup {
                id: id.to_string(),
                source,
            }),
        }
    }

    pub async fn publish(&self, event: DomainEvent) {
        self.events.publish(event).await;
    }
}

/// One unit of rewrite work within a migration: a filter over the collection
/// plus a pure per-document transform.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Stable identifier. Doubles as the step's idempotency key and the stem
    /// of its index name.
    fn id(&self) -> &str;

    /// Partial index backing this step's scan.
    fn index(&self) -> IndexSpec;

    /// Selector matching documents still in the old shape. Also used as the
    /// index's partial filter, so re-running a step over already-migrated
    /// documents matches nothing.
    fn selector(&self) -> Value;

    /// Rewrite one document into zero or more documents to persist.
    ///
    /// The default is a passthrough (`doc -> [doc]`): format-normalization
    /// steps that only need documents re-serialized in the current shape can
    /// rely on it. Returning an empty list persists nothing and deletes
    /// nothing; deletion requires an explicit `"_deleted": true` document in
    /// the returned batch. Transforms must be idempotent: pages are processed
    /// at least once, never exactly once.
    async fn transform(
        &self,
        doc: Value,
        _ctx: &StepContext<'_>,
    ) -> Result<Vec<Value>, TransformError> {
        Ok(vec![doc])
    }
}

/// A forward-only, run-once group of ordered steps. Later steps may depend on
/// earlier ones having completed; they never run in parallel.
pub trait Migration: Send + Sync {
    /// Monotonic sortable id, conventionally a timestamp string.
    fn id(&self) -> &str;

    fn steps(&self) -> Vec<Arc<dyn MigrationStep>>;
}
