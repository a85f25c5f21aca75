use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::StoreError;

/// One page of a bookmark-paginated query. An empty `docs` list is the
/// store's end-of-results signal.
#[derive(Debug, Clone)]
pub struct Page {
    pub docs: Vec<Value>,
    /// Opaque continuation token. Must be threaded into the next request
    /// unchanged; never inspected or synthesized by the engine.
    pub bookmark: Option<String>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// A partial (filtered) index over the collection. Migration steps scan
/// through these so an old-shape query never degrades to a full scan.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    /// Filter selector scoping the index to candidate documents.
    pub partial_filter: Value,
}

impl IndexSpec {
    /// Index backing a migration step. The name is derived from the step id,
    /// which doubles as the step's idempotency key.
    pub fn for_step(step_id: &str, fields: &[&str], partial_filter: Value) -> Self {
        Self {
            name: format!("migration-{step_id}"),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            partial_filter,
        }
    }
}

/// Narrow contract against the document store. The production implementation
/// is [`crate::couch::CouchClient`]; tests substitute an in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Submit index creation. Idempotent: safe to call when the index
    /// already exists.
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError>;

    /// Whether the store would serve `selector` from `index`.
    async fn index_ready(&self, index: &str, selector: &Value) -> Result<bool, StoreError>;

    /// Fetch one page of documents matching `selector` through `index`.
    async fn find_page(
        &self,
        selector: &Value,
        index: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<Page, StoreError>;

    /// Write heterogeneous documents in one call. Each batch commits
    /// independently; there is no cross-batch transaction. A document with
    /// `"_deleted": true` is removed.
    async fn bulk_write(&self, docs: &[Value]) -> Result<(), StoreError>;

    /// Fetch a single document by id, `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;
}

/// Narrow `selector` by an extra equality clause. Used by import jobs so a
/// step only touches documents belonging to one imported dataset.
pub fn scoped_selector(selector: &Value, field: &str, value: &Value) -> Value {
    json!({ "$and": [selector, { field: { "$eq": value } }] })
}
