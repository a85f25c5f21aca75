//! In-memory document store used by the integration tests: a Mango-subset
//! selector matcher with bookmark pagination and failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use couchdb_migrator::error::StoreError;
use couchdb_migrator::events::{DomainEvent, EventPublisher};
use couchdb_migrator::store::{DocumentStore, IndexSpec, Page};

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Value>,
    indexes: HashSet<String>,
    unready_indexes: HashSet<String>,
    rev_counter: u64,
    find_calls: usize,
    fail_find_at: Option<usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace a document; a fresh `_rev` is assigned.
    pub fn insert(&self, mut doc: Value) {
        let mut inner = self.inner.lock().unwrap();
        let id = doc
            .get("_id")
            .and_then(|v| v.as_str())
            .expect("test documents need an _id")
            .to_string();
        inner.rev_counter += 1;
        doc["_rev"] = Value::String(format!("{}-mem", inner.rev_counter));
        inner.docs.insert(id, doc);
    }

    pub fn doc(&self, id: &str) -> Option<Value> {
        self.inner.lock().unwrap().docs.get(id).cloned()
    }

    pub fn doc_count(&self) -> usize {
        self.inner.lock().unwrap().docs.len()
    }

    pub fn find_calls(&self) -> usize {
        self.inner.lock().unwrap().find_calls
    }

    /// Make the n-th `_find` call (1-based, counted from now) fail once.
    pub fn fail_find_at(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        let base = inner.find_calls;
        inner.fail_find_at = Some(base + n);
    }

    /// Keep the named index permanently unready.
    pub fn set_index_unready(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .unready_indexes
            .insert(name.to_string());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        self.inner.lock().unwrap().indexes.insert(spec.name.clone());
        Ok(())
    }

    async fn index_ready(&self, index: &str, _selector: &Value) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.indexes.contains(index) && !inner.unready_indexes.contains(index))
    }

    async fn find_page(
        &self,
        selector: &Value,
        _index: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<Page, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.find_calls += 1;
        if inner.fail_find_at == Some(inner.find_calls) {
            inner.fail_find_at = None;
            return Err(StoreError::Api {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        let docs: Vec<Value> = inner
            .docs
            .iter()
            .filter(|(id, _)| bookmark.map(|b| id.as_str() > b).unwrap_or(true))
            .filter(|(_, doc)| matches(doc, selector))
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect();
        let next = docs
            .last()
            .and_then(|d| d.get("_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| bookmark.map(|b| b.to_string()));
        Ok(Page {
            docs,
            bookmark: next,
        })
    }

    async fn bulk_write(&self, docs: &[Value]) -> Result<(), StoreError> {
        for doc in docs {
            let Some(id) = doc.get("_id").and_then(|v| v.as_str()).map(|s| s.to_string()) else {
                continue;
            };
            let mut inner = self.inner.lock().unwrap();
            if doc.get("_deleted").and_then(|v| v.as_bool()).unwrap_or(false) {
                inner.docs.remove(&id);
                continue;
            }
            let mut stored = doc.clone();
            inner.rev_counter += 1;
            stored["_rev"] = Value::String(format!("{}-mem", inner.rev_counter));
            inner.docs.insert(id, stored);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.lock().unwrap().docs.get(id).cloned())
    }
}

fn matches(doc: &Value, selector: &Value) -> bool {
    let Some(clauses) = selector.as_object() else {
        return false;
    };
    clauses.iter().all(|(key, cond)| match key.as_str() {
        "$and" => cond
            .as_array()
            .map(|cs| cs.iter().all(|c| matches(doc, c)))
            .unwrap_or(false),
        "$or" => cond
            .as_array()
            .map(|cs| cs.iter().any(|c| matches(doc, c)))
            .unwrap_or(false),
        field => field_matches(doc.get(field), cond),
    })
}

fn field_matches(value: Option<&Value>, cond: &Value) -> bool {
    match cond {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, arg)| apply_op(value, op, arg))
        }
        other => value == Some(other),
    }
}

fn apply_op(value: Option<&Value>, op: &str, arg: &Value) -> bool {
    match op {
        "$eq" => value == Some(arg),
        "$exists" => arg
            .as_bool()
            .map(|want| value.is_some() == want)
            .unwrap_or(false),
        "$in" => arg
            .as_array()
            .zip(value)
            .map(|(options, v)| options.contains(v))
            .unwrap_or(false),
        "$elemMatch" => value
            .and_then(Value::as_array)
            .map(|items| items.iter().any(|item| matches(item, arg)))
            .unwrap_or(false),
        "$not" => !field_matches(value, arg),
        "$size" => value.and_then(Value::as_array).map(|a| a.len() as u64) == arg.as_u64(),
        _ => false,
    }
}

/// Collects every published event for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}
