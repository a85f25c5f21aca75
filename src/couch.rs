//! CouchDB HTTP client: Mango `_find` with bookmarks, partial `_index`
//! creation, `_explain` readiness probing and `_bulk_docs` writes.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::StoreError;
use crate::store::{DocumentStore, IndexSpec, Page};

#[derive(Clone)]
pub struct CouchClient {
    base_url: String,
    database: String,
    http: Client,
}

impl CouchClient {
    pub fn new(base_url: String, database: String) -> Self {
        Self {
            base_url,
            database,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.database),
            path
        )
    }

    fn parse_error_body(body: &str) -> String {
        // Couch error bodies are { "error": ..., "reason": ... }
        if let Ok(jsonv) = serde_json::from_str::<Value>(body) {
            let error = jsonv.get("error").and_then(|e| e.as_str()).unwrap_or("");
            let reason = jsonv.get("reason").and_then(|r| r.as_str()).unwrap_or("");
            if !error.is_empty() || !reason.is_empty() {
                return format!("{error}: {reason}");
            }
        }
        body.chars().take(512).collect()
    }

    async fn check(&self, target: &str, resp: reqwest::Response) -> Result<Value, StoreError> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = Self::parse_error_body(&body);
            tracing::error!(
                endpoint = target,
                status = %status,
                error = %message,
                "couch request failed"
            );
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if body.is_empty() {
            return Err(StoreError::EmptyResponse);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DocumentStore for CouchClient {
    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let body = json!({
            "index": {
                "fields": spec.fields,
                "partial_filter_selector": spec.partial_filter,
            },
            "ddoc": spec.name,
            "name": spec.name,
            "type": "json",
        });
        let resp = self.http.post(self.url("_index")).json(&body).send().await?;
        let jsonv = self.check("_index", resp).await?;
        let result = jsonv.get("result").and_then(|r| r.as_str()).unwrap_or("");
        tracing::debug!(index = %spec.name, result, "index creation submitted");
        Ok(())
    }

    async fn index_ready(&self, index: &str, selector: &Value) -> Result<bool, StoreError> {
        // No first-class readiness flag for Mango indexes; the index is ready
        // once the planner picks it for the step's selector.
        let body = json!({ "selector": selector, "use_index": index });
        let resp = self
            .http
            .post(self.url("_explain"))
            .json(&body)
            .send()
            .await?;
        let jsonv = self.check("_explain", resp).await?;
        let chosen = jsonv
            .get("index")
            .and_then(|i| i.get("ddoc"))
            .and_then(|d| d.as_str())
            .unwrap_or("");
        Ok(chosen.ends_with(index))
    }

    async fn find_page(
        &self,
        selector: &Value,
        index: &str,
        limit: usize,
        bookmark: Option<&str>,
    ) -> Result<Page, StoreError> {
        let mut body = json!({
            "selector": selector,
            "use_index": index,
            "limit": limit,
        });
        if let Some(b) = bookmark {
            body["bookmark"] = json!(b);
        }
        let resp = self.http.post(self.url("_find")).json(&body).send().await?;
        let jsonv = self.check("_find", resp).await?;
        let docs = jsonv
            .get("docs")
            .and_then(|d| d.as_array())
            .ok_or(StoreError::EmptyResponse)?
            .clone();
        let next = jsonv
            .get("bookmark")
            .and_then(|b| b.as_str())
            .filter(|b| !b.is_empty() && *b != "nil")
            .map(|b| b.to_string());
        tracing::debug!(index, page_len = docs.len(), "fetched page");
        Ok(Page {
            docs,
            bookmark: next,
        })
    }

    async fn bulk_write(&self, docs: &[Value]) -> Result<(), StoreError> {
        let body = json!({ "docs": docs });
        let resp = self
            .http
            .post(self.url("_bulk_docs"))
            .json(&body)
            .send()
            .await?;
        let jsonv = self.check("_bulk_docs", resp).await?;
        // _bulk_docs reports per-document outcomes; surface conflicts without
        // failing the batch (the re-run will pick them up again).
        if let Some(rows) = jsonv.as_array() {
            for row in rows {
                if let Some(error) = row.get("error").and_then(|e| e.as_str()) {
                    tracing::warn!(
                        doc = row.get("id").and_then(|i| i.as_str()).unwrap_or("<unknown>"),
                        error,
                        reason = row.get("reason").and_then(|r| r.as_str()).unwrap_or(""),
                        "bulk write rejected a document"
                    );
                }
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let url = self.url(&urlencoding::encode(id));
        let resp = self.http.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(self.check("get", resp).await?))
    }
}
