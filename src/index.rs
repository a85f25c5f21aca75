use std::time::Duration;

use serde_json::Value;

use crate::error::{MigrationError, Result};
use crate::store::{DocumentStore, IndexSpec};

/// Bound on readiness polls before giving up on an index.
pub const MAX_READINESS_POLLS: u32 = 10;

/// Requests creation of a partial index and waits until the store reports it
/// usable. A step must not proceed without its index: a full unindexed scan
/// over a large collection is unacceptable.
pub struct IndexProvisioner<'a> {
    store: &'a dyn DocumentStore,
    poll_base: Duration,
}

impl<'a> IndexProvisioner<'a> {
    pub fn new(store: &'a dyn DocumentStore, poll_base: Duration) -> Self {
        Self { store, poll_base }
    }

    pub async fn ensure_ready(&self, spec: &IndexSpec, selector: &Value) -> Result<()> {
        self.store.create_index(spec).await?;
        for attempt in 0..MAX_READINESS_POLLS {
            if self.store.index_ready(&spec.name, selector).await? {
                tracing::debug!(index = %spec.name, attempt, "index ready");
                return Ok(());
            }
            if attempt + 1 == MAX_READINESS_POLLS {
                break;
            }
            // linear backoff: base * (1 + 0.5 * attempt)
            let backoff = self.poll_base.mul_f64(1.0 + 0.5 * f64::from(attempt));
            tracing::debug!(
                index = %spec.name,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "index not ready yet"
            );
            tokio::time::sleep(backoff).await;
        }
        Err(MigrationError::IndexTimeout {
            index: spec.name.clone(),
            attempts: MAX_READINESS_POLLS,
        })
    }
}
