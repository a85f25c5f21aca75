use thiserror::Error;

/// Errors raised by the document store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client received a structurally empty response where a payload was
    /// expected. Known transient fault of the store under compaction load;
    /// callers that can degrade gracefully treat it as "not found".
    #[error("store returned an empty or truncated response")]
    EmptyResponse,
}

/// Fatal errors for a migration run. The checkpoint committed after the last
/// successful page is the resumption point for the next run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index '{index}' not ready after {attempts} readiness polls")]
    IndexTimeout { index: String, attempts: u32 },

    #[error("checkpoint references step {step} but migration '{migration}' has {step_count} step(s)")]
    InvalidStepIndex {
        migration: String,
        step: usize,
        step_count: usize,
    },

    #[error("migration run interrupted by shutdown")]
    Interrupted,

    #[error("invalid migration state: {0}")]
    State(String),
}

/// Per-document transform failures. These are logged and the offending
/// document is skipped; the scan keeps going.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed legacy document: {reason}")]
    Malformed { reason: String },

    #[error("referenced document '{id}' is missing")]
    MissingReference { id: String },

    #[error("lookup of '{id}' failed: {source}")]
    Lookup {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;
