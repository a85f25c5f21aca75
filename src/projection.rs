//! Partial document views for migration steps.
//!
//! A step declares only the 2–3 fields it cares about as typed struct fields
//! and captures everything else into a flattened bag:
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use couchdb_migrator::projection::FieldBag;
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct ContentView {
//!     #[serde(rename = "_id")]
//!     id: String,
//!     format: String,
//!     /// Legacy field: decoded for the transform decision, dropped on
//!     /// write-back.
//!     #[serde(default, skip_serializing)]
//!     correct_option_indexes: Vec<i64>,
//!     #[serde(flatten)]
//!     extra: FieldBag,
//! }
//! ```
//!
//! Unknown fields round-trip verbatim (values and relative order), so one
//! step can safely rewrite documents that also carry fields belonging to
//! other shapes sharing the collection. Fields marked `skip_serializing` are
//! deleted by omission at encode time.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::TransformError;

/// Catch-all for fields a projection does not declare.
pub type FieldBag = Map<String, Value>;

/// Decode a raw document into a step's projection type.
pub fn decode<T: DeserializeOwned>(doc: &Value) -> Result<T, TransformError> {
    serde_json::from_value(doc.clone()).map_err(|e| TransformError::Malformed {
        reason: e.to_string(),
    })
}

/// Re-serialize a projection, merging the unknown-field bag back in.
pub fn encode<T: Serialize>(entity: &T) -> Result<Value, TransformError> {
    serde_json::to_value(entity).map_err(|e| TransformError::Malformed {
        reason: e.to_string(),
    })
}
