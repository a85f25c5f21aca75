//! Derives content groups' published index range from per-content visibility.
//!
//! The range only captures the first contiguous run of visible contents;
//! contents published again after a gap are excluded. That is the historical
//! behavior of this data and is kept unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransformError;
use crate::events::DomainEvent;
use crate::migration::{Migration, MigrationStep, StepContext};
use crate::projection::{decode, encode, FieldBag};
use crate::store::IndexSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedRange {
    pub published: bool,
    pub first: i64,
    pub last: i64,
}

/// Range sentinel values: all visible is `(0, -1)`, none visible `(-1, -1)`.
/// A mix bounds the contiguous prefix starting at the first visible item and
/// ending right before the next hidden one.
pub fn published_range(flags: &[bool]) -> PublishedRange {
    if flags.iter().all(|f| *f) {
        return PublishedRange {
            published: true,
            first: 0,
            last: -1,
        };
    }
    if !flags.iter().any(|f| *f) {
        return PublishedRange {
            published: false,
            first: -1,
            last: -1,
        };
    }
    let first = flags
        .iter()
        .position(|f| *f)
        .expect("mixed flags contain a visible item");
    let last = flags[first..]
        .iter()
        .position(|f| !*f)
        .map(|gap| first + gap - 1)
        .unwrap_or(flags.len() - 1);
    PublishedRange {
        published: true,
        first: first as i64,
        last: last as i64,
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentGroup {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    #[serde(default)]
    content_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_published_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_published_index: Option<i64>,
    #[serde(flatten)]
    extra: FieldBag,
}

pub struct GroupPublishedRangeStep;

#[async_trait]
impl MigrationStep for GroupPublishedRangeStep {
    fn id(&self) -> &str {
        "content-group-published-range"
    }

    fn index(&self) -> IndexSpec {
        IndexSpec::for_step(self.id(), &["type"], self.selector())
    }

    fn selector(&self) -> Value {
        json!({
            "type": "ContentGroup",
            "firstPublishedIndex": {"$exists": false},
            "contentIds": {"$not": {"$size": 0}}
        })
    }

    async fn transform(
        &self,
        doc: Value,
        ctx: &StepContext<'_>,
    ) -> Result<Vec<Value>, TransformError> {
        let mut group: ContentGroup = decode(&doc)?;

        // Join the member contents. Not paginated or checkpointed: bounded by
        // the group's own cardinality.
        let mut flags = Vec::with_capacity(group.content_ids.len());
        for content_id in &group.content_ids {
            let content = ctx.require(content_id).await?;
            flags.push(
                content
                    .get("visible")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            );
        }

        let range = published_range(&flags);
        group.published = Some(range.published);
        group.first_published_index = Some(range.first);
        group.last_published_index = Some(range.last);

        ctx.publish(DomainEvent::RoomHistoryMigrated {
            room_id: group.room_id.clone(),
        })
        .await;

        Ok(vec![encode(&group)?])
    }
}

pub struct GroupPublishedRangeMigration;

impl Migration for GroupPublishedRangeMigration {
    fn id(&self) -> &str {
        "20201129120000"
    }

    fn steps(&self) -> Vec<Arc<dyn MigrationStep>> {
        vec![Arc::new(GroupPublishedRangeStep)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_flags_bound_the_first_contiguous_run() {
        let range = published_range(&[true, true, false, true]);
        assert_eq!(
            range,
            PublishedRange {
                published: true,
                first: 0,
                last: 1
            }
        );
    }

    #[test]
    fn all_visible_uses_the_open_ended_sentinel() {
        let range = published_range(&[true, true, true]);
        assert_eq!(
            range,
            PublishedRange {
                published: true,
                first: 0,
                last: -1
            }
        );
    }

    #[test]
    fn none_visible_is_unpublished() {
        let range = published_range(&[false, false]);
        assert_eq!(
            range,
            PublishedRange {
                published: false,
                first: -1,
                last: -1
            }
        );
    }

    #[test]
    fn run_starting_mid_list_extends_to_the_end_when_unbroken() {
        let range = published_range(&[false, true, true]);
        assert_eq!(
            range,
            PublishedRange {
                published: true,
                first: 1,
                last: 2
            }
        );
    }

    #[test]
    fn empty_group_counts_as_fully_published() {
        let range = published_range(&[]);
        assert_eq!(
            range,
            PublishedRange {
                published: true,
                first: 0,
                last: -1
            }
        );
    }
}
