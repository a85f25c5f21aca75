//! Rewrites legacy `"scale"` contents to the current format tags.
//!
//! A legacy scale with exactly five options whose first label is an
//! agreement phrase becomes a templated scale (`SCALE`, `optionCount: 5`,
//! `options: null`); everything else of that legacy shape is re-tagged as a
//! generic multiple-choice content, keeping its options.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransformError;
use crate::migration::{Migration, MigrationStep, StepContext};
use crate::projection::{decode, encode, FieldBag};
use crate::store::IndexSpec;

static AGREEMENT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(strongly\s+|somewhat\s+)?(dis)?agree$").unwrap());

const TEMPLATE_OPTION_COUNT: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerOption {
    label: String,
    #[serde(flatten)]
    extra: FieldBag,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContent {
    #[serde(rename = "_id")]
    id: String,
    format: String,
    /// Emitted as `null` for the templated representation.
    options: Option<Vec<AnswerOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    option_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    option_template: Option<String>,
    /// Legacy grading data: decoded for the decision, dropped on write-back.
    #[serde(default, skip_serializing)]
    correct_option_indexes: Vec<i64>,
    #[serde(flatten)]
    extra: FieldBag,
}

fn is_agreement_scale(content: &LegacyContent) -> bool {
    if !content.correct_option_indexes.is_empty() {
        // Graded contents are quiz questions, not rating scales.
        return false;
    }
    match content.options.as_deref() {
        Some(options) if options.len() == TEMPLATE_OPTION_COUNT => options
            .first()
            .map(|o| AGREEMENT_LABEL.is_match(o.label.trim()))
            .unwrap_or(false),
        _ => false,
    }
}

fn rewrite(mut content: LegacyContent) -> LegacyContent {
    if content.format != "scale" {
        return content;
    }
    if is_agreement_scale(&content) {
        content.format = "SCALE".to_string();
        content.option_template = Some("AGREEMENT".to_string());
        content.option_count = Some(TEMPLATE_OPTION_COUNT);
        content.options = None;
    } else {
        content.format = "CHOICE".to_string();
    }
    content
}

pub struct ScaleFormatStep;

#[async_trait]
impl MigrationStep for ScaleFormatStep {
    fn id(&self) -> &str {
        "content-scale-format"
    }

    fn index(&self) -> IndexSpec {
        IndexSpec::for_step(self.id(), &["type", "format"], self.selector())
    }

    fn selector(&self) -> Value {
        json!({"type": "Content", "format": {"$eq": "scale"}})
    }

    async fn transform(
        &self,
        doc: Value,
        _ctx: &StepContext<'_>,
    ) -> Result<Vec<Value>, TransformError> {
        let content: LegacyContent = decode(&doc)?;
        Ok(vec![encode(&rewrite(content))?])
    }
}

pub struct ContentFormatMigration;

impl Migration for ContentFormatMigration {
    fn id(&self) -> &str {
        "20210908120000"
    }

    fn steps(&self) -> Vec<Arc<dyn MigrationStep>> {
        vec![Arc::new(ScaleFormatStep)]
    }
}
