// ============================================================
// Layer 3 — Sample Domain Type
// ============================================================
// One user's structured record as it appears in the raw data:
// the user id, the item to recommend and any number of
// contextual fields (interaction history, item metadata, ...).
//
// Example JSON line:
//   {"user_id": "u_3", "target_item": "item_42",
//    "item_sequence": ["item_7", "item_19"], "category": "books"}
//
// Samples are immutable inputs to templating.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::error::{RecError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub user_id: String,

    /// Ground-truth item identifier, kept verbatim for evaluation
    pub target_item: String,

    /// Every other field of the record, keyed by name
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Sample {
    pub fn new(user_id: impl Into<String>, target_item: impl Into<String>) -> Self {
        Self {
            user_id:     user_id.into(),
            target_item: target_item.into(),
            fields:      BTreeMap::new(),
        }
    }

    /// Builder-style helper for attaching a contextual field.
    #[cfg(test)]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Render a named field as prompt text.
    ///
    /// Lists are joined with ", " so an interaction history reads
    /// naturally inside a sentence. `null` counts as absent.
    pub fn field_text(&self, name: &str) -> Option<String> {
        match name {
            "user_id"     => Some(self.user_id.clone()),
            "target_item" => Some(self.target_item.clone()),
            other         => self.fields.get(other).and_then(value_text),
        }
    }

    /// Numeric user index parsed from the first run of digits in
    /// `user_id` ("u_3" → 3, "user-0127" → 127). Indices are 1-based.
    pub fn user_index(&self) -> Result<i64> {
        let digits: String = self
            .user_id
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();

        digits
            .parse::<i64>()
            .map_err(|_| RecError::InvalidUserId(self.user_id.clone()))
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null      => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(xs) => Some(
            xs.iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// One (input, target) phrasing produced by applying a task to a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInstance {
    pub input_text:  String,
    pub target_text: String,
}

impl TemplateInstance {
    pub fn new(input_text: impl Into<String>, target_text: impl Into<String>) -> Self {
        Self {
            input_text:  input_text.into(),
            target_text: target_text.into(),
        }
    }
}
