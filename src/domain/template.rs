// ============================================================
// Layer 3 — Prompt Templates
// ============================================================
// A `PromptTemplate` is a named task whose phrasings come from
// configuration rather than code:
//
//   {
//     "name": "sequential",
//     "pairs": [
//       {"input":  "user {user_id} bought {item_sequence}. what next?",
//        "target": "{target_item}"}
//     ]
//   }
//
// Every `{placeholder}` appearing in any pair is a mandatory
// field of the task.

use serde::{Deserialize, Serialize};

use crate::domain::error::{RecError, Result};
use crate::domain::sample::{Sample, TemplateInstance};
use crate::domain::traits::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePair {
    pub input:  String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name:  String,
    pub pairs: Vec<TemplatePair>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), pairs: Vec::new() }
    }

    #[cfg(test)]
    pub fn with_pair(mut self, input: impl Into<String>, target: impl Into<String>) -> Self {
        self.pairs.push(TemplatePair { input: input.into(), target: target.into() });
        self
    }

    /// Field names referenced by any pair, in first-seen order.
    pub fn mandatory_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for pair in &self.pairs {
            for name in placeholders(&pair.input).chain(placeholders(&pair.target)) {
                if !fields.iter().any(|f| f == name) {
                    fields.push(name.to_string());
                }
            }
        }
        fields
    }

    fn render(&self, template: &str, sample: &Sample) -> Result<String> {
        let mut out  = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else { break };
            let name = &rest[open + 1..open + close];
            out.push_str(&rest[..open]);

            let value = sample.field_text(name).ok_or_else(|| RecError::MissingField {
                task:  self.name.clone(),
                field: name.to_string(),
            })?;
            out.push_str(&value);
            rest = &rest[open + close + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template
        .split('{')
        .skip(1)
        .filter_map(|chunk| chunk.split_once('}').map(|(name, _)| name))
}

impl Task for PromptTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, sample: &Sample) -> Result<Vec<TemplateInstance>> {
        if let Some(field) = self
            .mandatory_fields()
            .into_iter()
            .find(|f| sample.field_text(f).is_none())
        {
            return Err(RecError::MissingField { task: self.name.clone(), field });
        }

        self.pairs
            .iter()
            .map(|pair| {
                Ok(TemplateInstance::new(
                    self.render(&pair.input, sample)?,
                    self.render(&pair.target, sample)?,
                ))
            })
            .collect()
    }
}
