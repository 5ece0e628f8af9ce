use serde::{Deserialize, Serialize};

/// Generated candidates for one evaluation sample, in generation
/// order, next to the item that was actually chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionGroup {
    pub target:         String,
    /// The target as the tokenizer reproduces it (case folding,
    /// punctuation spacing); candidates are compared against this
    /// when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_target: Option<String>,
    pub candidates:     Vec<String>,
}

impl PredictionGroup {
    /// 0-based rank of the first candidate equal to the target.
    pub fn hit_rank(&self) -> Option<usize> {
        let target = self.decoded_target.as_deref().unwrap_or(&self.target).trim();
        self.candidates.iter().position(|c| c.trim() == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_target_takes_precedence() {
        let group = PredictionGroup {
            target:         "Item-42".into(),
            decoded_target: Some("item - 42".into()),
            candidates:     vec!["item_7".into(), "item - 42".into()],
        };
        assert_eq!(group.hit_rank(), Some(1));

        let raw = PredictionGroup { decoded_target: None, ..group };
        assert_eq!(raw.hit_rank(), None);
    }
}
