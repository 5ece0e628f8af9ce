use burn::data::dataset::Dataset;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::encoder::PromptEncoder;
use crate::domain::error::Result;
use crate::domain::phase::Phase;
use crate::domain::sample::Sample;

/// One tokenised phrasing of a sample, before padding.
/// `whole_word_ids` always has the same length as `input_ids`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedSequence {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    /// Target token ids; `None` for pure inference inputs
    #[serde(default)]
    pub labels:         Option<Vec<u32>>,
    pub whole_word_ids: Vec<u32>,
    /// 1-based user index
    pub user_idx:       i64,
    pub target_item:    String,
}

impl EncodedSequence {
    #[cfg(test)]
    pub fn without_labels(mut self) -> Self {
        self.labels = None;
        self
    }
}

pub struct RecDataset {
    sequences: Vec<EncodedSequence>,
}

impl RecDataset {
    pub fn new(sequences: Vec<EncodedSequence>) -> Self { Self { sequences } }

    /// Run every sample through the encoder one at a time and flatten
    /// the phrasings into a single dataset. Any failing sample aborts
    /// the whole build.
    pub fn encode<R: Rng + ?Sized>(
        samples: &[Sample],
        encoder: &PromptEncoder,
        phase:   Phase,
        rng:     &mut R,
    ) -> Result<Self> {
        let mut sequences = Vec::with_capacity(samples.len());
        for sample in samples {
            let fields = encoder.tokenize(std::slice::from_ref(sample), phase, rng)?;
            sequences.extend(fields.into_sequences());
        }
        Ok(Self { sequences })
    }

    pub fn sequence_count(&self) -> usize { self.sequences.len() }
}

impl Dataset<EncodedSequence> for RecDataset {
    fn get(&self, index: usize) -> Option<EncodedSequence> {
        self.sequences.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.sequences.len()
    }
}
