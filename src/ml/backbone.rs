// ============================================================
// Layer 5 — Sequence-to-Sequence Backbone Contract
// ============================================================
// The capability set the personalised model needs from the
// underlying encoder-decoder. The step controllers only ever see
// this trait, so any model exposing an input-embedding table, a
// loss-producing forward pass and a generate operation can be
// plugged in.

use burn::prelude::*;

/// Decoding settings for `Seq2SeqBackbone::generate`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub num_return_sequences: usize,
    pub num_beams:            usize,
    pub max_new_tokens:       usize,
    /// 0 disables the constraint
    pub no_repeat_ngram_size: usize,
    /// Stop once `num_beams` hypotheses have finished
    pub early_stopping:       bool,
    pub length_penalty:       f32,
}

impl GenerationConfig {
    /// The fixed configuration used by the validation step.
    pub fn evaluation() -> Self {
        Self {
            num_return_sequences: 10,
            num_beams:            30,
            max_new_tokens:       50,
            no_repeat_ngram_size: 0,
            early_stopping:       true,
            length_penalty:       1.0,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::evaluation()
    }
}

pub trait Seq2SeqBackbone<B: Backend> {
    /// input_ids [batch, seq] → [batch, seq, d_model]
    fn embed_tokens(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3>;

    /// Mean token loss over every label position that is not IGNORE_INDEX.
    fn forward_loss(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 2, Int>,
    ) -> Tensor<B, 1>;

    /// Returns `batch * num_return_sequences` token sequences, grouped
    /// by input row, best hypothesis first within each group.
    fn generate(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        config:         &GenerationConfig,
    ) -> Vec<Vec<u32>>;
}
