// ============================================================
// Layer 4 — Prompt Encoder (task sampling + tokenisation)
// ============================================================
// Turns one raw sample into tokenised training examples:
//
//   Sample
//     │  pick a task (random training task, or the eval task)
//     ▼
//   [(input_text, target_text), ...]
//     │  tokenise each pair, align tokens to words
//     ▼
//   EncodedFields  (k parallel lists, one entry per phrasing)
//
// Whole-word ids: every regular token carries the 1-based index
// of the word it came from; special tokens carry the pad id.

use rand::{seq::SliceRandom, Rng};
use std::sync::Arc;

use crate::data::dataset::EncodedSequence;
use crate::domain::error::{RecError, Result};
use crate::domain::phase::Phase;
use crate::domain::sample::Sample;
use crate::domain::traits::{PromptTokenizer, Task};

/// Output of `PromptEncoder::tokenize` for one sample that produced
/// `k` phrasings: every field holds exactly `k` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedFields {
    pub input_ids:      Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub labels:         Vec<Option<Vec<u32>>>,
    pub whole_word_ids: Vec<Vec<u32>>,
    pub user_idx:       Vec<i64>,
    pub target_item:    Vec<String>,
}

impl EncodedFields {
    pub fn phrasing_count(&self) -> usize {
        self.input_ids.len()
    }

    fn push(&mut self, seq: EncodedSequence) {
        self.input_ids.push(seq.input_ids);
        self.attention_mask.push(seq.attention_mask);
        self.labels.push(seq.labels);
        self.whole_word_ids.push(seq.whole_word_ids);
        self.user_idx.push(seq.user_idx);
        self.target_item.push(seq.target_item);
    }

    /// Flatten back into one `EncodedSequence` per phrasing.
    pub fn into_sequences(self) -> Vec<EncodedSequence> {
        let EncodedFields { input_ids, attention_mask, labels, whole_word_ids, user_idx, target_item } = self;

        input_ids
            .into_iter()
            .zip(attention_mask)
            .zip(labels)
            .zip(whole_word_ids)
            .zip(user_idx)
            .zip(target_item)
            .map(|(((((input_ids, attention_mask), labels), whole_word_ids), user_idx), target_item)| {
                EncodedSequence {
                    input_ids,
                    attention_mask,
                    labels,
                    whole_word_ids,
                    user_idx,
                    target_item,
                }
            })
            .collect()
    }
}

pub struct PromptEncoder {
    tokenizer:      Arc<dyn PromptTokenizer>,
    training_tasks: Vec<Arc<dyn Task>>,
    eval_task:      Option<Arc<dyn Task>>,
}

impl PromptEncoder {
    pub fn new(
        tokenizer:      Arc<dyn PromptTokenizer>,
        training_tasks: Vec<Arc<dyn Task>>,
        eval_task:      Option<Arc<dyn Task>>,
    ) -> Self {
        Self { tokenizer, training_tasks, eval_task }
    }

    pub fn set_eval_task(&mut self, eval_task: Arc<dyn Task>) {
        self.eval_task = Some(eval_task);
    }

    pub fn eval_task(&self) -> Option<&Arc<dyn Task>> {
        self.eval_task.as_ref()
    }

    pub fn tokenizer(&self) -> &Arc<dyn PromptTokenizer> {
        &self.tokenizer
    }

    /// Select the task for this call: a uniformly random training task
    /// while training, the configured evaluation task otherwise.
    fn select_task<R: Rng + ?Sized>(&self, phase: Phase, rng: &mut R) -> Result<&Arc<dyn Task>> {
        match phase {
            Phase::Train => self.training_tasks.choose(rng).ok_or(RecError::NoTrainingTasks),
            Phase::Eval  => self.eval_task.as_ref().ok_or(RecError::EvalTaskNotSet),
        }
    }

    /// Tokenise exactly one sample.
    ///
    /// The slice form mirrors a dataset `map` with batch size 1; any
    /// other length is rejected.
    pub fn tokenize<R: Rng + ?Sized>(
        &self,
        samples: &[Sample],
        phase:   Phase,
        rng:     &mut R,
    ) -> Result<EncodedFields> {
        let [sample] = samples else {
            return Err(RecError::BatchSizeNotOne(samples.len()));
        };

        let task      = self.select_task(phase, rng)?;
        let templates = task.apply(sample)?;
        let user_idx  = sample.user_index()?;
        let pad_id    = self.tokenizer.pad_id();

        let mut fields = EncodedFields::default();
        for template in &templates {
            let pair = self.tokenizer.encode_pair(&template.input_text, &template.target_text)?;

            let whole_word_ids = pair
                .word_ids
                .iter()
                .zip(&pair.special_tokens_mask)
                .map(|(word, &special)| match word {
                    Some(w) if special == 0 => w + 1,
                    _                       => pad_id,
                })
                .collect();

            fields.push(EncodedSequence {
                input_ids:      pair.input_ids,
                attention_mask: pair.attention_mask,
                labels:         Some(pair.labels),
                whole_word_ids,
                user_idx,
                target_item:    sample.target_item.clone(),
            });
        }

        tracing::trace!(
            "Task '{}' produced {} phrasing(s) for user '{}'",
            task.name(),
            fields.phrasing_count(),
            sample.user_id
        );
        Ok(fields)
    }
}
