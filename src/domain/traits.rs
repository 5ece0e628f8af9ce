// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Contracts for the collaborators the core consumes without
// reimplementing them:
//   - SampleSource    → where raw user samples come from
//   - Task            → turns a sample into prompt/target phrasings
//   - PromptTokenizer → text ↔ ids, plus word alignment
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::error::Result;
use crate::domain::sample::{Sample, TemplateInstance};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can load user samples.
///
/// Implementations:
///   - JsonlSampleLoader → one JSON object per line
pub trait SampleSource {
    fn load_all(&self) -> anyhow::Result<Vec<Sample>>;
}

// ─── Task ─────────────────────────────────────────────────────────────────────
/// A prompt task: given every field of a sample, produce one or more
/// (input_text, target_text) pairs.
///
/// A task that needs a field the sample lacks must return
/// `RecError::MissingField`; callers never skip such samples.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, sample: &Sample) -> Result<Vec<TemplateInstance>>;
}

// ─── PromptTokenizer ──────────────────────────────────────────────────────────
/// Token ids for one tokenized (input, target) pair.
///
/// `word_ids` and `special_tokens_mask` run parallel to `input_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedPair {
    pub input_ids:           Vec<u32>,
    pub attention_mask:      Vec<u32>,
    pub word_ids:            Vec<Option<u32>>,
    pub special_tokens_mask: Vec<u32>,
    pub labels:              Vec<u32>,
}

pub trait PromptTokenizer: Send + Sync {
    /// Tokenize input and target with the same truncation rule.
    fn encode_pair(&self, input_text: &str, target_text: &str) -> Result<TokenizedPair>;

    fn pad_id(&self) -> u32;

    fn eos_id(&self) -> u32;

    fn vocab_size(&self) -> usize;

    fn batch_decode(&self, sequences: &[Vec<u32>], skip_special_tokens: bool) -> Result<Vec<String>>;

    /// `text` the way a generation of exactly its tokens decodes, so
    /// decoded candidates can be compared with raw item ids.
    fn round_trip(&self, text: &str) -> Result<String>;
}
