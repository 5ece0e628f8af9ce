// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Resolves the tokenizer used for a run and adapts it to the
// `PromptTokenizer` contract.
//
// Resolution order:
//   1. an explicit tokenizer.json path
//   2. <checkpoint_dir>/tokenizer.json from an earlier run
//   3. build a word-level vocabulary from the prompt corpus
//
// Built tokenizers follow the T5 special-token layout:
//   <pad> = 0, </s> = 1, <unk> = 2, and every encoded sequence
//   ends with </s> (added by the post-processor, so it is marked
//   in the special-token mask and has no word id).
//
// Reference: Sennrich et al. (2016) BPE paper
//            tokenizers crate documentation

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::{
    pre_tokenizers::whitespace::Whitespace,
    OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer, TruncationParams,
};

use crate::domain::error::{RecError, Result as RecResult};
use crate::domain::traits::{PromptTokenizer, TokenizedPair};

pub const PAD_TOKEN: &str = "<pad>";
pub const EOS_TOKEN: &str = "</s>";
pub const UNK_TOKEN: &str = "<unk>";

const SPECIAL_TOKENS: [&str; 3] = [PAD_TOKEN, EOS_TOKEN, UNK_TOKEN];

// ─── HfPromptTokenizer ────────────────────────────────────────────────────────
/// A `tokenizers::Tokenizer` with truncation fixed to the model's
/// maximum sequence length.
pub struct HfPromptTokenizer {
    inner:  Tokenizer,
    pad_id: u32,
    eos_id: u32,
}

impl HfPromptTokenizer {
    pub fn new(mut inner: Tokenizer, max_len: usize) -> RecResult<Self> {
        inner
            .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
            .map_err(|e| RecError::Tokenizer(e.to_string()))?;

        let pad_id = inner
            .token_to_id(PAD_TOKEN)
            .ok_or_else(|| RecError::Tokenizer(format!("vocabulary has no {PAD_TOKEN} token")))?;
        let eos_id = inner
            .token_to_id(EOS_TOKEN)
            .ok_or_else(|| RecError::Tokenizer(format!("vocabulary has no {EOS_TOKEN} token")))?;

        Ok(Self { inner, pad_id, eos_id })
    }

    pub fn from_json(json: &str, max_len: usize) -> RecResult<Self> {
        let inner = Tokenizer::from_str(json).map_err(|e| RecError::Tokenizer(e.to_string()))?;
        Self::new(inner, max_len)
    }

    pub fn from_file(path: &Path, max_len: usize) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)
        })?;
        Ok(Self::new(inner, max_len)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner
            .save(path, true)
            .map_err(|e| anyhow::anyhow!("Cannot save tokenizer to '{}': {}", path.display(), e))
    }
}

impl PromptTokenizer for HfPromptTokenizer {
    fn encode_pair(&self, input_text: &str, target_text: &str) -> RecResult<TokenizedPair> {
        let input = self
            .inner
            .encode(input_text, true)
            .map_err(|e| RecError::Tokenizer(e.to_string()))?;
        let target = self
            .inner
            .encode(target_text, true)
            .map_err(|e| RecError::Tokenizer(e.to_string()))?;

        Ok(TokenizedPair {
            input_ids:           input.get_ids().to_vec(),
            attention_mask:      input.get_attention_mask().to_vec(),
            word_ids:            input.get_word_ids().to_vec(),
            special_tokens_mask: input.get_special_tokens_mask().to_vec(),
            labels:              target.get_ids().to_vec(),
        })
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }

    fn eos_id(&self) -> u32 {
        self.eos_id
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn batch_decode(&self, sequences: &[Vec<u32>], skip_special_tokens: bool) -> RecResult<Vec<String>> {
        let refs: Vec<&[u32]> = sequences.iter().map(|s| s.as_slice()).collect();
        self.inner
            .decode_batch(&refs, skip_special_tokens)
            .map_err(|e| RecError::Tokenizer(e.to_string()))
    }

    fn round_trip(&self, text: &str) -> RecResult<String> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| RecError::Tokenizer(e.to_string()))?;
        self.inner
            .decode(encoding.get_ids(), true)
            .map_err(|e| RecError::Tokenizer(e.to_string()))
    }
}

// ─── Word-level builder ───────────────────────────────────────────────────────
/// Split text with the same `Whitespace` pre-tokenizer the built
/// tokenizer runs at encode time.
fn pre_tokenize(text: &str) -> RecResult<Vec<String>> {
    let mut pre = PreTokenizedString::from(text);
    Whitespace::default()
        .pre_tokenize(&mut pre)
        .map_err(|e| RecError::Tokenizer(e.to_string()))?;

    Ok(pre
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(word, _, _)| word.to_string())
        .filter(|word| !word.is_empty())
        .collect())
}

/// Build a HuggingFace tokenizer JSON with a word-level vocabulary
/// of at most `vocab_size` entries (special tokens included).
pub fn build_word_level_json(texts: &[String], vocab_size: usize) -> RecResult<serde_json::Value> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in pre_tokenize(&text.to_lowercase())? {
            *freq.entry(word).or_insert(0) += 1;
        }
    }

    // Most frequent first, ties broken alphabetically for a stable vocabulary
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

    let mut vocab = serde_json::Map::new();
    for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
        vocab.insert(token.to_string(), serde_json::json!(id));
    }
    for (word, _) in words {
        if !vocab.contains_key(&word) {
            let id = vocab.len();
            vocab.insert(word, serde_json::json!(id));
        }
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    Ok(serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } }
            ],
            "pair": [
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 0 } },
                { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } }
            ],
            "special_tokens": {
                "</s>": { "id": EOS_TOKEN, "ids": [1], "tokens": [EOS_TOKEN] }
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    }))
}

// ─── TokenizerStore ───────────────────────────────────────────────────────────
pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load an explicit tokenizer, or the stored one, or build one from
    /// the corpus returned by `texts`. The corpus is only produced when
    /// a tokenizer has to be built.
    pub fn resolve<F>(
        &self,
        explicit:   Option<&Path>,
        texts:      F,
        vocab_size: usize,
        max_len:    usize,
    ) -> Result<HfPromptTokenizer>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        if let Some(path) = explicit {
            tracing::info!("Loading tokenizer from '{}'", path.display());
            return HfPromptTokenizer::from_file(path, max_len);
        }
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            return self.load(max_len);
        }

        tracing::info!("Building word-level tokenizer (vocab_size={})", vocab_size);
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let json      = build_word_level_json(&texts()?, vocab_size)?;
        let tokenizer = HfPromptTokenizer::from_json(&json.to_string(), max_len)?;
        tokenizer.save(&self.path())?;
        tracing::info!(
            "Tokenizer built with {} entries, saved to '{}'",
            tokenizer.vocab_size(),
            self.path().display()
        );
        Ok(tokenizer)
    }

    pub fn load(&self, max_len: usize) -> Result<HfPromptTokenizer> {
        HfPromptTokenizer::from_file(&self.path(), max_len)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prediction::PredictionGroup;

    fn tokenizer(max_len: usize) -> HfPromptTokenizer {
        let texts = vec!["user u_1 likes item_3, item_4 .".to_string()];
        HfPromptTokenizer::from_json(&build_word_level_json(&texts, 100).unwrap().to_string(), max_len).unwrap()
    }

    #[test]
    fn test_pre_tokenize_matches_whitespace_rules() {
        assert_eq!(pre_tokenize("item_3, item_4 ?!").unwrap(), vec!["item_3", ",", "item_4", "?!"]);
        assert!(pre_tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_special_token_layout() {
        let tok = tokenizer(32);
        assert_eq!(tok.pad_id(), 0);
        assert_eq!(tok.eos_id(), 1);
    }

    #[test]
    fn test_eos_is_special_and_has_no_word() {
        let tok  = tokenizer(32);
        let pair = tok.encode_pair("user u_1 likes item_3", "item_4").unwrap();

        assert_eq!(pair.input_ids.len(), 5);
        assert_eq!(*pair.input_ids.last().unwrap(), 1);
        assert_eq!(pair.special_tokens_mask, vec![0, 0, 0, 0, 1]);
        assert_eq!(pair.word_ids, vec![Some(0), Some(1), Some(2), Some(3), None]);
        assert_eq!(pair.labels.len(), 2);
    }

    #[test]
    fn test_truncation_applies_to_input_and_target() {
        let tok  = tokenizer(3);
        let pair = tok.encode_pair("user u_1 likes item_3", "item_3 item_4 item_3").unwrap();
        assert_eq!(pair.input_ids.len(), 3);
        assert_eq!(pair.labels.len(), 3);
        assert_eq!(*pair.labels.last().unwrap(), 1);
    }

    #[test]
    fn test_batch_decode_skips_special_tokens() {
        let tok  = tokenizer(32);
        let pair = tok.encode_pair("likes", "item_3").unwrap();
        let out  = tok.batch_decode(&[vec![0, pair.labels[0], 1]], true).unwrap();
        assert_eq!(out, vec!["item_3".to_string()]);
    }

    #[test]
    fn test_store_builds_then_reuses() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let texts = vec!["a b c".to_string()];

        let built = store.resolve(None, || Ok(texts), 10, 16).unwrap();
        assert!(store.path().exists());

        let reloaded = store
            .resolve(None, || anyhow::bail!("corpus requested for a stored tokenizer"), 10, 16)
            .unwrap();
        assert_eq!(built.vocab_size(), reloaded.vocab_size());
    }

    #[test]
    fn test_explicit_tokenizer_skips_corpus() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("given.json");
        tokenizer(16).save(&path).unwrap();

        let store = TokenizerStore::new(dir.path().join("ckpt"));
        let tok   = store
            .resolve(Some(&path), || anyhow::bail!("corpus requested for an explicit tokenizer"), 10, 16)
            .unwrap();
        assert_eq!(tok.eos_id(), 1);
    }

    #[test]
    fn test_decoded_label_ids_match_round_tripped_target() {
        let texts = vec!["what next for user_1 ? Item-42 B00X7".to_string()];
        let tok   = HfPromptTokenizer::from_json(&build_word_level_json(&texts, 100).unwrap().to_string(), 32).unwrap();

        for target in ["Item-42", "B00X7"] {
            let pair    = tok.encode_pair("what next for user_1 ?", target).unwrap();
            let decoded = tok.batch_decode(&[pair.labels.clone()], true).unwrap();
            let group   = PredictionGroup {
                target:         target.to_string(),
                decoded_target: Some(tok.round_trip(target).unwrap()),
                candidates:     decoded,
            };
            assert_eq!(group.hit_rank(), Some(0), "target {target}");
        }
    }
}
