// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load samples (JSONL)         (Layer 4 - data)
//   Step 2: Load prompt tasks            (Layer 4 - data)
//   Step 3: Resolve the user count       (Layer 3 - domain)
//   Step 4: Split train/validation       (Layer 4 - data)
//   Step 5: Resolve tokenizer            (Layer 6 - infra)
//   Step 6: Build the prompt encoder     (Layer 4 - data)
//   Step 7: Save config                  (Layer 6 - infra)
//   Step 8: Run training loop            (Layer 5 - ml)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::data::{
    encoder::PromptEncoder,
    loader::{JsonlSampleLoader, TaskSet},
    splitter::split_train_val,
};
use crate::domain::error::{RecError, Result as RecResult};
use crate::domain::phase::InjectionPhases;
use crate::domain::sample::Sample;
use crate::domain::traits::{PromptTokenizer, SampleSource, Task};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::TokenizerStore,
};
use crate::ml::model::RecModelConfig;
use crate::ml::seq2seq::Seq2SeqConfig;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings of a training run. Saved next to the checkpoints
// as train_config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub samples_path:   String,
    pub tasks_path:     String,
    pub checkpoint_dir: String,
    #[serde(default)]
    pub tokenizer_path: Option<String>,
    /// Checkpoint directory whose latest weights seed this run
    #[serde(default)]
    pub init_from:      Option<String>,
    pub max_seq_len:    usize,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub weight_decay:   f64,
    pub seed:           u64,
    pub train_fraction: f64,
    pub d_model:        usize,
    pub num_heads:      usize,
    pub num_layers:     usize,
    pub d_ff:           usize,
    pub dropout:        f64,
    pub vocab_size:     usize,
    pub user_dropout:   f64,
    /// Size of the user table; the largest user index in the
    /// samples when unset.
    #[serde(default)]
    pub n_users:        Option<usize>,
    pub inject_personalization: InjectionPhases,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            samples_path:   "data/samples.jsonl".to_string(),
            tasks_path:     "data/tasks.json".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            tokenizer_path: None,
            init_from:      None,
            max_seq_len:    512,
            batch_size:     8,
            epochs:         10,
            lr:             1e-3,
            weight_decay:   0.01,
            seed:           42,
            train_fraction: 0.9,
            d_model:        256,
            num_heads:      8,
            num_layers:     4,
            d_ff:           1024,
            dropout:        0.1,
            vocab_size:     32100,
            user_dropout:   0.6,
            n_users:        None,
            inject_personalization: InjectionPhases::all(),
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self, tokenizer: &dyn PromptTokenizer, n_users: usize) -> RecModelConfig {
        let backbone = Seq2SeqConfig::new(
            tokenizer.vocab_size(), self.max_seq_len, self.d_model,
            self.num_heads, self.num_layers, self.d_ff, self.dropout,
        )
        .with_pad_token_id(tokenizer.pad_id() as usize)
        .with_eos_token_id(tokenizer.eos_id() as usize);

        RecModelConfig::new(backbone, n_users).with_user_dropout(self.user_dropout)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Load samples ──────────────────────────────────────────────
        let samples = JsonlSampleLoader::new(&cfg.samples_path).load_all()?;
        if samples.is_empty() {
            anyhow::bail!("No samples found in '{}'", cfg.samples_path);
        }

        // ── Step 2: Load prompt tasks ─────────────────────────────────────────
        let tasks          = TaskSet::load(Path::new(&cfg.tasks_path))?;
        let training_tasks = tasks.training_tasks();
        let eval_task      = tasks.eval_task();
        if training_tasks.is_empty() {
            return Err(RecError::NoTrainingTasks.into());
        }

        // ── Step 3: Resolve the user count ────────────────────────────────────
        let n_users = resolve_user_count(&samples, cfg.n_users)?;
        tracing::info!("User table sized for {} users", n_users);

        // ── Step 4: Train / validation split ──────────────────────────────────
        let (train_samples, val_samples) = split_train_val(samples, cfg.train_fraction, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 5: Resolve tokenizer ─────────────────────────────────────────
        // The tokenizer always ends up in the checkpoint directory so the
        // checkpoint can be evaluated on its own.
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        let tokenizer    = TokenizerStore::new(&cfg.checkpoint_dir).resolve(
            cfg.tokenizer_path.as_deref().map(Path::new),
            || Ok(corpus_texts(&train_samples, &training_tasks, &val_samples, eval_task.as_ref())?),
            cfg.vocab_size,
            cfg.max_seq_len,
        )?;
        if cfg.tokenizer_path.is_some() {
            tokenizer.save(&ckpt_manager.tokenizer_path())?;
        }
        let model_cfg = cfg.model_config(&tokenizer, n_users);

        // ── Step 6: Prompt encoder ────────────────────────────────────────────
        let encoder = PromptEncoder::new(Arc::new(tokenizer), training_tasks, eval_task);

        // ── Step 7: Save config ───────────────────────────────────────────────
        let mut saved = cfg.clone();
        saved.n_users = Some(n_users);
        ckpt_manager.save_config(&saved)?;

        // ── Step 8: Run training loop (Layer 5) ───────────────────────────────
        run_training(&saved, &model_cfg, train_samples, val_samples, encoder, ckpt_manager)?;

        Ok(())
    }
}

/// Largest 1-based user index in `samples`, checked against an
/// explicitly configured table size.
pub fn resolve_user_count(samples: &[Sample], configured: Option<usize>) -> RecResult<usize> {
    let mut max_index = 0i64;
    for sample in samples {
        let index = sample.user_index()?;
        if index < 1 {
            return Err(RecError::UserIndexOutOfRange {
                index,
                n_users: configured.unwrap_or(0),
            });
        }
        max_index = max_index.max(index);
    }

    match configured {
        Some(n) if max_index as usize > n => Err(RecError::UserIndexOutOfRange { index: max_index, n_users: n }),
        Some(n) => Ok(n),
        None    => Ok(max_index.max(1) as usize),
    }
}

/// Prompt texts for building a vocabulary: every training task over the
/// training split, and the evaluation task over the validation split.
pub fn corpus_texts(
    train:          &[Sample],
    training_tasks: &[Arc<dyn Task>],
    validation:     &[Sample],
    eval_task:      Option<&Arc<dyn Task>>,
) -> RecResult<Vec<String>> {
    let mut texts = Vec::new();
    let pairs = train
        .iter()
        .flat_map(|s| training_tasks.iter().map(move |t| (s, t)))
        .chain(validation.iter().flat_map(|s| eval_task.map(|t| (s, t))));

    for (sample, task) in pairs {
        for instance in task.apply(sample)? {
            texts.push(instance.input_text);
            texts.push(instance.target_text);
        }
    }
    Ok(texts)
}
