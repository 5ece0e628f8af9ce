// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn modules and the train / eval step logic.
//
//   user_embedding.rs — per-user vectors with structured dropout
//   injector.rs       — adds a user's vector to every token embedding
//   backbone.rs       — Seq2SeqBackbone trait + GenerationConfig
//   seq2seq.rs        — in-crate encoder-decoder transformer
//   beam.rs           — beam search with n-gram blocking
//   steps.rs          — training and evaluation step controllers
//   model.rs          — backbone + user table composed as one module
//   trainer.rs        — epoch loop, optimiser, checkpoints
//   predictor.rs      — checkpoint-backed batch prediction
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

pub mod user_embedding;

pub mod injector;

/// Backbone contract the step controllers are written against
pub mod backbone;

/// Encoder-decoder transformer implementing the backbone contract
pub mod seq2seq;

pub mod beam;

pub mod steps;

pub mod model;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Loads a checkpoint and produces candidate groups for samples
pub mod predictor;
