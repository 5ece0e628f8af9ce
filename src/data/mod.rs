// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw JSONL samples to device-ready batches:
//
//   samples.jsonl
//       │
//       ▼
//   JsonlSampleLoader  → Vec<Sample>
//       │
//       ▼
//   split_train_val    → train / validation samples
//       │
//       ▼
//   PromptEncoder      → task sampling + tokenisation per sample
//       │
//       ▼
//   RecDataset         → implements Burn's Dataset trait
//       │
//       ▼
//   RecBatcher         → padded tensors + ignore-index labels
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads samples (JSONL) and prompt tasks (JSON)
pub mod loader;

/// Task sampling and tokenisation with word alignment
pub mod encoder;

/// Encoded sequences and the Burn Dataset over them
pub mod dataset;

/// Implements Burn's Batcher trait with dynamic padding
pub mod batcher;

/// Seeded shuffle and train/validation split
pub mod splitter;
