// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs      — model weights, model config, train config
//                        and tokenizer kept together per run
//
//   tokenizer_store.rs — resolves the tokenizer for a run and adapts
//                        it to the PromptTokenizer contract
//
//   metrics.rs         — hit@k / map@k over candidate groups and the
//                        per-epoch CSV log
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer resolution, saving, and loading
pub mod tokenizer_store;

/// Ranking metrics and the training metrics CSV logger
pub mod metrics;
