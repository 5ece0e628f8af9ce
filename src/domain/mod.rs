// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing what the system works
// with: user samples, prompt templates, training phases and the
// collaborator contracts (tasks, tokenizer, sample sources).
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Typed errors for precondition and configuration failures
pub mod error;

/// Training / evaluation phase and the personalization switch
pub mod phase;

/// Generated candidates grouped per evaluation sample
pub mod prediction;

/// One user's structured record
pub mod sample;

/// Config-driven prompt templates implementing `Task`
pub mod template;

/// Core abstractions (traits) that other layers implement
pub mod traits;
