// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::evaluate_use_case::EvaluateConfig;
use crate::application::train_use_case::TrainConfig;
use crate::domain::phase::{InjectionPhases, Phase};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the personalised recommender on a JSONL sample file
    Train(TrainArgs),

    /// Generate candidates with a trained checkpoint and score them
    Evaluate(EvaluateArgs),
}

/// Phase names accepted by `--inject-personalization`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseArg {
    Train,
    Eval,
    /// Disable personalization everywhere
    None,
}

fn injection_phases(args: &[PhaseArg]) -> InjectionPhases {
    if args.contains(&PhaseArg::None) {
        return InjectionPhases::none();
    }
    let phases: Vec<Phase> = args
        .iter()
        .filter_map(|p| match p {
            PhaseArg::Train => Some(Phase::Train),
            PhaseArg::Eval  => Some(Phase::Eval),
            PhaseArg::None  => None,
        })
        .collect();
    InjectionPhases::from_phases(&phases)
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSONL file with one sample per line (user_id, target_item, ...)
    #[arg(long, default_value = "data/samples.jsonl")]
    pub samples: String,

    /// JSON file with the training tasks and the evaluation task
    #[arg(long, default_value = "data/tasks.json")]
    pub tasks: String,

    /// Directory for checkpoints, tokenizer, configs and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Existing tokenizer.json; built from the prompts when omitted
    #[arg(long)]
    pub tokenizer: Option<String>,

    /// Checkpoint directory to initialise weights from
    #[arg(long)]
    pub init_from: Option<String>,

    /// Maximum number of tokens per input or target sequence
    #[arg(long, default_value_t = 512)]
    pub max_seq_len: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Decoupled weight decay of the AdamW optimiser
    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Seed for the split, task sampling and shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Share of samples used for training; the rest validates
    #[arg(long, default_value_t = 0.9)]
    pub train_fraction: f64,

    /// Hidden dimension; also the width of every user embedding
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Layers in each of the encoder and decoder stacks
    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Upper bound on the vocabulary of a built tokenizer
    #[arg(long, default_value_t = 32100)]
    pub vocab_size: usize,

    /// Probability of zeroing a user-embedding feature during training
    #[arg(long, default_value_t = 0.6)]
    pub user_dropout: f64,

    /// Number of users; the largest user index in the samples when omitted
    #[arg(long)]
    pub n_users: Option<usize>,

    /// Phases that add the user embedding (train, eval, none)
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [PhaseArg::Train, PhaseArg::Eval])]
    pub inject_personalization: Vec<PhaseArg>,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            samples_path:   a.samples,
            tasks_path:     a.tasks,
            checkpoint_dir: a.checkpoint_dir,
            tokenizer_path: a.tokenizer,
            init_from:      a.init_from,
            max_seq_len:    a.max_seq_len,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            weight_decay:   a.weight_decay,
            seed:           a.seed,
            train_fraction: a.train_fraction,
            d_model:        a.d_model,
            num_heads:      a.num_heads,
            num_layers:     a.num_layers,
            d_ff:           a.d_ff,
            dropout:        a.dropout,
            vocab_size:     a.vocab_size,
            user_dropout:   a.user_dropout,
            n_users:        a.n_users,
            inject_personalization: injection_phases(&a.inject_personalization),
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSONL file with the samples to evaluate
    #[arg(long)]
    pub samples: String,

    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Task file; defaults to the one used for training
    #[arg(long)]
    pub tasks: Option<String>,

    /// Predictions JSONL; defaults to <checkpoint_dir>/predictions.jsonl
    #[arg(long)]
    pub output: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Phases that add the user embedding; defaults to the training setting
    #[arg(long, value_enum, value_delimiter = ',')]
    pub inject_personalization: Option<Vec<PhaseArg>>,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_dir: a.checkpoint_dir,
            samples_path:   a.samples,
            tasks_path:     a.tasks,
            output_path:    a.output,
            batch_size:     a.batch_size,
            inject_personalization: a.inject_personalization.as_deref().map(injection_phases),
        }
    }
}
