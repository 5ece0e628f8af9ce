// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and delegates to Layer 2 (application).
//
//   1. `train`    — fine-tunes the model on a sample file
//   2. `evaluate` — generates candidates with a checkpoint and
//                   reports hit@k / map@k
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "persona-rec",
    version = "0.1.0",
    about = "Fine-tune a personalised sequence-to-sequence recommender, then evaluate it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The CLI layer only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on samples in: {}", args.samples);

    let use_case = TrainUseCase::new(args.into());
    use_case.execute()?;

    println!("Training complete. Checkpoint saved.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let summary = EvaluateUseCase::new(args.into()).execute()?;
    let r       = &summary.ranking;

    println!(
        "\nEvaluated {} samples as {} prediction groups (loss {:.4})",
        summary.samples, summary.groups, summary.loss,
    );
    println!(
        "hit@1={:.4} | hit@5={:.4} | hit@10={:.4} | map@10={:.4}",
        r.hit_at_1, r.hit_at_5, r.hit_at_10, r.map_at_10,
    );
    println!("Predictions written to {}", summary.output_path.display());
    Ok(())
}
