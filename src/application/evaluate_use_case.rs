// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Runs a trained checkpoint over a sample file:
//
//   Step 1: Load the run's TrainConfig   (Layer 6 - infra)
//   Step 2: Load samples and eval task   (Layer 4 - data)
//   Step 3: Restore the predictor        (Layer 5 - ml)
//   Step 4: Predict candidate groups     (Layer 5 - ml)
//   Step 5: Write predictions JSONL      (Layer 6 - infra)
//   Step 6: Score hit@k / map@k          (Layer 6 - infra)

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::data::loader::{JsonlSampleLoader, TaskSet};
use crate::domain::error::RecError;
use crate::domain::phase::InjectionPhases;
use crate::domain::prediction::PredictionGroup;
use crate::domain::traits::SampleSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::RankingMetrics,
};
use crate::ml::predictor::{PredictionReport, Predictor};

type InferBackend = burn::backend::Wgpu;

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub checkpoint_dir: String,
    pub samples_path:   String,
    /// Task file; the training run's task file when unset
    pub tasks_path:     Option<String>,
    /// Predictions JSONL; `<checkpoint_dir>/predictions.jsonl` when unset
    pub output_path:    Option<String>,
    pub batch_size:     usize,
    /// Phases with personalization; the training run's setting when unset
    pub inject_personalization: Option<InjectionPhases>,
}

#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub samples:     usize,
    /// One per eval-task phrasing of every sample
    pub groups:      usize,
    pub loss:        f64,
    pub ranking:     RankingMetrics,
    pub output_path: PathBuf,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvaluationSummary> {
        let cfg  = &self.config;
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);

        // ── Step 1: Run configuration ─────────────────────────────────────────
        let train_cfg = ckpt.load_config()?;
        let injection = cfg.inject_personalization.unwrap_or(train_cfg.inject_personalization);

        // ── Step 2: Samples and evaluation task ───────────────────────────────
        let samples    = JsonlSampleLoader::new(&cfg.samples_path).load_all()?;
        let tasks_path = cfg.tasks_path.clone().unwrap_or(train_cfg.tasks_path);
        let eval_task  = TaskSet::load(Path::new(&tasks_path))?
            .eval_task()
            .ok_or(RecError::EvalTaskNotSet)?;

        // ── Step 3: Restore model + tokenizer ─────────────────────────────────
        let device    = burn::backend::wgpu::WgpuDevice::default();
        let predictor = Predictor::<InferBackend>::from_checkpoint(&ckpt, eval_task, injection, device)?;

        // ── Step 4: Predict ───────────────────────────────────────────────────
        let report = predictor.predict(&samples, cfg.batch_size)?;

        // ── Step 5: Predictions file ──────────────────────────────────────────
        let output_path = cfg
            .output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| ckpt.dir().join("predictions.jsonl"));
        write_predictions(&output_path, &report.groups)?;
        tracing::info!("Wrote {} prediction groups to '{}'", report.groups.len(), output_path.display());

        // ── Step 6: Ranking metrics ───────────────────────────────────────────
        Ok(summarize(samples.len(), &report, output_path))
    }
}

/// Sample count is reported separately from the group count since an
/// eval task with several phrasings yields several groups per sample.
pub fn summarize(samples: usize, report: &PredictionReport, output_path: PathBuf) -> EvaluationSummary {
    EvaluationSummary {
        samples,
        groups:  report.groups.len(),
        loss:    report.loss,
        ranking: RankingMetrics::from_groups(&report.groups),
        output_path,
    }
}

/// One JSON object per line: `{"target": ..., "candidates": [...]}`.
pub fn write_predictions(path: &Path, groups: &[PredictionGroup]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create predictions file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for group in groups {
        serde_json::to_writer(&mut out, group)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictions_written_one_group_per_line() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("predictions.jsonl");
        let groups = vec![
            PredictionGroup {
                target:         "item_1".into(),
                decoded_target: None,
                candidates:     vec!["item_1".into(), "item_2".into()],
            },
            PredictionGroup {
                target:         "Item-9".into(),
                decoded_target: Some("item - 9".into()),
                candidates:     vec!["item_3".into()],
            },
        ];

        write_predictions(&path, &groups).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let back: Vec<PredictionGroup> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(back, groups);
    }

    #[test]
    fn test_summary_counts_samples_not_phrasings() {
        let group = |target: &str| PredictionGroup {
            target:         target.into(),
            decoded_target: None,
            candidates:     vec![target.into()],
        };
        // two samples, an eval task with two phrasings each
        let report = PredictionReport {
            groups: vec![group("a"), group("a"), group("b"), group("b")],
            loss:   1.5,
        };

        let summary = summarize(2, &report, PathBuf::from("p.jsonl"));
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.groups, 4);
        assert_eq!(summary.ranking.hit_at_1, 1.0);
    }
}
