// ============================================================
// Layer 6 — Metrics
// ============================================================
// Ranking metrics over beam-search candidate groups, and a CSV
// logger for per-epoch training metrics.
//
// Every group has exactly one relevant item (its target), so:
//   hit@k = share of groups whose target appears in the top k
//   map@k = mean of 1 / rank over groups with the target in
//           the top k (average precision with one relevant item)
//
// Output file: checkpoints/metrics.csv
//
//   epoch,train_loss,val_loss,hit_at_1,hit_at_5,hit_at_10,map_at_10
//   1,3.124500,3.089200,0.012000,0.041000,0.066000,0.024310
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

use crate::domain::prediction::PredictionGroup;

// ─── Ranking metrics ──────────────────────────────────────────────────────────
pub fn hit_at_k(groups: &[PredictionGroup], k: usize) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let hits = groups
        .iter()
        .filter(|g| matches!(g.hit_rank(), Some(rank) if rank < k))
        .count();
    hits as f64 / groups.len() as f64
}

pub fn map_at_k(groups: &[PredictionGroup], k: usize) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let total: f64 = groups
        .iter()
        .filter_map(|g| g.hit_rank())
        .filter(|&rank| rank < k)
        .map(|rank| 1.0 / (rank + 1) as f64)
        .sum();
    total / groups.len() as f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingMetrics {
    pub hit_at_1:  f64,
    pub hit_at_5:  f64,
    pub hit_at_10: f64,
    pub map_at_10: f64,
}

impl RankingMetrics {
    pub fn from_groups(groups: &[PredictionGroup]) -> Self {
        Self {
            hit_at_1:  hit_at_k(groups, 1),
            hit_at_5:  hit_at_k(groups, 5),
            hit_at_10: hit_at_k(groups, 10),
            map_at_10: map_at_k(groups, 10),
        }
    }
}

// ─── Epoch metrics ────────────────────────────────────────────────────────────
/// One CSV row. Losses are NaN when the phase had no batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    pub ranking:    RankingMetrics,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64, ranking: RankingMetrics) -> Self {
        Self { epoch, train_loss, val_loss, ranking }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so runs
    /// resumed into the same directory append to one log.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_loss,hit_at_1,hit_at_5,hit_at_10,map_at_10")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        let r = &m.ranking;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.val_loss,
            r.hit_at_1, r.hit_at_5, r.hit_at_10, r.map_at_10,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}, hit@10={:.4}",
            m.epoch, m.train_loss, m.val_loss, r.hit_at_10,
        );

        Ok(())
    }
}
