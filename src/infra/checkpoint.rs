// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// A checkpoint directory is self-contained: everything needed
// to rebuild the model and encode new samples lives in it.
//
//   checkpoints/
//     model_epoch_1.mpk.gz   ← backbone + user embeddings after epoch 1
//     ...
//     latest_epoch.json      ← number of the latest saved epoch
//     model_config.json      ← RecModelConfig (architecture, n_users)
//     train_config.json      ← TrainConfig of the run
//     tokenizer.json         ← vocabulary used for encoding
//
// Weights are recorded at full precision; --init-from resumes
// from the exact saved values.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{PersonalizedRecModel, RecModelConfig};

type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Save backbone and user-embedding weights for `epoch` and move
    /// the latest-epoch pointer.
    pub fn save_model<B: Backend>(
        &self,
        model: &PersonalizedRecModel<B>,
        epoch: usize,
    ) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        WeightsRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join("latest_epoch.json"), serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the latest saved weights into `model`, whose architecture
    /// must match the one that was saved.
    pub fn load_model<B: Backend>(
        &self,
        model:  PersonalizedRecModel<B>,
        device: &B::Device,
    ) -> Result<PersonalizedRecModel<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = WeightsRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    /// Rebuild the model from `model_config.json` and the latest weights.
    pub fn restore_model<B: Backend>(&self, device: &B::Device) -> Result<(RecModelConfig, PersonalizedRecModel<B>)> {
        let model_cfg = self.load_model_config()?;
        let model     = self.load_model(model_cfg.init(device), device)?;
        Ok((model_cfg, model))
    }

    pub fn save_model_config(&self, cfg: &RecModelConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<RecModelConfig> {
        let path = self.dir.join("model_config.json");
        RecModelConfig::load(&path).with_context(|| {
            format!(
                "Cannot read model config from '{}'. \
                 Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");

        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'evaluate'.",
                    path.display()
                )
            })?;

        Ok(serde_json::from_str(&json)?)
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");

        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;

        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use crate::ml::seq2seq::Seq2SeqConfig;

    type TestBackend = NdArray<f32>;

    fn model_config() -> RecModelConfig {
        RecModelConfig::new(Seq2SeqConfig::new(12, 16, 8, 2, 1, 16, 0.0), 3)
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy());
        let err  = ckpt.load_model_config().unwrap_err();
        assert!(err.to_string().contains("model_config.json"));
    }

    #[test]
    fn test_model_round_trips_through_disk() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path().to_string_lossy());
        let device = Default::default();

        let model: PersonalizedRecModel<TestBackend> = model_config().init(&device);
        ckpt.save_model_config(&model_config()).unwrap();
        ckpt.save_model(&model, 2).unwrap();

        let (cfg, restored) = ckpt.restore_model::<TestBackend>(&device).unwrap();
        assert_eq!(cfg.n_users, 3);

        let before = model.user_embeddings.weight.val().into_data();
        let after  = restored.user_embeddings.weight.val().into_data();
        after.assert_approx_eq(&before, 6);
    }

    #[test]
    fn test_train_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_string_lossy());

        let mut cfg = TrainConfig::default();
        cfg.epochs  = 7;
        ckpt.save_config(&cfg).unwrap();

        assert_eq!(ckpt.load_config().unwrap().epochs, 7);
    }
}
