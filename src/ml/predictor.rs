// ============================================================
// Layer 5 — Predictor
// ============================================================
// Restores a trained checkpoint and runs the evaluation step
// over arbitrary samples:
//
//   samples → eval-task prompts → batches of `batch_size`
//           → valid_step → candidate groups + mean loss

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, data::dataset::Dataset, prelude::*};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;

use crate::data::{batcher::RecBatcher, dataset::RecDataset, encoder::PromptEncoder};
use crate::domain::phase::{InjectionPhases, Phase};
use crate::domain::prediction::PredictionGroup;
use crate::domain::sample::Sample;
use crate::domain::traits::Task;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::tokenizer_store::HfPromptTokenizer;
use crate::ml::model::PersonalizedRecModel;

/// Candidate groups for every evaluated sample and the mean
/// per-batch loss.
#[derive(Debug, Clone)]
pub struct PredictionReport {
    pub groups: Vec<PredictionGroup>,
    pub loss:   f64,
}

pub struct Predictor<B: Backend> {
    model:     PersonalizedRecModel<B>,
    encoder:   PromptEncoder,
    injection: InjectionPhases,
    device:    B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        model:     PersonalizedRecModel<B>,
        encoder:   PromptEncoder,
        injection: InjectionPhases,
        device:    B::Device,
    ) -> Self {
        Self { model, encoder, injection, device }
    }

    /// Rebuild model and tokenizer from a checkpoint directory.
    pub fn from_checkpoint(
        ckpt:      &CheckpointManager,
        eval_task: Arc<dyn Task>,
        injection: InjectionPhases,
        device:    B::Device,
    ) -> Result<Self> {
        let (model_cfg, model) = ckpt.restore_model::<B>(&device)?;
        let tokenizer = HfPromptTokenizer::from_file(&ckpt.tokenizer_path(), model_cfg.backbone.max_seq_len)?;
        let encoder   = PromptEncoder::new(Arc::new(tokenizer), Vec::new(), Some(eval_task));

        tracing::info!(
            "Model loaded from '{}' ({} users, personalization={})",
            ckpt.dir().display(), model_cfg.n_users, injection,
        );
        Ok(Self::new(model, encoder, injection, device))
    }

    pub fn predict(&self, samples: &[Sample], batch_size: usize) -> Result<PredictionReport> {
        // Eval encoding draws nothing from the rng.
        let mut rng = StdRng::seed_from_u64(0);
        let dataset = RecDataset::encode(samples, &self.encoder, Phase::Eval, &mut rng)?;
        let batcher = RecBatcher::<B>::new(self.device.clone(), self.encoder.tokenizer().pad_id(), Phase::Eval);

        let sequences: Vec<_> = dataset.iter().collect();
        let mut groups   = Vec::with_capacity(sequences.len());
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for chunk in sequences.chunks(batch_size.max(1)) {
            let out = self.model.valid_step(&self.encoder, batcher.batch(chunk.to_vec()), self.injection)?;
            loss_sum += out.loss;
            batches  += 1;
            groups.extend(out.predictions);
            tracing::debug!("Predicted {}/{} samples", groups.len(), sequences.len());
        }

        let loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        Ok(PredictionReport { groups, loss })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::template::PromptTemplate;
    use crate::domain::traits::PromptTokenizer;
    use crate::infra::tokenizer_store::build_word_level_json;
    use crate::ml::model::RecModelConfig;
    use crate::ml::seq2seq::Seq2SeqConfig;

    type TestBackend = NdArray<f32>;

    fn eval_task() -> Arc<dyn Task> {
        Arc::new(PromptTemplate::new("direct").with_pair("what should {user_id} buy next ?", "{target_item}"))
    }

    fn write_checkpoint(dir: &std::path::Path) -> CheckpointManager {
        let ckpt  = CheckpointManager::new(dir.to_string_lossy());
        let texts = vec![
            "what should user_1 buy next ?".to_string(),
            "what should user_2 buy next ?".to_string(),
            "item_7 item_9".to_string(),
        ];
        let tok = HfPromptTokenizer::from_json(&build_word_level_json(&texts, 64).unwrap().to_string(), 16).unwrap();
        tok.save(&ckpt.tokenizer_path()).unwrap();

        let backbone = Seq2SeqConfig::new(tok.vocab_size(), 16, 8, 2, 1, 16, 0.0)
            .with_pad_token_id(tok.pad_id() as usize)
            .with_eos_token_id(tok.eos_id() as usize);
        let model_cfg = RecModelConfig::new(backbone, 2);
        let model: PersonalizedRecModel<TestBackend> = model_cfg.init(&Default::default());

        ckpt.save_model_config(&model_cfg).unwrap();
        ckpt.save_model(&model, 1).unwrap();
        ckpt
    }

    #[test]
    fn test_predict_returns_ten_candidates_per_sample() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());

        let predictor = Predictor::<TestBackend>::from_checkpoint(
            &ckpt, eval_task(), InjectionPhases::all(), Default::default(),
        ).unwrap();

        let samples = vec![Sample::new("user_1", "item_7"), Sample::new("user_2", "item_9"), Sample::new("user_1", "item_9")];
        let report  = predictor.predict(&samples, 2).unwrap();

        assert_eq!(report.groups.len(), 3);
        assert!(report.groups.iter().all(|g| g.candidates.len() == 10));
        assert_eq!(report.groups[1].target, "item_9");
        assert!(report.loss.is_finite());
    }

    #[test]
    fn test_predict_rejects_unknown_user() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = write_checkpoint(dir.path());

        let predictor = Predictor::<TestBackend>::from_checkpoint(
            &ckpt, eval_task(), InjectionPhases::all(), Default::default(),
        ).unwrap();

        assert!(predictor.predict(&[Sample::new("user_5", "item_7")], 1).is_err());
    }
}
