// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop over the personalised model:
//
//   each epoch:
//     re-encode training samples (a fresh random task per sample)
//     train steps on Autodiff<Wgpu>  → loss.backward() → AdamW
//     model.valid() → valid steps on Wgpu (no autodiff)
//     ranking metrics → CSV, checkpoint → disk
//
// Reference: Burn Book §5

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::RecBatcher, dataset::RecDataset, encoder::PromptEncoder};
use crate::domain::phase::Phase;
use crate::domain::prediction::PredictionGroup;
use crate::domain::sample::Sample;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger, RankingMetrics};
use crate::ml::model::{suggested_optimizer, PersonalizedRecModel, RecModelConfig};

type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

pub fn run_training(
    cfg:           &TrainConfig,
    model_cfg:     &RecModelConfig,
    train_samples: Vec<Sample>,
    val_samples:   Vec<Sample>,
    encoder:       PromptEncoder,
    ckpt_manager:  CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop(cfg, model_cfg, train_samples, val_samples, encoder, ckpt_manager, device)
}

fn train_loop(
    cfg:           &TrainConfig,
    model_cfg:     &RecModelConfig,
    train_samples: Vec<Sample>,
    val_samples:   Vec<Sample>,
    encoder:       PromptEncoder,
    ckpt_manager:  CheckpointManager,
    device:        burn::backend::wgpu::WgpuDevice,
) -> Result<()> {
    let pad_id    = encoder.tokenizer().pad_id();
    let injection = cfg.inject_personalization;
    let mut rng   = StdRng::seed_from_u64(cfg.seed);

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: PersonalizedRecModel<MyBackend> = model_cfg.init(&device);
    if let Some(dir) = &cfg.init_from {
        model = CheckpointManager::new(dir).load_model(model, &device)?;
        tracing::info!("Initialised weights from '{}'", dir);
    }
    ckpt_manager.save_model_config(model_cfg)?;
    tracing::info!(
        "Model ready: {} layers, d_model={}, {} users, personalization={}",
        cfg.num_layers, cfg.d_model, model_cfg.n_users, injection,
    );

    let mut optim   = suggested_optimizer().with_weight_decay(cfg.weight_decay as f32).init();
    let metrics_log = MetricsLogger::new(&cfg.checkpoint_dir)?;

    // ── Validation data (fixed eval task, encoded once) ───────────────────────
    let val_dataset = match encoder.eval_task() {
        Some(_) if !val_samples.is_empty() => {
            Some(RecDataset::encode(&val_samples, &encoder, Phase::Eval, &mut rng)?)
        }
        Some(_) => {
            tracing::warn!("Validation split is empty; validation is skipped");
            None
        }
        None => {
            tracing::info!("No eval task configured; validation is skipped");
            None
        }
    };
    let val_loader = val_dataset.map(|ds| {
        DataLoaderBuilder::new(RecBatcher::<MyInnerBackend>::new(device.clone(), pad_id, Phase::Eval))
            .batch_size(cfg.batch_size)
            .num_workers(1)
            .build(ds)
    });

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let train_dataset = RecDataset::encode(&train_samples, &encoder, Phase::Train, &mut rng)?;
        tracing::debug!("Epoch {}: {} training sequences", epoch, train_dataset.sequence_count());

        let train_loader = DataLoaderBuilder::new(RecBatcher::<MyBackend>::new(device.clone(), pad_id, Phase::Train))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed.wrapping_add(epoch as u64))
            .num_workers(1)
            .build(train_dataset);

        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let loss = model.train_step(&batch, injection)?;

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut val_targets  = 0usize;
        let mut groups: Vec<PredictionGroup> = Vec::new();

        if let Some(loader) = &val_loader {
            let model_valid = model.valid();
            for batch in loader.iter() {
                let out = model_valid.valid_step(&encoder, batch, injection)?;
                val_loss_sum += out.loss;
                val_batches  += 1;
                val_targets  += out.target_items.len();
                groups.extend(out.predictions);
            }
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let ranking      = RankingMetrics::from_groups(&groups);
        tracing::debug!("Epoch {}: validated {} targets in {} batches", epoch, val_targets, val_batches);

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | hit@1={:.3} | hit@5={:.3} | hit@10={:.3} | map@10={:.3}",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss,
            ranking.hit_at_1, ranking.hit_at_5, ranking.hit_at_10, ranking.map_at_10,
        );

        metrics_log.log(&EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, ranking))?;
        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete!");
    Ok(())
}
