// ============================================================
// Layer 5 — Personalised Recommendation Model
// ============================================================
// Composition of the sequence-to-sequence backbone and the user
// embedding table. Both are trained jointly and saved together
// in one record.

use burn::{
    grad_clipping::GradientClippingConfig,
    optim::AdamWConfig,
    prelude::*,
};

use crate::data::batcher::RecBatch;
use crate::data::encoder::PromptEncoder;
use crate::domain::error::Result as RecResult;
use crate::domain::phase::InjectionPhases;
use crate::ml::seq2seq::{Seq2SeqConfig, Seq2SeqModel};
use crate::ml::steps::{train_step, valid_step, ValidOutput};
use crate::ml::user_embedding::{UserEmbedding, UserEmbeddingConfig};

#[derive(Config, Debug)]
pub struct RecModelConfig {
    pub backbone: Seq2SeqConfig,
    pub n_users:  usize,
    #[config(default = 0.6)]
    pub user_dropout: f64,
}

impl RecModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PersonalizedRecModel<B> {
        PersonalizedRecModel {
            backbone:        self.backbone.init(device),
            user_embeddings: UserEmbeddingConfig::new(self.n_users, self.backbone.d_model)
                .with_dropout(self.user_dropout)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct PersonalizedRecModel<B: Backend> {
    pub backbone:        Seq2SeqModel<B>,
    pub user_embeddings: UserEmbedding<B>,
}

impl<B: Backend> PersonalizedRecModel<B> {
    pub fn train_step(&self, batch: &RecBatch<B>, injection: InjectionPhases) -> RecResult<Tensor<B, 1>> {
        train_step(&self.backbone, &self.user_embeddings, batch, injection)
    }

    pub fn valid_step(
        &self,
        encoder:   &PromptEncoder,
        batch:     RecBatch<B>,
        injection: InjectionPhases,
    ) -> RecResult<ValidOutput> {
        valid_step(&self.backbone, &self.user_embeddings, encoder, batch, injection)
    }
}

/// AdamW standing in for Adafactor(lr 1e-3, weight decay 0.01,
/// clip threshold 1.0); pair it with a learning rate of 1e-3.
pub fn suggested_optimizer() -> AdamWConfig {
    AdamWConfig::new()
        .with_weight_decay(0.01)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(1.0)))
}
