// ============================================================
// Layer 5 — Step Controllers
// ============================================================
// Train step:
//   input_ids → token embeddings → (+ user embedding) → loss
//
// Validation step (no gradient tracking):
//   target items set aside
//   input_ids → token embeddings → (+ user embedding)
//     ├─▶ forward pass → validation loss
//     └─▶ beam search  → batch·10 sequences → decoded text
//                                           → groups of 10
//
// Whether the user embedding is added is decided per phase by
// `InjectionPhases`.

use burn::prelude::*;

use crate::data::batcher::RecBatch;
use crate::data::encoder::PromptEncoder;
use crate::domain::error::{RecError, Result};
use crate::domain::phase::{InjectionPhases, Phase};
use crate::domain::prediction::PredictionGroup;
use crate::ml::backbone::{GenerationConfig, Seq2SeqBackbone};
use crate::ml::injector::inject_personalization;
use crate::ml::user_embedding::UserEmbedding;

#[derive(Debug, Clone)]
pub struct ValidOutput {
    /// One group of `num_return_sequences` candidates per sample
    pub predictions:  Vec<PredictionGroup>,
    pub target_items: Vec<String>,
    pub loss:         f64,
}

fn personalized_embeddings<B: Backend, M: Seq2SeqBackbone<B>>(
    backbone:  &M,
    users:     &UserEmbedding<B>,
    input_ids: Tensor<B, 2, Int>,
    user_idx:  Tensor<B, 1, Int>,
    injection: InjectionPhases,
    phase:     Phase,
) -> Result<Tensor<B, 3>> {
    let inputs_embeds = backbone.embed_tokens(input_ids);
    if injection.enabled(phase) {
        inject_personalization(users, inputs_embeds, user_idx, phase)
    } else {
        Ok(inputs_embeds)
    }
}

/// Loss for one training batch. Backward and the optimizer step
/// belong to the caller.
pub fn train_step<B: Backend, M: Seq2SeqBackbone<B>>(
    backbone:  &M,
    users:     &UserEmbedding<B>,
    batch:     &RecBatch<B>,
    injection: InjectionPhases,
) -> Result<Tensor<B, 1>> {
    let labels = batch.labels.clone().ok_or(RecError::MissingBatchField("labels"))?;
    debug_assert_eq!(batch.whole_word_ids.dims(), batch.input_ids.dims());

    let inputs_embeds = personalized_embeddings(
        backbone,
        users,
        batch.input_ids.clone(),
        batch.user_idx.clone(),
        injection,
        Phase::Train,
    )?;

    Ok(backbone.forward_loss(inputs_embeds, batch.attention_mask.clone(), labels))
}

/// Loss, beam-search predictions and ground truth for one
/// evaluation batch. Run it on a non-autodiff backend (e.g. the
/// result of `model.valid()`); every tensor here is detached.
pub fn valid_step<B: Backend, M: Seq2SeqBackbone<B>>(
    backbone:  &M,
    users:     &UserEmbedding<B>,
    encoder:   &PromptEncoder,
    mut batch: RecBatch<B>,
    injection: InjectionPhases,
) -> Result<ValidOutput> {
    if encoder.eval_task().is_none() {
        return Err(RecError::EvalTaskNotSet);
    }
    let generation = GenerationConfig::evaluation();
    debug_assert_eq!(batch.whole_word_ids.dims(), batch.input_ids.dims());

    let target_items = batch.target_item.take().ok_or(RecError::MissingBatchField("target items"))?;
    let labels       = batch.labels.take().ok_or(RecError::MissingBatchField("labels"))?;

    let inputs_embeds = personalized_embeddings(
        backbone,
        users,
        batch.input_ids,
        batch.user_idx,
        injection,
        Phase::Eval,
    )?
    .detach();

    let loss = backbone
        .forward_loss(inputs_embeds.clone(), batch.attention_mask.clone(), labels)
        .detach()
        .into_scalar()
        .elem::<f64>();

    let generated = backbone.generate(inputs_embeds, batch.attention_mask, &generation);
    let decoded   = encoder.tokenizer().batch_decode(&generated, true)?;

    let expected = target_items.len() * generation.num_return_sequences;
    if decoded.len() != expected {
        return Err(RecError::PredictionCount { expected, got: decoded.len() });
    }

    let tokenizer   = encoder.tokenizer();
    let predictions = decoded
        .chunks(generation.num_return_sequences)
        .zip(&target_items)
        .map(|(candidates, target)| {
            Ok(PredictionGroup {
                target:         target.clone(),
                decoded_target: Some(tokenizer.round_trip(target)?),
                candidates:     candidates.to_vec(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ValidOutput { predictions, target_items, loss })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::RecBatcher;
    use crate::data::dataset::EncodedSequence;
    use crate::data::encoder::tests::corpus_tokenizer;
    use crate::domain::template::PromptTemplate;
    use crate::ml::seq2seq::masked_cross_entropy;
    use crate::ml::user_embedding::UserEmbeddingConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;
    use burn::module::Param;
    use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
    use std::sync::Arc;

    type TestBackend = NdArray;

    /// Embedding table + linear head over the mean-pooled input;
    /// `generate` emits the argmax token ten times per row.
    #[derive(Module, Debug)]
    struct MockBackbone<B: Backend> {
        embed: Embedding<B>,
        head:  Linear<B>,
    }

    impl<B: Backend> MockBackbone<B> {
        fn new(device: &B::Device) -> Self {
            Self {
                embed: EmbeddingConfig::new(64, 8).init(device),
                head:  LinearConfig::new(8, 64).init(device),
            }
        }

        fn logits(&self, inputs_embeds: Tensor<B, 3>, tgt_len: usize) -> Tensor<B, 3> {
            let [batch, _, d] = inputs_embeds.dims();
            let pooled = inputs_embeds.mean_dim(1); // [batch, 1, d]
            self.head.forward(pooled.expand([batch, tgt_len, d]))
        }
    }

    impl<B: Backend> Seq2SeqBackbone<B> for MockBackbone<B> {
        fn embed_tokens(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
            self.embed.forward(input_ids)
        }

        fn forward_loss(
            &self,
            inputs_embeds:   Tensor<B, 3>,
            _attention_mask: Tensor<B, 2, Int>,
            labels:          Tensor<B, 2, Int>,
        ) -> Tensor<B, 1> {
            let tgt_len = labels.dims()[1];
            masked_cross_entropy(self.logits(inputs_embeds, tgt_len), labels)
        }

        fn generate(
            &self,
            inputs_embeds:   Tensor<B, 3>,
            _attention_mask: Tensor<B, 2, Int>,
            config:          &GenerationConfig,
        ) -> Vec<Vec<u32>> {
            let best: Vec<i64> = self
                .logits(inputs_embeds, 1)
                .argmax(2)
                .into_data()
                .iter::<i64>()
                .collect();
            best.iter()
                .flat_map(|&tok| {
                    (0..config.num_return_sequences).map(move |k| vec![0, tok as u32, (3 + k) as u32, 1])
                })
                .collect()
        }
    }

    fn encoder() -> PromptEncoder {
        let task = Arc::new(PromptTemplate::new("direct").with_pair("which item should {user_id} buy ?", "{target_item}"));
        PromptEncoder::new(corpus_tokenizer(), vec![task.clone()], Some(task))
    }

    fn items() -> Vec<EncodedSequence> {
        (1..=3)
            .map(|u| EncodedSequence {
                input_ids:      vec![3, 4, 5, 1],
                attention_mask: vec![1, 1, 1, 1],
                labels:         Some(vec![6, 1]),
                whole_word_ids: vec![1, 2, 3, 0],
                user_idx:       u,
                target_item:    format!("item_{u}"),
            })
            .collect()
    }

    fn eval_batch() -> RecBatch<TestBackend> {
        RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Eval).batch(items())
    }

    #[test]
    fn test_valid_step_groups_ten_per_sample() {
        let device   = Default::default();
        let backbone = MockBackbone::<TestBackend>::new(&device);
        let users    = UserEmbeddingConfig::new(3, 8).init::<TestBackend>(&device);

        let out = valid_step(&backbone, &users, &encoder(), eval_batch(), InjectionPhases::all()).unwrap();
        assert_eq!(out.predictions.len(), 3);
        assert!(out.predictions.iter().all(|g| g.candidates.len() == 10));
        assert_eq!(out.target_items, vec!["item_1", "item_2", "item_3"]);
        assert_eq!(out.predictions[2].target, "item_3");
        assert_eq!(out.predictions[0].decoded_target.as_deref(), Some("item_1"));
        assert!(out.loss.is_finite());
    }

    #[test]
    fn test_valid_step_requires_eval_task() {
        let device   = Default::default();
        let backbone = MockBackbone::<TestBackend>::new(&device);
        let users    = UserEmbeddingConfig::new(3, 8).init::<TestBackend>(&device);
        let encoder  = PromptEncoder::new(corpus_tokenizer(), vec![], None);

        let err = valid_step(&backbone, &users, &encoder, eval_batch(), InjectionPhases::all()).unwrap_err();
        assert_eq!(err, RecError::EvalTaskNotSet);
    }

    #[test]
    fn test_eval_output_ignores_users_when_injection_disabled() {
        let device    = Default::default();
        let backbone  = MockBackbone::<TestBackend>::new(&device);
        let mut users = UserEmbeddingConfig::new(3, 8).init::<TestBackend>(&device);
        let train_only = InjectionPhases::from_phases(&[Phase::Train]);

        let before = valid_step(&backbone, &users, &encoder(), eval_batch(), train_only).unwrap();

        users.weight = Param::from_tensor(users.weight.val().add_scalar(5.0));
        let after = valid_step(&backbone, &users, &encoder(), eval_batch(), train_only).unwrap();

        assert_eq!(before.predictions, after.predictions);
        assert_eq!(before.loss, after.loss);

        // with injection on, the same perturbation changes the loss
        let with_users = valid_step(&backbone, &users, &encoder(), eval_batch(), InjectionPhases::all()).unwrap();
        assert_ne!(with_users.loss, after.loss);
    }

    #[test]
    fn test_train_step_produces_gradients_for_users() {
        type TrainBackend = Autodiff<NdArray>;
        let device   = Default::default();
        let backbone = MockBackbone::<TrainBackend>::new(&device);
        let users    = UserEmbeddingConfig::new(3, 8).with_dropout(0.0).init::<TrainBackend>(&device);
        let batch    = RecBatcher::<TrainBackend>::new(device, 0, Phase::Train).batch(items());

        let loss  = train_step(&backbone, &users, &batch, InjectionPhases::all()).unwrap();
        let grads = loss.backward();
        assert!(users.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_train_step_rejects_unknown_user() {
        let device   = Default::default();
        let backbone = MockBackbone::<TestBackend>::new(&device);
        let users    = UserEmbeddingConfig::new(2, 8).init::<TestBackend>(&device);
        let batch    = RecBatcher::<TestBackend>::new(device, 0, Phase::Train).batch(items());

        let err = train_step(&backbone, &users, &batch, InjectionPhases::all()).unwrap_err();
        assert_eq!(err, RecError::UserIndexOutOfRange { index: 3, n_users: 2 });

        // the same batch passes when injection is off for training
        assert!(train_step(&backbone, &users, &batch, InjectionPhases::none()).is_ok());
    }
}
