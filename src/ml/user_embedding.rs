// ============================================================
// Layer 5 — User Embedding
// ============================================================
// One learned vector per user, added to the token embeddings to
// personalise generation.
//
//   rows [batch]  →  table lookup           [batch, d_model]
//                 →  feature dropout        (training only)
//                 →  leaky ReLU
//
// Feature dropout zeroes whole embedding dimensions: one
// Bernoulli draw per dimension, shared by every user in the
// batch, survivors scaled by 1 / (1 - p).
//
// Reference: Tompson et al. (2015) spatial dropout
//            Glorot & Bengio (2010) Xavier initialisation

use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
    tensor::{activation::leaky_relu, Distribution},
};

use crate::domain::phase::Phase;

#[derive(Config, Debug)]
pub struct UserEmbeddingConfig {
    pub n_users: usize,
    pub d_model: usize,
    #[config(default = 0.6)]
    pub dropout: f64,
    #[config(default = 0.01)]
    pub negative_slope: f64,
}

impl UserEmbeddingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UserEmbedding<B> {
        // fan_in / fan_out as torch computes them for a 2-D weight
        let weight = Initializer::XavierUniform { gain: 1.0 }.init_with(
            [self.n_users, self.d_model],
            Some(self.d_model),
            Some(self.n_users),
            device,
        );
        UserEmbedding {
            weight,
            n_users:        self.n_users,
            dropout:        self.dropout,
            negative_slope: self.negative_slope,
        }
    }
}

#[derive(Module, Debug)]
pub struct UserEmbedding<B: Backend> {
    /// [n_users, d_model]
    pub weight:     Param<Tensor<B, 2>>,
    n_users:        usize,
    dropout:        f64,
    negative_slope: f64,
}

impl<B: Backend> UserEmbedding<B> {
    pub fn n_users(&self) -> usize {
        self.n_users
    }

    /// rows: 0-based table rows, shape [batch] → [batch, d_model]
    pub fn forward(&self, rows: Tensor<B, 1, Int>, phase: Phase) -> Tensor<B, 2> {
        let x = self.weight.val().select(0, rows);
        let x = match phase {
            Phase::Train => self.feature_dropout(x),
            Phase::Eval  => x,
        };
        leaky_relu(x, self.negative_slope)
    }

    fn feature_dropout(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        if self.dropout <= 0.0 {
            return x;
        }
        if self.dropout >= 1.0 {
            return x.zeros_like();
        }

        let [_, d_model] = x.dims();
        let keep = 1.0 - self.dropout;
        // [1, d_model] broadcasts over the batch: a dropped dimension
        // is dropped for every user in this call
        let mask = Tensor::<B, 2>::random([1, d_model], Distribution::Bernoulli(keep), &x.device());
        x * mask.div_scalar(keep)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn rows(ids: &[i64]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_data(burn::tensor::TensorData::new(ids.to_vec(), [ids.len()]), &Default::default())
    }

    fn to_rows(t: Tensor<TestBackend, 2>) -> Vec<Vec<f32>> {
        let [_, d] = t.dims();
        let flat: Vec<f32> = t.into_data().iter::<f32>().collect();
        flat.chunks(d).map(|c| c.to_vec()).collect()
    }

    #[test]
    fn test_eval_shape_and_no_dropout() {
        let device = Default::default();
        let emb    = UserEmbeddingConfig::new(10, 16).init::<TestBackend>(&device);

        let out = emb.forward(rows(&[0, 3, 9]), Phase::Eval);
        assert_eq!(out.dims(), [3, 16]);

        // eval output is leaky_relu(table row), deterministic across calls
        let again = emb.forward(rows(&[0, 3, 9]), Phase::Eval);
        assert_eq!(to_rows(out.clone()), to_rows(again));

        let table = to_rows(emb.weight.val());
        let out   = to_rows(out);
        for (got, &want) in out[1].iter().zip(&table[3]) {
            let want = if want >= 0.0 { want } else { want * 0.01 };
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_xavier_bounds() {
        let emb   = UserEmbeddingConfig::new(50, 30).init::<TestBackend>(&Default::default());
        let bound = (6.0f32 / 80.0).sqrt();
        assert!(to_rows(emb.weight.val()).iter().flatten().all(|w| w.abs() <= bound));
    }

    #[test]
    fn test_training_dropout_is_dimension_wise() {
        let device = Default::default();
        let emb    = UserEmbeddingConfig::new(8, 64).init::<TestBackend>(&device);

        for _ in 0..5 {
            let out = to_rows(emb.forward(rows(&[0, 1, 2, 3, 4, 5, 6, 7]), Phase::Train));
            let mut dropped = 0;
            for col in 0..64 {
                let zeros = out.iter().filter(|r| r[col] == 0.0).count();
                // a column is either zero for every user or for none
                assert!(zeros == 0 || zeros == out.len(), "column {col} partially dropped");
                if zeros == out.len() {
                    dropped += 1;
                }
            }
            assert!(dropped > 0 && dropped < 64);
        }
    }

    #[test]
    fn test_kept_dimensions_are_rescaled() {
        let device = Default::default();
        let emb    = UserEmbeddingConfig::new(4, 32).init::<TestBackend>(&device);

        let eval  = to_rows(emb.forward(rows(&[2]), Phase::Eval));
        let train = to_rows(emb.forward(rows(&[2]), Phase::Train));
        for (t, e) in train[0].iter().zip(&eval[0]) {
            if *t != 0.0 {
                assert!((t - e / 0.4).abs() < 1e-4);
            }
        }
    }
}
