// ============================================================
// Layer 5 — Personalization Injector
// ============================================================
// Adds each sample's user vector to every one of its token
// embeddings:
//
//   token_embeds [batch, seq, d] + user_embeds [batch, 1, d]
//
// User indices arrive 1-based; row = index - 1. Indices outside
// 1..=n_users are rejected before any lookup.

use burn::prelude::*;

use crate::domain::error::{RecError, Result};
use crate::domain::phase::Phase;
use crate::ml::user_embedding::UserEmbedding;

/// Fail on the first index outside 1..=n_users.
pub fn check_user_indices<B: Backend>(user_idx: &Tensor<B, 1, Int>, n_users: usize) -> Result<()> {
    let bad = user_idx
        .clone()
        .into_data()
        .iter::<i64>()
        .find(|&i| i < 1 || i > n_users as i64);

    match bad {
        Some(index) => Err(RecError::UserIndexOutOfRange { index, n_users }),
        None        => Ok(()),
    }
}

pub fn inject_personalization<B: Backend>(
    users:        &UserEmbedding<B>,
    token_embeds: Tensor<B, 3>,
    user_idx:     Tensor<B, 1, Int>,
    phase:        Phase,
) -> Result<Tensor<B, 3>> {
    check_user_indices(&user_idx, users.n_users())?;

    let rows        = user_idx.sub_scalar(1);
    let user_embeds = users.forward(rows, phase).unsqueeze_dim::<3>(1);
    Ok(token_embeds + user_embeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::user_embedding::UserEmbeddingConfig;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn users(ids: &[i64]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_data(TensorData::new(ids.to_vec(), [ids.len()]), &Default::default())
    }

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_same_vector_added_at_every_position() {
        let device = Default::default();
        let table  = UserEmbeddingConfig::new(5, 4).init::<TestBackend>(&device);
        let tokens = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);

        let out = inject_personalization(&table, tokens, users(&[1, 5]), Phase::Eval).unwrap();
        assert_eq!(out.dims(), [2, 3, 4]);

        let expected_first = values(table.forward(users(&[0]), Phase::Eval));
        let expected_last  = values(table.forward(users(&[4]), Phase::Eval));
        let out = values(out);
        for pos in 0..3 {
            assert_eq!(&out[pos * 4..pos * 4 + 4], &expected_first[..]);
            assert_eq!(&out[12 + pos * 4..12 + pos * 4 + 4], &expected_last[..]);
        }
    }

    #[test]
    fn test_lowest_index_maps_to_row_zero() {
        let device = Default::default();
        let table  = UserEmbeddingConfig::new(3, 2).init::<TestBackend>(&device);
        let tokens = Tensor::<TestBackend, 3>::zeros([1, 1, 2], &device);

        let out = inject_personalization(&table, tokens, users(&[1]), Phase::Eval).unwrap();
        assert_eq!(values(out), values(table.forward(users(&[0]), Phase::Eval)));
    }

    #[test]
    fn test_out_of_range_indices_fail() {
        let device = Default::default();
        let table  = UserEmbeddingConfig::new(3, 2).init::<TestBackend>(&device);

        // n_users itself is still valid (last row); n_users + 1 is not
        assert!(check_user_indices(&users(&[3]), 3).is_ok());
        let err = inject_personalization(
            &table,
            Tensor::zeros([1, 1, 2], &device),
            users(&[4]),
            Phase::Eval,
        )
        .unwrap_err();
        assert_eq!(err, RecError::UserIndexOutOfRange { index: 4, n_users: 3 });

        let err = check_user_indices(&users(&[0]), 3).unwrap_err();
        assert_eq!(err, RecError::UserIndexOutOfRange { index: 0, n_users: 3 });
    }
}
