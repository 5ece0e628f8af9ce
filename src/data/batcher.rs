// ============================================================
// Layer 4 — Recommendation Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<EncodedSequence>
// of variable-length sequences into device-resident tensors.
//
// How batching works here:
//   Input:  N sequences of different lengths L1..LN
//   Output: [N, max(L)] tensors, right-padded with the pad id
//
//   input_ids / whole_word_ids → padded with pad id
//   attention_mask             → padded with 0
//   labels                     → padded, then every pad position
//                                becomes IGNORE_INDEX (-100)
//   user_idx                   → [N], 1-based, unchanged
//   target_item                → plain strings, evaluation only
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::EncodedSequence;
use crate::domain::phase::Phase;

/// Label value excluded from the loss.
pub const IGNORE_INDEX: i64 = -100;

// ─── RecBatch ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct RecBatch<B: Backend> {
    /// 1-based user indices — shape: [batch_size]
    pub user_idx: Tensor<B, 1, Int>,

    /// Token ids — shape: [batch_size, max_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, max_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Word alignment per token — shape: [batch_size, max_len]
    pub whole_word_ids: Tensor<B, 2, Int>,

    /// Target ids with IGNORE_INDEX at padding — shape: [batch_size, max_target_len]
    pub labels: Option<Tensor<B, 2, Int>>,

    /// Ground-truth items, present only outside training
    pub target_item: Option<Vec<String>>,
}

// ─── RecBatcher ───────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct RecBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: u32,
    pub phase:  Phase,
}

impl<B: Backend> RecBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32, phase: Phase) -> Self {
        Self { device, pad_id, phase }
    }
}

/// Right-pad every row to the longest one. Returns the flat
/// batch-major buffer and its [rows, max_len] shape.
pub fn pad_rows<'a, I>(rows: I, pad: i64) -> (Vec<i64>, [usize; 2])
where
    I: IntoIterator<Item = &'a [u32]>,
{
    let rows: Vec<&[u32]> = rows.into_iter().collect();
    let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);

    let mut flat = Vec::with_capacity(rows.len() * max_len);
    for row in &rows {
        flat.extend(row.iter().map(|&x| x as i64));
        flat.extend(std::iter::repeat(pad).take(max_len - row.len()));
    }
    (flat, [rows.len(), max_len])
}

fn int_tensor<B: Backend>(flat: Vec<i64>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::from_data(TensorData::new(flat, shape), device)
}

impl<B: Backend> Batcher<EncodedSequence, RecBatch<B>> for RecBatcher<B> {
    fn batch(&self, items: Vec<EncodedSequence>) -> RecBatch<B> {
        let pad = self.pad_id as i64;

        let (ids, shape)  = pad_rows(items.iter().map(|s| s.input_ids.as_slice()), pad);
        let input_ids     = int_tensor::<B>(ids, shape, &self.device);

        let (mask, shape) = pad_rows(items.iter().map(|s| s.attention_mask.as_slice()), 0);
        let attention_mask = int_tensor::<B>(mask, shape, &self.device);

        let (wwi, shape)  = pad_rows(items.iter().map(|s| s.whole_word_ids.as_slice()), pad);
        let whole_word_ids = int_tensor::<B>(wwi, shape, &self.device);

        let users: Vec<i64> = items.iter().map(|s| s.user_idx).collect();
        let user_idx = Tensor::<B, 1, Int>::from_data(
            TensorData::new(users, [items.len()]),
            &self.device,
        );

        // Labels only when every item carries them
        let labels = if !items.is_empty() && items.iter().all(|s| s.labels.is_some()) {
            let (flat, shape) = pad_rows(
                items.iter().filter_map(|s| s.labels.as_deref()),
                pad,
            );
            let flat = flat
                .into_iter()
                .map(|x| if x == pad { IGNORE_INDEX } else { x })
                .collect();
            Some(int_tensor::<B>(flat, shape, &self.device))
        } else {
            None
        };

        let target_item = match self.phase {
            Phase::Train => None,
            Phase::Eval  => Some(items.iter().map(|s| s.target_item.clone()).collect()),
        };

        RecBatch {
            user_idx,
            input_ids,
            attention_mask,
            whole_word_ids,
            labels,
            target_item,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn seq(ids: &[u32], labels: &[u32], user: i64, item: &str) -> EncodedSequence {
        EncodedSequence {
            input_ids:      ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            labels:         Some(labels.to_vec()),
            whole_word_ids: (1..=ids.len() as u32).collect(),
            user_idx:       user,
            target_item:    item.to_string(),
        }
    }

    fn rows(t: Tensor<TestBackend, 2, Int>) -> Vec<Vec<i64>> {
        let [_, cols] = t.dims();
        let flat: Vec<i64> = t.into_data().iter::<i64>().collect();
        flat.chunks(cols.max(1)).map(|c| c.to_vec()).collect()
    }

    fn items() -> Vec<EncodedSequence> {
        vec![
            seq(&[5, 6, 7, 1], &[9, 1], 3, "item_a"),
            seq(&[8, 1], &[4, 10, 11, 1], 1, "item_b"),
        ]
    }

    #[test]
    fn test_pads_to_longest_and_strips_back() {
        let batcher = RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Train);
        let batch   = batcher.batch(items());

        assert_eq!(batch.input_ids.dims(), [2, 4]);
        let ids = rows(batch.input_ids);
        assert_eq!(ids[1], vec![8, 1, 0, 0]);

        // stripping pad positions recovers the originals
        let stripped: Vec<Vec<i64>> = ids
            .iter()
            .map(|r| r.iter().copied().filter(|&x| x != 0).collect())
            .collect();
        assert_eq!(stripped, vec![vec![5, 6, 7, 1], vec![8, 1]]);

        assert_eq!(rows(batch.attention_mask)[1], vec![1, 1, 0, 0]);
        assert_eq!(rows(batch.whole_word_ids)[1], vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_labels_replace_pad_with_ignore_index() {
        let batcher = RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Train);
        let batch   = batcher.batch(items());

        let labels = rows(batch.labels.expect("labels"));
        assert_eq!(labels[0], vec![9, 1, IGNORE_INDEX, IGNORE_INDEX]);
        assert_eq!(labels[1], vec![4, 10, 11, 1]);
        assert!(labels.iter().flatten().all(|&x| x != 0));
    }

    #[test]
    fn test_target_items_only_outside_training() {
        let train = RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Train).batch(items());
        assert!(train.target_item.is_none());

        let eval = RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Eval).batch(items());
        assert_eq!(eval.target_item, Some(vec!["item_a".to_string(), "item_b".to_string()]));

        let users: Vec<i64> = eval.user_idx.into_data().iter::<i64>().collect();
        assert_eq!(users, vec![3, 1]);
    }

    #[test]
    fn test_no_labels_for_inference_items() {
        let items: Vec<EncodedSequence> = items().into_iter().map(|s| s.without_labels()).collect();
        let batch = RecBatcher::<TestBackend>::new(Default::default(), 0, Phase::Eval).batch(items);
        assert!(batch.labels.is_none());
    }
}
