use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation::log_softmax, TensorData},
};

use crate::data::batcher::IGNORE_INDEX;
use crate::ml::backbone::{GenerationConfig, Seq2SeqBackbone};
use crate::ml::beam::beam_search;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    #[config(default = 0)]
    pub pad_token_id: usize,
    #[config(default = 1)]
    pub eos_token_id: usize,
}

impl Seq2SeqConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        let shared             = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let encoder_layers = (0..self.num_layers).map(|_| self.build_encoder_block(device)).collect();
        let decoder_layers = (0..self.num_layers).map(|_| self.build_decoder_block(device)).collect();
        Seq2SeqModel {
            shared,
            position_embedding,
            encoder_layers,
            encoder_norm: LayerNormConfig::new(self.d_model).init(device),
            decoder_layers,
            decoder_norm: LayerNormConfig::new(self.d_model).init(device),
            lm_head:      LinearConfig::new(self.d_model, self.vocab_size).with_bias(false).init(device),
            dropout:      DropoutConfig::new(self.dropout).init(),
            max_seq_len:  self.max_seq_len,
            pad_token_id: self.pad_token_id,
            eos_token_id: self.eos_token_id,
        }
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn:   self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            self_attn:   self.attention(device),
            cross_attn:  self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            norm3:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// mask_pad: [batch, seq], true at padding
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self.self_attn.forward(MhaInput::self_attn(x.clone()).mask_pad(mask_pad)).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub cross_attn:  MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub norm3:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(
        &self,
        x:           Tensor<B, 3>,
        memory:      Tensor<B, 3>,
        causal_mask: Tensor<B, 3, Bool>,
        memory_pad:  Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let self_out = self.self_attn.forward(MhaInput::self_attn(x.clone()).mask_attn(causal_mask)).context;
        let x = self.norm1.forward(x + self.dropout.forward(self_out));

        let cross_out = self
            .cross_attn
            .forward(MhaInput::new(x.clone(), memory.clone(), memory).mask_pad(memory_pad))
            .context;
        let x = self.norm2.forward(x + self.dropout.forward(cross_out));

        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm3.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Compact encoder-decoder with a shared input embedding table,
/// learned positions and an untied LM head.
#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub shared:             Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder_layers:     Vec<EncoderBlock<B>>,
    pub encoder_norm:       LayerNorm<B>,
    pub decoder_layers:     Vec<DecoderBlock<B>>,
    pub decoder_norm:       LayerNorm<B>,
    pub lm_head:            Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
    pub pad_token_id:       usize,
    pub eos_token_id:       usize,
}

impl<B: Backend> Seq2SeqModel<B> {
    fn add_positions(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = x.dims();
        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &x.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        self.dropout.forward(x + self.position_embedding.forward(positions))
    }

    /// inputs_embeds [batch, seq, d_model] → memory [batch, seq, d_model]
    pub fn encode(&self, inputs_embeds: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let mut x = self.add_positions(inputs_embeds);
        for layer in &self.encoder_layers {
            x = layer.forward(x, mask_pad.clone());
        }
        self.encoder_norm.forward(x)
    }

    /// decoder_ids [batch, tgt] → logits [batch, tgt, vocab]
    pub fn decode(
        &self,
        decoder_ids: Tensor<B, 2, Int>,
        memory:      Tensor<B, 3>,
        memory_pad:  Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = decoder_ids.dims();
        let device      = decoder_ids.device();
        let causal_mask = generate_autoregressive_mask::<B>(batch_size, tgt_len, &device);

        let mut x = self.add_positions(self.shared.forward(decoder_ids));
        for layer in &self.decoder_layers {
            x = layer.forward(x, memory.clone(), causal_mask.clone(), memory_pad.clone());
        }
        self.lm_head.forward(self.decoder_norm.forward(x))
    }

    /// Decoder inputs for teacher forcing: labels shifted one step right,
    /// pad id as the start token, ignored positions replaced by pad.
    pub fn shift_right(&self, labels: Tensor<B, 2, Int>) -> Tensor<B, 2, Int> {
        let [batch_size, tgt_len] = labels.dims();
        let pad   = self.pad_token_id as i64;
        let start = Tensor::<B, 2, Int>::full([batch_size, 1], pad, &labels.device());
        let body  = labels.slice([0..batch_size, 0..tgt_len.saturating_sub(1)]);
        let body  = body.clone().mask_fill(body.equal_elem(IGNORE_INDEX), pad);
        Tensor::cat(vec![start, body], 1)
    }
}

/// Cross entropy averaged over positions whose label is not IGNORE_INDEX.
pub fn masked_cross_entropy<B: Backend>(logits: Tensor<B, 3>, labels: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    let [batch_size, tgt_len, vocab] = logits.dims();
    let n = batch_size * tgt_len;

    let logits  = logits.reshape([n, vocab]);
    let labels  = labels.reshape([n]);
    let ignored = labels.clone().equal_elem(IGNORE_INDEX);
    let targets = labels.mask_fill(ignored.clone(), 0);

    let picked = log_softmax(logits, 1)
        .gather(1, targets.unsqueeze_dim::<2>(1))
        .reshape([n]);
    let weight = ignored.bool_not().float();
    let count  = weight.clone().sum().clamp_min(1.0);

    (picked * weight).sum().neg() / count
}

impl<B: Backend> Seq2SeqBackbone<B> for Seq2SeqModel<B> {
    fn embed_tokens(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.shared.forward(input_ids)
    }

    fn forward_loss(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        let mask_pad = attention_mask.equal_elem(0);
        let memory   = self.encode(inputs_embeds, mask_pad.clone());
        let logits   = self.decode(self.shift_right(labels.clone()), memory, mask_pad);
        masked_cross_entropy(logits, labels)
    }

    fn generate(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        config:         &GenerationConfig,
    ) -> Vec<Vec<u32>> {
        let [batch_size, src_len, d_model] = inputs_embeds.dims();
        let device   = inputs_embeds.device();
        let mask_pad = attention_mask.equal_elem(0);
        let memory   = self.encode(inputs_embeds, mask_pad.clone());

        // decoder positions are bounded by the position table
        let mut config = config.clone();
        config.max_new_tokens = config.max_new_tokens.min(self.max_seq_len.saturating_sub(1));

        let mut sequences = Vec::with_capacity(batch_size * config.num_return_sequences);
        for row in 0..batch_size {
            let row_memory = memory.clone().slice([row..row + 1, 0..src_len, 0..d_model]);
            let row_mask   = mask_pad.clone().slice([row..row + 1, 0..src_len]);

            let step = |prefixes: &[Vec<u32>]| -> Vec<Vec<f32>> {
                let beams   = prefixes.len();
                let tgt_len = prefixes[0].len();
                let flat: Vec<i64> = prefixes.iter().flatten().map(|&t| t as i64).collect();
                let ids = Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [beams, tgt_len]), &device);

                let logits = self.decode(
                    ids,
                    row_memory.clone().expand([beams, src_len, d_model]),
                    row_mask.clone().expand([beams, src_len]),
                );
                let vocab = logits.dims()[2];
                let last  = logits
                    .slice([0..beams, tgt_len - 1..tgt_len, 0..vocab])
                    .reshape([beams, vocab]);
                let flat: Vec<f32> = log_softmax(last, 1).into_data().iter::<f32>().collect();
                flat.chunks(vocab).map(|c| c.to_vec()).collect()
            };

            sequences.extend(beam_search(
                &config,
                self.pad_token_id as u32,
                self.eos_token_id as u32,
                step,
            ));
        }
        sequences
    }
}
