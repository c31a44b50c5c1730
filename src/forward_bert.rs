//! BERT / RoBERTa encoder with a masked-language-model head
//!
//! Layer-by-layer implementation of the post-norm transformer encoder
//! used by `bert-base-uncased` and `roberta-base`, followed by the
//! prediction head whose decoder is tied to the word embeddings.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{embedding, linear, Embedding, LayerNorm, Linear, VarBuilder};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tracing::{info, warn};

/// Model configuration (matches HuggingFace config.json for BERT/RoBERTa)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub pad_token_id: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

fn default_hidden_act() -> String {
    "gelu".to_string()
}

/// Checkpoint layout: weight prefixes and position numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFlavor {
    /// `bert.*` encoder, `cls.predictions.*` head, positions from 0
    Bert,
    /// `roberta.*` encoder, `lm_head.*` head, positions after the pad id
    Roberta,
}

impl EncoderFlavor {
    fn encoder_prefix(self) -> &'static str {
        match self {
            EncoderFlavor::Bert => "bert",
            EncoderFlavor::Roberta => "roberta",
        }
    }

    fn head_prefix(self) -> &'static str {
        match self {
            EncoderFlavor::Bert => "cls.predictions",
            EncoderFlavor::Roberta => "lm_head",
        }
    }

    fn transform_prefix(self) -> &'static str {
        match self {
            EncoderFlavor::Bert => "cls.predictions.transform",
            EncoderFlavor::Roberta => "lm_head",
        }
    }

    fn head_norm_name(self) -> &'static str {
        match self {
            EncoderFlavor::Bert => "LayerNorm",
            EncoderFlavor::Roberta => "layer_norm",
        }
    }

    fn position_offset(self, config: &BertConfig) -> usize {
        match self {
            EncoderFlavor::Bert => 0,
            EncoderFlavor::Roberta => config.pad_token_id + 1,
        }
    }
}

/// LayerNorm that also accepts the older `gamma`/`beta` weight names
fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> Result<LayerNorm> {
    let (weight, bias) = match (vb.get(size, "weight"), vb.get(size, "bias")) {
        (Ok(weight), Ok(bias)) => (weight, bias),
        _ => {
            let weight = vb
                .get(size, "gamma")
                .with_context(|| format!("LayerNorm weight missing under {}", vb.prefix()))?;
            let bias = vb
                .get(size, "beta")
                .with_context(|| format!("LayerNorm bias missing under {}", vb.prefix()))?;
            (weight, bias)
        }
    };
    Ok(LayerNorm::new(weight, bias, eps))
}

/// Word + position + token-type embeddings, then LayerNorm
struct Embeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    norm: LayerNorm,
    position_offset: usize,
    max_positions: usize,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &BertConfig, position_offset: usize) -> Result<Self> {
        Ok(Self {
            word: embedding(config.vocab_size, config.hidden_size, vb.pp("word_embeddings"))?,
            position: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
            position_offset,
            max_positions: config.max_position_embeddings,
        })
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_b, seq_len) = input_ids.dims2()?;
        if seq_len + self.position_offset > self.max_positions {
            anyhow::bail!(
                "Input of {} tokens exceeds {} positions",
                seq_len,
                self.max_positions - self.position_offset
            );
        }

        let positions: Vec<u32> = (0..seq_len)
            .map(|i| (i + self.position_offset) as u32)
            .collect();
        let positions = Tensor::new(positions.as_slice(), input_ids.device())?.unsqueeze(0)?;
        let token_types = input_ids.zeros_like()?;

        let x = self.word.forward(input_ids)?;
        let x = x.broadcast_add(&self.position.forward(&positions)?)?;
        let x = (x + self.token_type.forward(&token_types)?)?;
        Ok(self.norm.forward(&x)?)
    }
}

/// Bidirectional multi-head self-attention with residual + LayerNorm
struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let hidden = config.hidden_size;
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("self").pp("query"))?,
            key: linear(hidden, hidden, vb.pp("self").pp("key"))?,
            value: linear(hidden, hidden, vb.pp("self").pp("value"))?,
            output: linear(hidden, hidden, vb.pp("output").pp("dense"))?,
            norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("output").pp("LayerNorm"))?,
            num_heads: config.num_attention_heads,
            head_dim: hidden / config.num_attention_heads,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, seq_len, _) = x.dims3()?;

        let split_heads = |t: Tensor| -> Result<Tensor> {
            Ok(t.reshape((b, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };
        let q = split_heads(self.query.forward(x)?)?;
        let k = split_heads(self.key.forward(x)?)?;
        let v = split_heads(self.value.forward(x)?)?;

        // No mask: a single unpadded sentence attends everywhere
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let attn_weights = (q.matmul(&k.t()?)? * scale)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
        let attn_output = attn_weights.matmul(&v)?;

        let attn_output = attn_output.transpose(1, 2)?.reshape((b, seq_len, ()))?;
        let out = self.output.forward(&attn_output)?;
        Ok(self.norm.forward(&(out + x)?)?)
    }
}

/// Feed-forward block with residual + LayerNorm
struct FeedForward {
    intermediate: Linear,
    output: Linear,
    norm: LayerNorm,
}

impl FeedForward {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            intermediate: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            output: linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("output").pp("dense"),
            )?,
            norm: layer_norm(
                config.hidden_size,
                config.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = self.intermediate.forward(x)?.gelu_erf()?;
        let y = self.output.forward(&y)?;
        Ok(self.norm.forward(&(y + x)?)?)
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    feed_forward: FeedForward,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            attention: SelfAttention::load(vb.pp("attention"), config)?,
            feed_forward: FeedForward::load(vb, config)?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.attention.forward(x)?;
        self.feed_forward.forward(&x)
    }
}

/// Dense + GELU + LayerNorm transform, then the tied vocabulary decoder
struct MlmHead {
    dense: Linear,
    norm: LayerNorm,
    decoder_weight: Tensor,
    bias: Tensor,
}

impl MlmHead {
    fn load(
        vb: &VarBuilder,
        config: &BertConfig,
        flavor: EncoderFlavor,
        word_embeddings: &Embedding,
    ) -> Result<Self> {
        let transform = vb.pp(flavor.transform_prefix());
        Ok(Self {
            dense: linear(config.hidden_size, config.hidden_size, transform.pp("dense"))?,
            norm: layer_norm(
                config.hidden_size,
                config.layer_norm_eps,
                transform.pp(flavor.head_norm_name()),
            )?,
            decoder_weight: word_embeddings.embeddings().clone(),
            bias: vb
                .pp(flavor.head_prefix())
                .get(config.vocab_size, "bias")
                .context("MLM head bias not found")?,
        })
    }

    /// hidden: (n, d_model) → logits: (n, vocab)
    fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let x = self.dense.forward(hidden)?.gelu_erf()?;
        let x = self.norm.forward(&x)?;
        Ok(x.matmul(&self.decoder_weight.t()?)?.broadcast_add(&self.bias)?)
    }
}

/// Encoder plus masked-language-model head
pub struct BertForMaskedLm {
    embeddings: Embeddings,
    layers: Vec<EncoderLayer>,
    head: MlmHead,
    hidden_size: usize,
    vocab_size: usize,
}

impl BertForMaskedLm {
    /// Download config and weights from HuggingFace and build the model
    pub fn load(
        model_id: &str,
        flavor: EncoderFlavor,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        info!("Loading {:?} masked LM from: {}", flavor, model_id);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download config.json")?;
        let config_str = std::fs::read_to_string(&config_path).context("Failed to read config")?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors")?;

        Self::from_files(&config, &[weights_path], flavor, device, dtype)
    }

    /// Build from a parsed config and local safetensors files
    pub fn from_files(
        config: &BertConfig,
        weights_paths: &[PathBuf],
        flavor: EncoderFlavor,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        info!(
            "Model config: {} layers, {} hidden, {} vocab",
            config.num_hidden_layers, config.hidden_size, config.vocab_size
        );
        if config.hidden_act != "gelu" {
            warn!(
                "hidden_act {:?} not supported, using exact GELU",
                config.hidden_act
            );
        }

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights_paths, dtype, device)? };
        let vb_encoder = vb.pp(flavor.encoder_prefix());

        let embeddings = Embeddings::load(
            vb_encoder.pp("embeddings"),
            config,
            flavor.position_offset(config),
        )?;

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            let layer = EncoderLayer::load(vb_encoder.pp(format!("encoder.layer.{i}")), config)?;
            layers.push(layer);
        }

        let head = MlmHead::load(&vb, config, flavor, &embeddings.word)?;

        info!(
            "Model loaded successfully with {} layers",
            config.num_hidden_layers
        );

        Ok(Self {
            embeddings,
            layers,
            head,
            hidden_size: config.hidden_size,
            vocab_size: config.vocab_size,
        })
    }

    /// Final hidden states: (batch, seq_len, d_model)
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let mut hidden = self.embeddings.forward(input_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden)?;
        }
        Ok(hidden)
    }

    /// Vocabulary logits at one position of the first sequence: (vocab,)
    pub fn logits_at(&self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let hidden = self.forward(input_ids)?;
        let at_mask = hidden.i((0, position))?.unsqueeze(0)?;
        Ok(self.head.forward(&at_mask)?.squeeze(0)?)
    }

    /// Softmax over the logits and return the `k` most probable ids
    pub fn top_k_from_logits(&self, logits: &Tensor, k: usize) -> Result<Vec<(u32, f32)>> {
        let logits_f32 = logits.to_dtype(DType::F32)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits_f32)?;
        let probs_vec: Vec<f32> = probs.flatten_all()?.to_vec1()?;

        let mut indexed: Vec<(usize, f32)> = probs_vec.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(indexed
            .into_iter()
            .take(k)
            .map(|(idx, prob)| (idx as u32, prob))
            .collect())
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn d_model(&self) -> usize {
        self.hidden_size
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
