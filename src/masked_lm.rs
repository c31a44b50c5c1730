//! Masked language model wrapper for mask-filling predictions
//!
//! Loads a pretrained BERT or RoBERTa checkpoint with its tokenizer and
//! exposes top-k mask filling as a [`PredictionSource`].

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::forward_bert::{BertForMaskedLm, EncoderFlavor};
use crate::prediction::{decode_predictions, PredictionSource, SourceKind, TokenPrediction};
use crate::prompts::MASK_PLACEHOLDER;

/// Supported pretrained masked language models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskedLmModel {
    /// `bert-base-uncased` (Google)
    BertBaseUncased,
    /// `roberta-base` (Facebook AI)
    RobertaBase,
}

impl MaskedLmModel {
    pub const ALL: [MaskedLmModel; 2] = [MaskedLmModel::BertBaseUncased, MaskedLmModel::RobertaBase];

    /// HuggingFace model ID
    pub fn model_id(&self) -> &'static str {
        match self {
            MaskedLmModel::BertBaseUncased => "bert-base-uncased",
            MaskedLmModel::RobertaBase => "roberta-base",
        }
    }

    /// Resolve a model ID; anything outside [`MaskedLmModel::ALL`] is rejected
    pub fn from_model_id(model_id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.model_id() == model_id)
            .ok_or_else(|| anyhow::anyhow!("Unrecognized model: {model_id}"))
    }

    fn flavor(&self) -> EncoderFlavor {
        match self {
            MaskedLmModel::BertBaseUncased => EncoderFlavor::Bert,
            MaskedLmModel::RobertaBase => EncoderFlavor::Roberta,
        }
    }

    /// The tokenizer's own mask token
    pub fn mask_token(&self) -> &'static str {
        match self {
            MaskedLmModel::BertBaseUncased => "[MASK]",
            MaskedLmModel::RobertaBase => "<mask>",
        }
    }
}

impl fmt::Display for MaskedLmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

impl FromStr for MaskedLmModel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_model_id(s)
    }
}

/// A loaded masked language model with its tokenizer
pub struct MaskedLm {
    model: BertForMaskedLm,
    tokenizer: Tokenizer,
    device: Device,
    kind: MaskedLmModel,
    mask_token_id: u32,
}

impl MaskedLm {
    /// Load a model from HuggingFace (tries CUDA, falls back to CPU)
    pub fn from_pretrained(kind: MaskedLmModel) -> Result<Self> {
        Self::from_pretrained_with_device(kind, None)
    }

    /// Load with explicit device choice (None = auto-detect)
    pub fn from_pretrained_with_device(kind: MaskedLmModel, force_cpu: Option<bool>) -> Result<Self> {
        let device = if force_cpu == Some(true) {
            info!("Forcing CPU mode");
            Device::Cpu
        } else {
            match Device::cuda_if_available(0) {
                Ok(dev) if dev.is_cuda() => {
                    info!("Using CUDA device");
                    dev
                }
                _ => {
                    info!("CUDA not available, using CPU");
                    Device::Cpu
                }
            }
        };

        info!("Loading model: {}", kind);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(kind.model_id().to_string(), RepoType::Model));
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Tokenizer error: {e}"))?;
        let mask_token_id = tokenizer
            .token_to_id(kind.mask_token())
            .with_context(|| format!("Tokenizer has no {} token", kind.mask_token()))?;

        let model = BertForMaskedLm::load(kind.model_id(), kind.flavor(), &device, DType::F32)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            kind,
            mask_token_id,
        })
    }

    pub fn model(&self) -> MaskedLmModel {
        self.kind
    }

    pub fn n_layers(&self) -> usize {
        self.model.n_layers()
    }

    pub fn d_model(&self) -> usize {
        self.model.d_model()
    }

    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    /// Top-k fillers for the `<MASK>` in `text`, best first
    ///
    /// Scores are softmax probabilities at the first mask position.
    pub fn get_mask(&self, text: &str, top_k: usize) -> Result<Vec<TokenPrediction>> {
        if !text.contains(MASK_PLACEHOLDER) {
            anyhow::bail!("Text should contain \"{MASK_PLACEHOLDER}\" token: {text}");
        }
        let text = text.replace(MASK_PLACEHOLDER, self.kind.mask_token());

        let encoding = self
            .tokenizer
            .encode(text.as_str(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization error: {e}"))?;
        let input_ids: Vec<u32> = encoding.get_ids().to_vec();
        let mask_position = input_ids
            .iter()
            .position(|&id| id == self.mask_token_id)
            .with_context(|| format!("Mask token lost during tokenization: {text}"))?;

        let input_tensor = Tensor::new(&input_ids[..], &self.device)?.unsqueeze(0)?;
        let logits = self.model.logits_at(&input_tensor, mask_position)?;
        let top = self.model.top_k_from_logits(&logits, top_k)?;

        debug!("{}: {} predictions for {:?}", self.kind, top.len(), text);
        Ok(decode_predictions(&top, &self.tokenizer))
    }

    /// The first `n` predictions substituted into the sentence
    pub fn filled_sentences(text: &str, predictions: &[TokenPrediction], n: usize) -> Vec<String> {
        predictions
            .iter()
            .take(n)
            .map(|pred| {
                format!(
                    "{:.5} {}",
                    pred.score,
                    text.replacen(MASK_PLACEHOLDER, &pred.token, 1)
                )
            })
            .collect()
    }

    pub fn print_filled(text: &str, predictions: &[TokenPrediction], n: usize) {
        for line in Self::filled_sentences(text, predictions, n) {
            println!("{line}");
        }
    }
}

impl PredictionSource for MaskedLm {
    fn name(&self) -> &str {
        self.kind.model_id()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MaskedLanguageModel
    }

    fn predict(&self, sentence: &str, k: usize) -> Result<Vec<TokenPrediction>> {
        self.get_mask(sentence, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert_eq!(
            MaskedLmModel::from_model_id("bert-base-uncased").unwrap(),
            MaskedLmModel::BertBaseUncased
        );
        assert_eq!(
            "roberta-base".parse::<MaskedLmModel>().unwrap(),
            MaskedLmModel::RobertaBase
        );
        assert!(MaskedLmModel::from_model_id("gpt2").is_err());
        assert_eq!(MaskedLmModel::RobertaBase.mask_token(), "<mask>");
        assert_eq!(MaskedLmModel::BertBaseUncased.to_string(), "bert-base-uncased");
    }

    #[test]
    fn test_filled_sentences() {
        let predictions = vec![
            TokenPrediction::new("ruby", 0.5),
            TokenPrediction::new("gem", 0.25),
            TokenPrediction::new("opal", 0.125),
        ];
        let lines = MaskedLm::filled_sentences("a <MASK> is a precious stone", &predictions, 2);
        assert_eq!(
            lines,
            vec![
                "0.50000 a ruby is a precious stone",
                "0.25000 a gem is a precious stone",
            ]
        );
    }
}
