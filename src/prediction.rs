//! Ranked token predictions and the prediction-source seam
//!
//! A prediction source turns a masked sentence into a ranked list of
//! candidate fillers. Masked language models and embedding
//! nearest-neighbour lookups both implement [`PredictionSource`].

use indexmap::IndexMap;
use tokenizers::Tokenizer;

/// Token → score mapping, in rank order
pub type PredictionSet = IndexMap<String, f32>;

/// A single ranked candidate
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrediction {
    /// Vocabulary id, when the source has one
    pub token_id: Option<u32>,
    /// Decoded token string
    pub token: String,
    /// Probability or similarity score
    pub score: f32,
}

impl TokenPrediction {
    pub fn new(token: impl Into<String>, score: f32) -> Self {
        Self {
            token_id: None,
            token: token.into(),
            score,
        }
    }
}

/// How a source produces its candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fills the mask with a masked language model
    MaskedLanguageModel,
    /// Ranks vocabulary by similarity to the sentence's content words
    NearestNeighbors,
}

/// Anything that can rank fillers for a masked sentence
pub trait PredictionSource {
    /// Label used in logs and score tables
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Up to `k` candidates for the sentence's `<MASK>`, best first
    fn predict(&self, sentence: &str, k: usize) -> anyhow::Result<Vec<TokenPrediction>>;
}

/// Collect ranked predictions into a [`PredictionSet`]
///
/// When a token occurs twice the first (higher ranked) score is kept.
pub fn to_prediction_set(predictions: &[TokenPrediction]) -> PredictionSet {
    let mut set = PredictionSet::with_capacity(predictions.len());
    for p in predictions {
        set.entry(p.token.clone()).or_insert(p.score);
    }
    set
}

/// Decode token ids to trimmed strings using the tokenizer
pub fn decode_predictions(predictions: &[(u32, f32)], tokenizer: &Tokenizer) -> Vec<TokenPrediction> {
    predictions
        .iter()
        .map(|(token_id, prob)| {
            let token = tokenizer
                .decode(&[*token_id], false)
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|_| format!("<{token_id}>"));
            TokenPrediction {
                token_id: Some(*token_id),
                token,
                score: *prob,
            }
        })
        .collect()
}

/// Keep the `k` highest-scoring entries, best first
pub fn top_k(predictions: &PredictionSet, k: usize) -> PredictionSet {
    let mut ranked: Vec<(&String, &f32)> = predictions.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
        .into_iter()
        .take(k)
        .map(|(token, &score)| (token.clone(), score))
        .collect()
}

/// Helper to format a token for display
pub fn format_token(token: &str) -> String {
    token
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\r', "\\r")
}
