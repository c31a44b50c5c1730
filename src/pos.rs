//! Part-of-speech tagging for prediction filtering
//!
//! Tags follow the Universal POS tag set. The tagger is a seam: any
//! implementation that maps a single token to its most likely tag can be
//! plugged in. [`LexiconTagger`] reads a word → {tag → weight} lexicon.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::prediction::PredictionSet;

/// Universal POS tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PosTag {
    Adj,
    Adp,
    Adv,
    Aux,
    Cconj,
    Det,
    Intj,
    Noun,
    Num,
    Part,
    Pron,
    Propn,
    Punct,
    Sconj,
    Sym,
    Verb,
    X,
}

/// Tags kept when filtering model predictions
pub const NOUNS_AND_VERBS: [PosTag; 2] = [PosTag::Noun, PosTag::Verb];

/// Tags kept when extracting content words from a prompt
pub const CONTENT_WORDS: [PosTag; 3] = [PosTag::Noun, PosTag::Verb, PosTag::Adj];

impl PosTag {
    pub const ALL: [PosTag; 17] = [
        PosTag::Adj,
        PosTag::Adp,
        PosTag::Adv,
        PosTag::Aux,
        PosTag::Cconj,
        PosTag::Det,
        PosTag::Intj,
        PosTag::Noun,
        PosTag::Num,
        PosTag::Part,
        PosTag::Pron,
        PosTag::Propn,
        PosTag::Punct,
        PosTag::Sconj,
        PosTag::Sym,
        PosTag::Verb,
        PosTag::X,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PosTag::Adj => "ADJ",
            PosTag::Adp => "ADP",
            PosTag::Adv => "ADV",
            PosTag::Aux => "AUX",
            PosTag::Cconj => "CCONJ",
            PosTag::Det => "DET",
            PosTag::Intj => "INTJ",
            PosTag::Noun => "NOUN",
            PosTag::Num => "NUM",
            PosTag::Part => "PART",
            PosTag::Pron => "PRON",
            PosTag::Propn => "PROPN",
            PosTag::Punct => "PUNCT",
            PosTag::Sconj => "SCONJ",
            PosTag::Sym => "SYM",
            PosTag::Verb => "VERB",
            PosTag::X => "X",
        }
    }
}

impl fmt::Display for PosTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PosTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        PosTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == upper)
            .ok_or_else(|| anyhow::anyhow!("Unknown POS tag: {s}"))
    }
}

/// Assigns the most likely tag to a single token
pub trait PosTagger {
    fn tag(&self, token: &str) -> Result<PosTag>;
}

/// Lexicon-backed tagger
///
/// Each word carries weights per tag; the dominant tag is the one with
/// the highest weight. Words missing from the lexicon get the fallback.
pub struct LexiconTagger {
    lexicon: HashMap<String, PosTag>,
    fallback: PosTag,
}

impl LexiconTagger {
    /// Build from word → {tag → weight} entries
    pub fn from_weights(weights: HashMap<String, HashMap<PosTag, f64>>) -> Self {
        let lexicon = weights
            .into_iter()
            .filter_map(|(word, tags)| {
                tags.into_iter()
                    .max_by(|a, b| {
                        a.1.partial_cmp(&b.1)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| b.0.cmp(&a.0))
                    })
                    .map(|(tag, _)| (word.to_lowercase(), tag))
            })
            .collect();
        Self {
            lexicon,
            fallback: PosTag::X,
        }
    }

    /// Load a JSON lexicon: `{"stone": {"NOUN": 0.9, "VERB": 0.1}, ...}`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
        let weights: HashMap<String, HashMap<PosTag, f64>> =
            serde_json::from_str(&content).context("Failed to parse lexicon")?;
        let tagger = Self::from_weights(weights);
        info!("Loaded POS lexicon: {} words", tagger.len());
        Ok(tagger)
    }

    /// Tag given to words the lexicon does not know
    pub fn with_fallback(mut self, fallback: PosTag) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }
}

impl PosTagger for LexiconTagger {
    fn tag(&self, token: &str) -> Result<PosTag> {
        Ok(self
            .lexicon
            .get(&token.to_lowercase())
            .copied()
            .unwrap_or(self.fallback))
    }
}

/// Keep only predictions whose dominant tag is allowed
pub fn filter_by_pos(
    predictions: &PredictionSet,
    allowed_tags: &[PosTag],
    tagger: &dyn PosTagger,
) -> Result<PredictionSet> {
    let mut kept = PredictionSet::with_capacity(predictions.len());
    for (token, &score) in predictions {
        if allowed_tags.contains(&tagger.tag(token)?) {
            kept.insert(token.clone(), score);
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger() -> LexiconTagger {
        let mut weights = HashMap::new();
        weights.insert(
            "stone".to_string(),
            HashMap::from([(PosTag::Noun, 0.9), (PosTag::Verb, 0.1)]),
        );
        weights.insert("run".to_string(), HashMap::from([(PosTag::Verb, 1.0)]));
        weights.insert("red".to_string(), HashMap::from([(PosTag::Adj, 1.0)]));
        LexiconTagger::from_weights(weights)
    }

    #[test]
    fn test_dominant_tag() {
        let tagger = tagger();
        assert_eq!(tagger.tag("stone").unwrap(), PosTag::Noun);
        assert_eq!(tagger.tag("Stone").unwrap(), PosTag::Noun);
        assert_eq!(tagger.tag("unknown").unwrap(), PosTag::X);
        let tagger = tagger.with_fallback(PosTag::Noun);
        assert_eq!(tagger.tag("unknown").unwrap(), PosTag::Noun);
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!("noun".parse::<PosTag>().unwrap(), PosTag::Noun);
        assert_eq!("PROPN".parse::<PosTag>().unwrap(), PosTag::Propn);
        assert!("nounish".parse::<PosTag>().is_err());
        assert_eq!(PosTag::Cconj.to_string(), "CCONJ");
    }

    #[test]
    fn test_filter_keeps_order() {
        let predictions: PredictionSet = [("red", 0.4), ("stone", 0.3), ("the", 0.2), ("run", 0.1)]
            .into_iter()
            .map(|(t, s)| (t.to_string(), s))
            .collect();

        let filtered = filter_by_pos(&predictions, &NOUNS_AND_VERBS, &tagger()).unwrap();
        let tokens: Vec<&str> = filtered.keys().map(String::as_str).collect();
        assert_eq!(tokens, vec!["stone", "run"]);
        assert_eq!(predictions.len(), 4);
    }
}
