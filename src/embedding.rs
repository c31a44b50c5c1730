//! Static word-embedding nearest neighbours as a prediction source
//!
//! Instead of filling the mask, the prompt's content words are averaged
//! in GloVe space and the closest vocabulary words are returned.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::pos::{PosTag, PosTagger, CONTENT_WORDS};
use crate::prediction::{PredictionSource, SourceKind, TokenPrediction};

/// Characters trimmed from both ends of each prompt word
const STRIP_CHARS: &[char] = &['(', ')', ':', ',', '.', '?'];

/// Prompt words never used as neighbour queries
const DROPPED_WORDS: [&str; 3] = ["<mask>", "youve", "theyll"];

/// Unit-normalized word vectors
pub struct GloveIndex {
    words: Vec<String>,
    lookup: HashMap<String, usize>,
    /// Row-major (n_words, dimension)
    vectors: Vec<f32>,
    dimension: usize,
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

impl GloveIndex {
    /// Load GloVe text vectors (`word v1 v2 ...` per line)
    ///
    /// Lines without a parseable vector are skipped; a vector whose length
    /// differs from the first one is an error.
    pub fn load(path: impl AsRef<Path>, max_words: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open vectors {}", path.display()))?;

        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            if max_words.is_some_and(|max| entries.len() >= max) {
                break;
            }
            let line = line.with_context(|| format!("Failed to read line {}", i + 1))?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values: Result<Vec<f32>, _> = parts.map(str::parse::<f32>).collect();
            match values {
                Ok(values) if !values.is_empty() => entries.push((word.to_string(), values)),
                _ => debug!("Skipping malformed vector line {}", i + 1),
            }
        }

        let index = Self::from_entries(entries)?;
        info!(
            "Loaded {} vectors ({} dims) from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }

    /// Build from (word, vector) pairs; first occurrence of a word wins
    pub fn from_entries(entries: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dimension = entries.first().map_or(0, |(_, v)| v.len());
        let mut index = Self {
            words: Vec::with_capacity(entries.len()),
            lookup: HashMap::with_capacity(entries.len()),
            vectors: Vec::with_capacity(entries.len() * dimension),
            dimension,
        };

        for (word, mut vector) in entries {
            if vector.len() != dimension {
                anyhow::bail!(
                    "Vector for {:?} has {} dims, expected {}",
                    word,
                    vector.len(),
                    dimension
                );
            }
            if index.lookup.contains_key(&word) {
                continue;
            }
            normalize(&mut vector);
            index.lookup.insert(word.clone(), index.words.len());
            index.words.push(word);
            index.vectors.extend(vector);
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Unit vector for a word
    pub fn vector(&self, word: &str) -> Option<&[f32]> {
        let row = *self.lookup.get(word)?;
        Some(&self.vectors[row * self.dimension..(row + 1) * self.dimension])
    }

    /// The `topn` words closest to the mean of `positive`, by cosine
    ///
    /// The query words themselves are excluded.
    pub fn most_similar<S: AsRef<str>>(&self, positive: &[S], topn: usize) -> Result<Vec<(String, f32)>> {
        if positive.is_empty() {
            anyhow::bail!("Cannot compute similarity with no query words");
        }

        let mut query = vec![0.0f32; self.dimension];
        for word in positive {
            let word = word.as_ref();
            let vector = self
                .vector(word)
                .with_context(|| format!("Word {word:?} not present in vocabulary"))?;
            for (q, v) in query.iter_mut().zip(vector) {
                *q += v;
            }
        }
        normalize(&mut query);

        let excluded: Vec<usize> = positive
            .iter()
            .filter_map(|w| self.lookup.get(w.as_ref()).copied())
            .collect();

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension.max(1))
            .enumerate()
            .filter(|(row, _)| !excluded.contains(row))
            .map(|(row, vector)| {
                let sim = vector.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>();
                (row, sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(topn)
            .map(|(row, sim)| (self.words[row].clone(), sim))
            .collect())
    }
}

/// Content words of a prompt, used as the neighbour query
///
/// Lower-cases, splits on spaces and hyphens, trims punctuation, drops
/// apostrophes and the mask, and keeps words with an allowed tag.
pub fn content_words(
    sentence: &str,
    tagger: &dyn PosTagger,
    allowed_tags: &[PosTag],
) -> Result<Vec<String>> {
    let mut words = Vec::new();
    for raw in sentence.to_lowercase().split(['-', ' ']) {
        let word = raw.trim_matches(STRIP_CHARS).replace('\'', "");
        if word.is_empty() || DROPPED_WORDS.contains(&word.as_str()) {
            continue;
        }
        if allowed_tags.contains(&tagger.tag(&word)?) {
            words.push(word);
        }
    }
    Ok(words)
}

/// Nearest-neighbour prediction source over a [`GloveIndex`]
pub struct EmbeddingSource {
    index: GloveIndex,
    tagger: Arc<dyn PosTagger>,
    name: String,
}

impl EmbeddingSource {
    pub fn new(index: GloveIndex, tagger: Arc<dyn PosTagger>) -> Self {
        Self {
            index,
            tagger,
            name: "glove".to_string(),
        }
    }

    /// Label shown in logs and score tables
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn index(&self) -> &GloveIndex {
        &self.index
    }
}

impl PredictionSource for EmbeddingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::NearestNeighbors
    }

    fn predict(&self, sentence: &str, k: usize) -> Result<Vec<TokenPrediction>> {
        let words = content_words(sentence, self.tagger.as_ref(), &CONTENT_WORDS)?;
        debug!("{} query words: {:?}", self.name, words);
        Ok(self
            .index
            .most_similar(&words, k)?
            .into_iter()
            .map(|(word, score)| TokenPrediction::new(word, score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::LexiconTagger;

    fn index() -> GloveIndex {
        GloveIndex::from_entries(vec![
            ("ruby".to_string(), vec![1.0, 0.0, 0.0]),
            ("gem".to_string(), vec![0.9, 0.1, 0.0]),
            ("stone".to_string(), vec![0.7, 0.7, 0.0]),
            ("car".to_string(), vec![0.0, 0.0, 1.0]),
        ])
        .unwrap()
    }

    fn tagger() -> LexiconTagger {
        LexiconTagger::from_weights(HashMap::from([
            ("precious".to_string(), HashMap::from([(PosTag::Adj, 1.0)])),
            ("stone".to_string(), HashMap::from([(PosTag::Noun, 1.0)])),
            ("is".to_string(), HashMap::from([(PosTag::Aux, 1.0)])),
            ("a".to_string(), HashMap::from([(PosTag::Det, 1.0)])),
        ]))
    }

    #[test]
    fn test_vectors_normalized() {
        let index = index();
        let v = index.vector("stone").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_most_similar_excludes_query() {
        let index = index();
        let result = index.most_similar(&["ruby"], 2).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, "gem");
        assert_eq!(result[1].0, "stone");
        assert!(index.most_similar(&["unicorn"], 2).is_err());
        assert!(index.most_similar::<&str>(&[], 2).is_err());
    }

    #[test]
    fn test_load_skips_malformed_and_caps_words() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "ruby 1.0 0.0\n\nword abc\nlonely\ngem 0.9 0.1\ncar 0.0 1.0\n"
        )
        .unwrap();

        let index = GloveIndex::load(file.path(), Some(2)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
        assert!(index.vector("ruby").is_some());
        assert!(index.vector("gem").is_some());
        assert!(index.vector("word").is_none());
        assert!(index.vector("car").is_none());

        let all = GloveIndex::load(file.path(), None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = GloveIndex::from_entries(vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![1.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_content_words() {
        let words = content_words("A <MASK> is a precious-stone.", &tagger(), &CONTENT_WORDS).unwrap();
        assert_eq!(words, vec!["precious", "stone"]);
    }

    #[test]
    fn test_embedding_source() {
        let tagger: Arc<dyn PosTagger> = Arc::new(tagger());
        let source = EmbeddingSource::new(index(), tagger);
        let predictions = source.predict("a <MASK> is a stone", 2).unwrap();
        // gem leans further toward stone's direction than ruby does
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].token, "gem");
        assert_eq!(predictions[1].token, "ruby");
        assert_eq!(source.kind(), SourceKind::NearestNeighbors);
    }
}
