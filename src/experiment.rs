//! Experiment runner for norms comparison
//!
//! Coordinates prompt queries, part-of-speech filtering, score merging,
//! and comparison against the norms table.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::comparison::{compare_category, ComparisonResult};
use crate::merge::{max_merge, mean_merge};
use crate::norms::NormsTable;
use crate::pos::{filter_by_pos, PosTag, PosTagger, NOUNS_AND_VERBS};
use crate::prediction::{to_prediction_set, top_k, PredictionSet, PredictionSource, SourceKind};
use crate::prompts::{article_variants, has_indefinite_article};

/// How the "a" and "an" forms of a prompt are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleMerge {
    /// Mean of the two score sets, missing tokens counted as 0
    #[default]
    Mean,
    /// Per-token maximum, renormalized
    Max,
}

/// Configuration for a comparison experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Number of candidates requested per prompt
    pub top_k: usize,
    /// Tags a candidate must carry to be kept
    pub allowed_tags: Vec<PosTag>,
    /// Merge policy for "a"/"an" re-queries
    pub article_merge: ArticleMerge,
    /// Re-query "a <MASK>" prompts with "an <MASK>"
    pub expand_articles: bool,
    /// How far to widen a neighbour query when filtering left too few
    pub neighbor_step: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            allowed_tags: NOUNS_AND_VERBS.to_vec(),
            article_merge: ArticleMerge::Mean,
            expand_articles: true,
            neighbor_step: 10,
        }
    }
}

impl ComparisonConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse config")
    }
}

/// Reference data and tagger shared by every query of a session
pub struct AnalysisContext {
    pub norms: NormsTable,
    pub tagger: Arc<dyn PosTagger>,
}

impl AnalysisContext {
    pub fn new(norms: NormsTable, tagger: Arc<dyn PosTagger>) -> Self {
        Self { norms, tagger }
    }
}

/// Comparison outcome for one prompt
#[derive(Debug, Clone, Serialize)]
pub struct CategoryResult {
    pub category: String,
    pub sentence: String,
    pub comparison: ComparisonResult,
}

/// Results from a full run over all prompts
#[derive(Debug, Serialize)]
pub struct ExperimentResults {
    /// Name of the prediction source
    pub source: String,
    /// Per-category results, in norms-table order
    pub category_results: Vec<CategoryResult>,
    /// Mean coverage across categories
    pub mean_coverage: f64,
    /// Sample standard deviation of coverage (0 for a single category)
    pub coverage_std: f64,
    /// Category with the highest coverage
    pub best_category: String,
}

impl ExperimentResults {
    /// Print a per-category coverage table
    pub fn print_summary(&self) {
        println!("=== Norms coverage: {} ===", self.source);
        for result in &self.category_results {
            println!(
                "  {:40} {:5.1}% ({}/{})",
                result.category,
                result.comparison.coverage * 100.0,
                result.comparison.found.len(),
                result.comparison.total()
            );
        }
        println!(
            "\nMean coverage: {:.1}% (sd {:.1}%), best: {}",
            self.mean_coverage * 100.0,
            self.coverage_std * 100.0,
            self.best_category
        );
    }
}

/// Main experiment runner
pub struct Experiment {
    context: AnalysisContext,
    source: Box<dyn PredictionSource>,
    config: ComparisonConfig,
}

impl Experiment {
    /// Create a new experiment
    pub fn new(
        context: AnalysisContext,
        source: Box<dyn PredictionSource>,
        config: ComparisonConfig,
    ) -> Self {
        Self {
            context,
            source,
            config,
        }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub fn source(&self) -> &dyn PredictionSource {
        self.source.as_ref()
    }

    /// Filtered candidate scores for a prompt
    pub fn token_scores(&self, sentence: &str) -> Result<PredictionSet> {
        match self.source.kind() {
            SourceKind::MaskedLanguageModel => self.masked_scores(sentence),
            SourceKind::NearestNeighbors => self.neighbor_scores(sentence),
        }
    }

    fn filtered(&self, sentence: &str, k: usize) -> Result<PredictionSet> {
        let predictions = self.source.predict(sentence, k)?;
        filter_by_pos(
            &to_prediction_set(&predictions),
            &self.config.allowed_tags,
            self.context.tagger.as_ref(),
        )
    }

    fn masked_scores(&self, sentence: &str) -> Result<PredictionSet> {
        if !(self.config.expand_articles && has_indefinite_article(sentence)) {
            return self.filtered(sentence, self.config.top_k);
        }

        let half = (self.config.top_k / 2).max(1);
        let [a_form, an_form] = article_variants(sentence);
        let a_scores = self.filtered(&a_form, half)?;
        let an_scores = self.filtered(&an_form, half)?;
        debug!(
            "{:?}: {} tokens with \"a\", {} with \"an\"",
            sentence,
            a_scores.len(),
            an_scores.len()
        );

        Ok(match self.config.article_merge {
            ArticleMerge::Mean => mean_merge(&[&a_scores, &an_scores]),
            ArticleMerge::Max => max_merge(&[&a_scores, &an_scores]),
        })
    }

    /// Widen the neighbour query until enough tokens survive filtering
    fn neighbor_scores(&self, sentence: &str) -> Result<PredictionSet> {
        let target = self.config.top_k;
        let mut topn = target;
        loop {
            let predictions = self.source.predict(sentence, topn)?;
            let exhausted = predictions.len() < topn;
            let kept = filter_by_pos(
                &to_prediction_set(&predictions),
                &self.config.allowed_tags,
                self.context.tagger.as_ref(),
            )?;
            if kept.len() >= target || exhausted {
                return Ok(top_k(&kept, target));
            }
            topn += self.config.neighbor_step.max(1);
        }
    }

    /// Compare scores against a category of the norms table
    pub fn correct_responses(
        &self,
        token_scores: &PredictionSet,
        category: &str,
    ) -> Result<ComparisonResult> {
        Ok(compare_category(token_scores, &self.context.norms, category)?)
    }

    /// Query one prompt and compare it against a category
    pub fn evaluate(&self, sentence: &str, category: &str) -> Result<ComparisonResult> {
        let scores = self.token_scores(sentence)?;
        self.correct_responses(&scores, category)
    }

    /// Run every prompt against the category at the same position
    pub fn run(&self, prompts: &[&str]) -> Result<ExperimentResults> {
        info!("Starting norms comparison with {}", self.source.name());
        info!("Config: {:?}", self.config);

        if prompts.is_empty() {
            anyhow::bail!("No prompts to run");
        }
        if prompts.len() != self.context.norms.len() {
            anyhow::bail!(
                "{} prompts for {} norms categories",
                prompts.len(),
                self.context.norms.len()
            );
        }

        let mut category_results = Vec::with_capacity(prompts.len());
        for (category, &sentence) in self.context.norms.categories().zip(prompts) {
            let comparison = self.evaluate(sentence, category)?;
            info!(
                "{}: {:.1}% ({} found, {} missing)",
                category,
                comparison.coverage * 100.0,
                comparison.found.len(),
                comparison.missing.len()
            );
            category_results.push(CategoryResult {
                category: category.to_string(),
                sentence: sentence.to_string(),
                comparison,
            });
        }

        let coverages: Vec<f64> = category_results
            .iter()
            .map(|r| r.comparison.coverage)
            .collect();
        let mean_coverage = coverages.iter().mean();
        let coverage_std = if coverages.len() > 1 {
            coverages.iter().std_dev()
        } else {
            0.0
        };
        // Earliest category wins a tie
        let best_category = category_results
            .iter()
            .rev()
            .max_by(|a, b| {
                a.comparison
                    .coverage
                    .partial_cmp(&b.comparison.coverage)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|r| r.category.clone())
            .unwrap_or_default();

        info!(
            "Mean coverage: {:.2}%, best category: {}",
            mean_coverage * 100.0,
            best_category
        );

        Ok(ExperimentResults {
            source: self.source.name().to_string(),
            category_results,
            mean_coverage,
            coverage_std,
            best_category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::norms::{parse_norms_table, Cell};
    use crate::pos::LexiconTagger;
    use crate::prediction::TokenPrediction;

    /// Canned predictions keyed by the exact sentence
    struct FixedSource {
        kind: SourceKind,
        answers: HashMap<String, Vec<(&'static str, f32)>>,
    }

    impl PredictionSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn predict(&self, sentence: &str, k: usize) -> Result<Vec<TokenPrediction>> {
            let answers = self
                .answers
                .get(sentence)
                .with_context(|| format!("no answer for {sentence:?}"))?;
            Ok(answers
                .iter()
                .take(k)
                .map(|(t, s)| TokenPrediction::new(*t, *s))
                .collect())
        }
    }

    fn context() -> AnalysisContext {
        let rows: Vec<Vec<Cell>> = ["1. A precious stone", "ruby", "diamond", "2. A metal", "iron"]
            .into_iter()
            .map(|s| vec![Cell::from(s)])
            .collect();
        let norms = parse_norms_table(&["Category"], &rows).unwrap();
        let lexicon = HashMap::from([("steel".to_string(), HashMap::from([(PosTag::Adj, 1.0)]))]);
        let tagger = LexiconTagger::from_weights(lexicon).with_fallback(PosTag::Noun);
        AnalysisContext::new(norms, Arc::new(tagger))
    }

    fn source(kind: SourceKind, answers: &[(&str, Vec<(&'static str, f32)>)]) -> Box<dyn PredictionSource> {
        Box::new(FixedSource {
            kind,
            answers: answers
                .iter()
                .map(|(s, a)| (s.to_string(), a.clone()))
                .collect(),
        })
    }

    #[test]
    fn test_config_defaults() {
        let config = ComparisonConfig::default();
        assert_eq!(config.top_k, 100);
        assert_eq!(config.allowed_tags, vec![PosTag::Noun, PosTag::Verb]);
        assert_eq!(config.article_merge, ArticleMerge::Mean);
        assert!(config.expand_articles);
    }

    #[test]
    fn test_config_partial_json() {
        let config: ComparisonConfig =
            serde_json::from_str(r#"{"top_k": 20, "article_merge": "max"}"#).unwrap();
        assert_eq!(config.top_k, 20);
        assert_eq!(config.article_merge, ArticleMerge::Max);
        assert_eq!(config.neighbor_step, 10);
    }

    #[test]
    fn test_article_forms_are_mean_merged() {
        let source = source(
            SourceKind::MaskedLanguageModel,
            &[
                ("a <MASK> is a precious stone", vec![("ruby", 0.4)]),
                ("an <MASK> is a precious stone", vec![("ruby", 0.2), ("opal", 0.6)]),
            ],
        );
        let experiment = Experiment::new(context(), source, ComparisonConfig::default());
        let scores = experiment.token_scores("a <MASK> is a precious stone").unwrap();

        assert!((scores["ruby"] - 0.3).abs() < 1e-6);
        assert!((scores["opal"] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_neighbor_query_widens() {
        let answers: Vec<(&'static str, f32)> =
            vec![("iron", 0.9), ("steel", 0.8), ("tin", 0.7), ("lead", 0.6)];
        let source = source(
            SourceKind::NearestNeighbors,
            &[("<MASK> is a metal", answers)],
        );
        let config = ComparisonConfig {
            top_k: 2,
            ..Default::default()
        };
        let experiment = Experiment::new(context(), source, config);
        let scores = experiment.token_scores("<MASK> is a metal").unwrap();

        // "steel" is filtered out, so the query widens to reach "tin"
        let tokens: Vec<&str> = scores.keys().map(String::as_str).collect();
        assert_eq!(tokens, vec!["iron", "tin"]);
    }

    #[test]
    fn test_run_pairs_prompts_with_categories() {
        let source = source(
            SourceKind::MaskedLanguageModel,
            &[
                ("the <MASK> is precious", vec![("ruby", 0.5), ("car", 0.1)]),
                ("<MASK> is a metal", vec![("iron", 0.5)]),
            ],
        );
        let experiment = Experiment::new(context(), source, ComparisonConfig::default());
        let results = experiment
            .run(&["the <MASK> is precious", "<MASK> is a metal"])
            .unwrap();

        assert_eq!(results.category_results.len(), 2);
        assert_eq!(results.category_results[0].comparison.found, vec!["ruby"]);
        assert_eq!(results.category_results[0].comparison.missing, vec!["diamond"]);
        assert_eq!(results.category_results[1].comparison.coverage, 1.0);
        assert!((results.mean_coverage - 0.75).abs() < 1e-9);
        assert_eq!(results.best_category, "A metal");
    }

    #[test]
    fn test_best_category_tie_keeps_first() {
        let source = source(
            SourceKind::MaskedLanguageModel,
            &[
                ("the <MASK> is precious", vec![("ruby", 0.5), ("diamond", 0.3)]),
                ("<MASK> is a metal", vec![("iron", 0.5)]),
            ],
        );
        let experiment = Experiment::new(context(), source, ComparisonConfig::default());
        let results = experiment
            .run(&["the <MASK> is precious", "<MASK> is a metal"])
            .unwrap();

        assert_eq!(results.category_results[0].comparison.coverage, 1.0);
        assert_eq!(results.category_results[1].comparison.coverage, 1.0);
        assert_eq!(results.best_category, "A precious stone");
    }

    #[test]
    fn test_run_rejects_mismatched_prompts() {
        let source = source(SourceKind::MaskedLanguageModel, &[]);
        let experiment = Experiment::new(context(), source, ComparisonConfig::default());
        assert!(experiment.run(&["<MASK> is a metal"]).is_err());
    }

    #[test]
    fn test_unknown_category_propagates() {
        let source = source(SourceKind::MaskedLanguageModel, &[("<MASK> is a color", vec![])]);
        let experiment = Experiment::new(context(), source, ComparisonConfig::default());
        let err = experiment.evaluate("<MASK> is a color", "A color").unwrap_err();
        assert!(err.to_string().contains("unknown category"));
    }
}
