// Pedantic clippy configuration for research/analysis codebase
// These are acceptable in numerical/ML code:
#![allow(clippy::cast_precision_loss)] // usize→f64/f32 intentional in ML
#![allow(clippy::cast_possible_truncation)] // usize→u32 in tensor indexing
#![allow(clippy::similar_names)] // related variables like `a_form`/`an_form`
#![allow(clippy::module_name_repetitions)] // NormsTable in norms.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns
#![allow(clippy::needless_pass_by_value)] // value params for API flexibility

//! catnorm-rs: category norms vs. masked-language-model predictions
//!
//! Measures how many human exemplar responses from the Dunlosky category
//! norms a masked language model (or a word-embedding neighbourhood)
//! produces for a category prompt such as "a <MASK> is a precious stone".
//!
//! ## Architecture
//!
//! - `norms`: Norms table parser (category → response → record)
//! - `prompts`: Masked prompts, one per norms category
//! - `prediction`: Ranked predictions and the `PredictionSource` seam
//! - `masked_lm`: BERT / RoBERTa mask filling as a prediction source
//! - `forward_bert`: Encoder + MLM head forward pass in candle
//! - `embedding`: GloVe nearest neighbours as a prediction source
//! - `pos`: Part-of-speech tagging and prediction filtering
//! - `merge`: Max- and mean-merging of score sets
//! - `comparison`: Found / missing responses and coverage
//! - `experiment`: Session runner tying norms, tagger and source together
//! - `score_table`: Token × query score grid for inspection

pub mod comparison;
pub mod embedding;
pub mod error;
pub mod experiment;
pub mod forward_bert;
pub mod masked_lm;
pub mod merge;
pub mod norms;
pub mod pos;
pub mod prediction;
pub mod prompts;
pub mod score_table;

pub use comparison::{compare, compare_category, intersect, ComparisonResult};
pub use embedding::{content_words, EmbeddingSource, GloveIndex};
pub use error::NormsError;
pub use experiment::{
    AnalysisContext, ArticleMerge, CategoryResult, ComparisonConfig, Experiment, ExperimentResults,
};
pub use forward_bert::{BertConfig, BertForMaskedLm, EncoderFlavor};
pub use masked_lm::{MaskedLm, MaskedLmModel};
pub use merge::{max_merge, mean_merge};
pub use norms::{
    classify_row, expand_plural_variations, flatten_nested, parse_norms_table, CategoryEntry, Cell,
    NormsTable, ResponseRecord, RowKind,
};
pub use pos::{filter_by_pos, LexiconTagger, PosTag, PosTagger, CONTENT_WORDS, NOUNS_AND_VERBS};
pub use prediction::{to_prediction_set, PredictionSet, PredictionSource, SourceKind, TokenPrediction};
pub use prompts::{dunlosky_prompts, DUNLOSKY_PROMPTS, MASK_PLACEHOLDER};
pub use score_table::ScoreTable;
