//! Example: Compare a prediction source against the Dunlosky norms
//!
//! Run with: cargo run --example compare_norms -- --norms dunlosky.csv --lexicon pos.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use catnorm_rs::{
    dunlosky_prompts, AnalysisContext, ComparisonConfig, EmbeddingSource, Experiment, GloveIndex,
    LexiconTagger, MaskedLm, MaskedLmModel, NormsTable, PosTag, PosTagger, PredictionSource,
    ScoreTable,
};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "compare_norms")]
#[command(about = "Category norms coverage of masked-language-model predictions")]
#[command(version)]
struct Cli {
    /// Path to the norms CSV export
    #[arg(short, long)]
    norms: PathBuf,

    /// Prediction source: "bert-base-uncased", "roberta-base" or "glove"
    #[arg(short, long, default_value = "bert-base-uncased")]
    backend: String,

    /// GloVe text vectors (required for the glove backend)
    #[arg(long)]
    vectors: Option<PathBuf>,

    /// Limit the number of GloVe vectors loaded
    #[arg(long)]
    max_words: Option<usize>,

    /// POS lexicon JSON (word -> {tag: weight})
    #[arg(short, long)]
    lexicon: PathBuf,

    /// Comparison config JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the config's top_k
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Write results JSON here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a token x prompt score table (CSV) here
    #[arg(long)]
    scores: Option<PathBuf>,

    /// Print the top N filled sentences for each prompt
    #[arg(long)]
    show: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Force CPU mode
    #[arg(long)]
    cpu: bool,
}

fn load_source(cli: &Cli, tagger: &Arc<dyn PosTagger>) -> Result<Box<dyn PredictionSource>> {
    if cli.backend == "glove" {
        let path = cli
            .vectors
            .as_ref()
            .context("--vectors is required for the glove backend")?;
        let index = GloveIndex::load(path, cli.max_words)?;
        return Ok(Box::new(EmbeddingSource::new(index, Arc::clone(tagger))));
    }

    let kind: MaskedLmModel = cli.backend.parse()?;
    let model = MaskedLm::from_pretrained_with_device(kind, Some(cli.cpu))?;
    info!(
        "Model: {} layers, {} hidden, {} vocab",
        model.n_layers(),
        model.d_model(),
        model.vocab_size()
    );
    Ok(Box::new(model))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== catnorm-rs: category norms comparison ===");
    println!("Norms:   {}", cli.norms.display());
    println!("Backend: {}", cli.backend);
    if cli.cpu {
        println!("Mode:    CPU (forced)");
    }

    let mut config = match &cli.config {
        Some(path) => ComparisonConfig::load(path)?,
        None => ComparisonConfig::default(),
    };
    if let Some(top_k) = cli.top_k {
        config.top_k = top_k;
    }

    let norms = NormsTable::load_csv(&cli.norms)?;
    let tagger: Arc<dyn PosTagger> =
        Arc::new(LexiconTagger::load(&cli.lexicon)?.with_fallback(PosTag::Noun));
    let source = load_source(&cli, &tagger)?;

    let prompts = dunlosky_prompts();

    if let Some(n) = cli.show {
        for prompt in &prompts {
            let predictions = source.predict(prompt, n)?;
            MaskedLm::print_filled(prompt, &predictions, n);
        }
    }

    if let Some(path) = &cli.scores {
        let table = ScoreTable::build(&[source.as_ref()], &prompts, config.top_k)?;
        table.write_csv(path)?;
    }

    let experiment = Experiment::new(AnalysisContext::new(norms, tagger), source, config);
    let results = experiment.run(&prompts)?;
    results.print_summary();

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Results saved to {}", path.display());
    }

    Ok(())
}
