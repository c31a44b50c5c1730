//! Side-by-side scores from several sources and prompts
//!
//! Rows are tokens, columns are `"{source}: {sentence}"` pairs; a cell is
//! empty when that query did not return the token.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::info;

use crate::prediction::{format_token, PredictionSource, TokenPrediction};

#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    columns: Vec<String>,
    rows: IndexMap<String, Vec<Option<f32>>>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query every source with every sentence
    pub fn build(sources: &[&dyn PredictionSource], sentences: &[&str], k: usize) -> Result<Self> {
        let mut table = Self::new();
        for source in sources {
            for sentence in sentences {
                let predictions = source.predict(sentence, k)?;
                table.add_column(format!("{}: {}", source.name(), sentence), &predictions);
            }
            info!("Scored {} sentences with {}", sentences.len(), source.name());
        }
        Ok(table)
    }

    /// Append a column; the first score of a repeated token is kept
    pub fn add_column(&mut self, label: String, predictions: &[TokenPrediction]) {
        let width = self.columns.len();
        self.columns.push(label);
        for row in self.rows.values_mut() {
            row.push(None);
        }
        for pred in predictions {
            let row = self
                .rows
                .entry(pred.token.clone())
                .or_insert_with(|| vec![None; width + 1]);
            if row[width].is_none() {
                row[width] = Some(pred.score);
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Tokens in first-seen order
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn get(&self, token: &str, column: usize) -> Option<f32> {
        self.rows.get(token)?.get(column).copied().flatten()
    }

    /// Number of token rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as CSV with a leading `token` column
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(std::iter::once("token").chain(self.columns.iter().map(String::as_str)))?;
        for (token, scores) in &self.rows {
            let cells = scores
                .iter()
                .map(|s| s.map(|v| v.to_string()).unwrap_or_default());
            writer.write_record(std::iter::once(token.clone()).chain(cells))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.to_writer(file)?;
        info!("Score table saved to {}", path.display());
        Ok(())
    }

    /// Print the `top_k` tokens of each column
    pub fn print_summary(&self, top_k: usize) {
        for (i, column) in self.columns.iter().enumerate() {
            let mut ranked: Vec<(&String, f32)> = self
                .rows
                .iter()
                .filter_map(|(token, scores)| scores[i].map(|s| (token, s)))
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            println!("\n{column}:");
            for (rank, (token, score)) in ranked.into_iter().take(top_k).enumerate() {
                println!(
                    "  {}. {:>15} ({:.2}%)",
                    rank + 1,
                    format!("\"{}\"", format_token(token)),
                    score * 100.0
                );
            }
        }
    }
}
