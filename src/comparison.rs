//! Coverage of norm responses by a prediction set

use std::collections::HashSet;

use serde::Serialize;

use crate::error::Result;
use crate::norms::{CategoryEntry, NormsTable};
use crate::prediction::PredictionSet;

/// Which of a category's responses the predictions contain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// Response labels with a variation among the predictions
    pub found: Vec<String>,
    /// Response labels with no variation among the predictions
    pub missing: Vec<String>,
    /// found / (found + missing)
    pub coverage: f64,
}

impl ComparisonResult {
    /// Number of responses compared
    pub fn total(&self) -> usize {
        self.found.len() + self.missing.len()
    }
}

/// Compare predictions against one category's responses
///
/// A response is found when any of its variations equals a prediction
/// token, ignoring case. An empty category has coverage 0.
pub fn compare(predictions: &PredictionSet, entry: &CategoryEntry) -> ComparisonResult {
    let tokens: HashSet<String> = predictions.keys().map(|t| t.to_lowercase()).collect();

    let (found, missing): (Vec<String>, Vec<String>) = entry
        .iter()
        .map(|(label, record)| {
            let hit = record
                .variations
                .iter()
                .any(|v| tokens.contains(&v.to_lowercase()));
            (label.clone(), hit)
        })
        .fold((Vec::new(), Vec::new()), |(mut found, mut missing), (label, hit)| {
            if hit {
                found.push(label);
            } else {
                missing.push(label);
            }
            (found, missing)
        });

    let total = found.len() + missing.len();
    let coverage = if total == 0 {
        0.0
    } else {
        found.len() as f64 / total as f64
    };

    ComparisonResult {
        found,
        missing,
        coverage,
    }
}

/// Look up `category` in the table and compare against it
pub fn compare_category(
    predictions: &PredictionSet,
    table: &NormsTable,
    category: &str,
) -> Result<ComparisonResult> {
    Ok(compare(predictions, table.category(category)?))
}

/// Elements of `a` that also occur in `b`, in `a`'s order
pub fn intersect<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().filter(|x| b.contains(x)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NormsError;
    use crate::norms::{parse_norms_table, Cell};

    fn table() -> NormsTable {
        let rows: Vec<Vec<Cell>> = ["1. ruby", "gem", "stone(s)", "Jewel"]
            .into_iter()
            .map(|s| vec![Cell::from(s)])
            .collect();
        parse_norms_table(&["Category"], &rows).unwrap()
    }

    fn set(pairs: &[(&str, f32)]) -> PredictionSet {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn test_found_and_missing() {
        let table = table();
        let result =
            compare_category(&set(&[("stones", 0.5), ("jewel", 0.2)]), &table, "ruby").unwrap();

        assert_eq!(result.found, vec!["stone(s)", "Jewel"]);
        assert_eq!(result.missing, vec!["gem"]);
        assert!((result.coverage - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn test_coverage_bounds() {
        let table = table();
        let entry = table.get("ruby").unwrap();

        let none = compare(&set(&[("car", 0.9)]), entry);
        assert_eq!(none.coverage, 0.0);
        assert_eq!(none.found.len() + none.missing.len(), entry.len());

        let all = compare(&set(&[("GEM", 0.1), ("stone", 0.1), ("jewel", 0.1)]), entry);
        assert_eq!(all.coverage, 1.0);
        assert!(all.missing.is_empty());
    }

    #[test]
    fn test_empty_category() {
        let result = compare(&set(&[("gem", 0.4)]), &CategoryEntry::new());
        assert_eq!(result.coverage, 0.0);
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_unknown_category() {
        let err = compare_category(&set(&[]), &table(), "colour").unwrap_err();
        assert!(matches!(err, NormsError::UnknownCategory(_)));
    }

    #[test]
    fn test_intersect() {
        assert_eq!(intersect(&[1, 2, 3, 4], &[4, 2]), vec![2, 4]);
    }
}
