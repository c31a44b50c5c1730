//! Score aggregation across several prediction sets
//!
//! Re-querying a prompt with "a" and "an" yields two distributions that
//! share most of their mass; these helpers fold them back into one.

use crate::prediction::PredictionSet;

/// Per-token maximum across sources, renormalized to sum to 1
///
/// If the maxima do not sum to a positive value they are returned as-is.
pub fn max_merge(sources: &[&PredictionSet]) -> PredictionSet {
    let mut merged = PredictionSet::new();
    for source in sources {
        for (token, &score) in *source {
            merged
                .entry(token.clone())
                .and_modify(|best| *best = best.max(score))
                .or_insert(score);
        }
    }

    let norm: f32 = merged.values().sum();
    if norm > 0.0 {
        for score in merged.values_mut() {
            *score /= norm;
        }
    }
    merged
}

/// Per-token mean across sources, counting a missing token as 0
pub fn mean_merge(sources: &[&PredictionSet]) -> PredictionSet {
    let mut sums = PredictionSet::new();
    for source in sources {
        for (token, &score) in *source {
            *sums.entry(token.clone()).or_insert(0.0) += score;
        }
    }

    let n = sources.len() as f32;
    for score in sums.values_mut() {
        *score /= n;
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, f32)]) -> PredictionSet {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn test_max_merge_normalizes() {
        let a = set(&[("ruby", 0.4), ("gem", 0.2)]);
        let b = set(&[("ruby", 0.1), ("opal", 0.4)]);
        let merged = max_merge(&[&a, &b]);

        let total: f32 = merged.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        // maxima 0.4, 0.2, 0.4 → norm 1.0
        assert!((merged["ruby"] - 0.4).abs() < 1e-6);
        assert!((merged["opal"] - 0.4).abs() < 1e-6);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_max_merge_never_exceeds_scaled_max() {
        let a = set(&[("x", 0.3), ("y", 0.1)]);
        let b = set(&[("x", 0.2), ("z", 0.05)]);
        let merged = max_merge(&[&a, &b]);
        let norm = 0.3 + 0.1 + 0.05;

        for (source, token) in [(&a, "x"), (&b, "x"), (&a, "y"), (&b, "z")] {
            assert!(merged[token] + 1e-6 >= source[token] / norm);
        }
        assert!((merged["x"] - 0.3 / norm).abs() < 1e-6);
    }

    #[test]
    fn test_max_merge_empty() {
        assert!(max_merge(&[]).is_empty());
        let zeros = set(&[("a", 0.0)]);
        assert_eq!(max_merge(&[&zeros])["a"], 0.0);
    }

    #[test]
    fn test_mean_merge_zero_fill() {
        let a = set(&[("ruby", 0.4), ("gem", 0.2)]);
        let b = set(&[("ruby", 0.2)]);
        let merged = mean_merge(&[&a, &b]);
        assert!((merged["ruby"] - 0.3).abs() < 1e-6);
        assert!((merged["gem"] - 0.1).abs() < 1e-6);

        let c = set(&[("opal", 0.6)]);
        let merged = mean_merge(&[&a, &b, &c]);
        assert!((merged["opal"] - 0.2).abs() < 1e-6);
        assert!((merged["ruby"] - 0.2).abs() < 1e-6);
        assert!(!merged.contains_key("jade"));
    }

    #[test]
    fn test_mean_merge_empty() {
        assert!(mean_merge(&[]).is_empty());
    }
}
