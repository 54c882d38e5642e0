//! Embedding comparison and gallery matching.
//!
//! Distance-based verification: `verified` is true iff distance <= threshold,
//! including exact equality at the boundary. Cosine distance is
//! 1 - cosine similarity, so identical directions score 0.0 and opposite
//! directions 2.0; with L2-normalized ArcFace embeddings the default
//! threshold of 0.6 corresponds to a similarity of 0.4.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Embedding, KnownFace};

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("embedding length mismatch: probe has {probe} dims, candidate has {candidate}")]
    DimensionMismatch { probe: usize, candidate: usize },
}

/// Distance metric used for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(format!("unknown distance metric: {other} (expected cosine or euclidean)")),
        }
    }
}

/// Metric and threshold, resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    pub metric: DistanceMetric,
    pub threshold: f32,
}

/// Outcome of comparing a probe embedding against a reference.
///
/// For gallery matching, `matched_id`/`matched_name` identify the best
/// candidate whether or not it verified; one-to-one comparisons leave them
/// empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub metric: DistanceMetric,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_name: Option<String>,
}

/// Compares two embeddings one-to-one under the given policy.
pub fn compare(a: &Embedding, b: &Embedding, policy: &MatchPolicy) -> Result<MatchResult, MatcherError> {
    let dist = distance(policy.metric, a, b)?;
    Ok(MatchResult {
        verified: dist <= policy.threshold,
        distance: dist,
        threshold: policy.threshold,
        metric: policy.metric,
        model_version: a.model_version.clone(),
        matched_id: None,
        matched_name: None,
    })
}

/// Matches a probe against the whole gallery, returning the single best
/// candidate with its score, or `None` for an empty gallery.
///
/// Ties are broken by lowest distance first, then earliest-inserted entry
/// (the strict comparison keeps the first of equals). Every entry is scored;
/// a dimension mismatch anywhere in the gallery aborts the match.
pub fn identify(
    probe: &Embedding,
    gallery: &[KnownFace],
    policy: &MatchPolicy,
) -> Result<Option<MatchResult>, MatcherError> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, entry) in gallery.iter().enumerate() {
        let dist = distance(policy.metric, probe, &entry.embedding)?;
        let improves = match best {
            Some((_, best_dist)) => dist < best_dist,
            None => true,
        };
        if improves {
            best = Some((idx, dist));
        }
    }

    Ok(best.map(|(idx, dist)| MatchResult {
        verified: dist <= policy.threshold,
        distance: dist,
        threshold: policy.threshold,
        metric: policy.metric,
        model_version: probe.model_version.clone(),
        matched_id: Some(gallery[idx].id.clone()),
        matched_name: Some(gallery[idx].name.clone()),
    }))
}

/// Computes the configured distance, checking lengths first.
pub fn distance(metric: DistanceMetric, a: &Embedding, b: &Embedding) -> Result<f32, MatcherError> {
    if a.dim() != b.dim() {
        return Err(MatcherError::DimensionMismatch { probe: a.dim(), candidate: b.dim() });
    }
    let d = match metric {
        DistanceMetric::Cosine => cosine_distance(&a.values, &b.values),
        DistanceMetric::Euclidean => euclidean_distance(&a.values, &b.values),
    };
    Ok(d)
}

/// 1 - cosine similarity, in [0, 2]. A zero-magnitude operand scores the
/// neutral 1.0 rather than dividing by zero.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        1.0 - dot / denom
    } else {
        1.0
    }
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: "w600k_r50".into() }
    }

    fn known(id: &str, name: &str, values: Vec<f32>) -> KnownFace {
        KnownFace {
            id: id.into(),
            name: name.into(),
            embedding: emb(values),
            enrolled_at: String::new(),
        }
    }

    const COSINE: MatchPolicy = MatchPolicy { metric: DistanceMetric::Cosine, threshold: 0.6 };

    #[test]
    fn test_cosine_identical_is_zero() {
        let result = compare(&emb(vec![1.0, 0.0, 0.0]), &emb(vec![1.0, 0.0, 0.0]), &COSINE).unwrap();
        assert!(result.verified);
        assert!(result.distance.abs() < 1e-6);
        assert_eq!(result.model_version, "w600k_r50");
        assert!(result.matched_name.is_none());
    }

    #[test]
    fn test_cosine_orthogonal_is_one() {
        let result = compare(&emb(vec![1.0, 0.0]), &emb(vec![0.0, 1.0]), &COSINE).unwrap();
        assert!(!result.verified);
        assert!((result.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_is_two() {
        let result = compare(&emb(vec![1.0, 0.0]), &emb(vec![-1.0, 0.0]), &COSINE).unwrap();
        assert!((result.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_neutral() {
        let result = compare(&emb(vec![0.0, 0.0]), &emb(vec![1.0, 0.0]), &COSINE).unwrap();
        assert!((result.distance - 1.0).abs() < 1e-6);
        assert!(!result.verified);
    }

    #[test]
    fn test_euclidean_distance() {
        let policy = MatchPolicy { metric: DistanceMetric::Euclidean, threshold: 0.6 };
        let result = compare(&emb(vec![0.0, 0.0]), &emb(vec![3.0, 4.0]), &policy).unwrap();
        assert!((result.distance - 5.0).abs() < 1e-6);
        assert!(!result.verified);
    }

    #[test]
    fn test_boundary_distance_equal_to_threshold_verifies() {
        // 3-4-5 triangle gives an exact distance of 5.0 in f32.
        let policy = MatchPolicy { metric: DistanceMetric::Euclidean, threshold: 5.0 };
        let result = compare(&emb(vec![0.0, 0.0]), &emb(vec![3.0, 4.0]), &policy).unwrap();
        assert_eq!(result.distance, 5.0);
        assert!(result.verified, "distance exactly at threshold must verify");

        // Same rule on the cosine side: identical vectors, zero threshold.
        let exact = MatchPolicy { metric: DistanceMetric::Cosine, threshold: 0.0 };
        let result = compare(&emb(vec![1.0, 0.0]), &emb(vec![1.0, 0.0]), &exact).unwrap();
        assert_eq!(result.distance, 0.0);
        assert!(result.verified);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let err = compare(&emb(vec![1.0, 0.0, 0.0]), &emb(vec![1.0, 0.0]), &COSINE).unwrap_err();
        assert!(matches!(err, MatcherError::DimensionMismatch { probe: 3, candidate: 2 }));
    }

    #[test]
    fn test_identify_scores_every_entry() {
        // Best match is the last entry; all entries must be visited.
        let probe = emb(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            known("1", "decoy1", vec![0.0, 1.0, 0.0]),
            known("2", "decoy2", vec![0.0, 0.0, 1.0]),
            known("3", "match", vec![1.0, 0.0, 0.0]),
        ];

        let result = identify(&probe, &gallery, &COSINE).unwrap().unwrap();
        assert!(result.verified);
        assert_eq!(result.matched_id.as_deref(), Some("3"));
        assert_eq!(result.matched_name.as_deref(), Some("match"));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_identify_tie_keeps_earliest_entry() {
        let probe = emb(vec![1.0, 0.0]);
        let gallery = vec![
            known("first", "alice", vec![1.0, 0.0]),
            known("second", "bob", vec![1.0, 0.0]),
        ];

        let result = identify(&probe, &gallery, &COSINE).unwrap().unwrap();
        assert_eq!(result.matched_id.as_deref(), Some("first"));
        assert_eq!(result.matched_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_identify_below_threshold_reports_candidate() {
        let probe = emb(vec![1.0, 0.0]);
        let gallery = vec![known("1", "someone", vec![0.0, 1.0])];

        let result = identify(&probe, &gallery, &COSINE).unwrap().unwrap();
        assert!(!result.verified);
        assert_eq!(result.matched_name.as_deref(), Some("someone"));
        assert!((result.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_identify_empty_gallery_is_none() {
        let probe = emb(vec![1.0, 0.0]);
        assert!(identify(&probe, &[], &COSINE).unwrap().is_none());
    }

    #[test]
    fn test_identify_gallery_dimension_mismatch_aborts() {
        let probe = emb(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            known("ok", "fine", vec![0.0, 1.0, 0.0]),
            known("stale", "old-model", vec![1.0, 0.0]),
        ];
        assert!(identify(&probe, &gallery, &COSINE).is_err());
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("Euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
