//! Nearest-neighbor matching of a probe encoding against the gallery.
//!
//! Linear scan over all known encodings — the gallery is tens of people,
//! not millions, so no index is warranted. The [`Matcher`] trait is the
//! seam where an indexed search could be swapped in later.

use crate::types::{FaceVector, MatchResult};
use thiserror::Error;

/// Default maximum distance for two encodings to count as the same person.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(
        "stored encoding for {person_id} has {actual} components, probe has {expected} — \
         re-register the photo"
    )]
    DimensionMismatch {
        person_id: String,
        expected: usize,
        actual: usize,
    },
}

/// One gallery entry: a person key and their registered encoding.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub person_id: String,
    pub vector: FaceVector,
}

/// Strategy for comparing a probe encoding against the gallery.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &FaceVector,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean-distance matcher.
///
/// The minimum-distance entry is the candidate, ties broken by earliest
/// gallery position. Accepted only when `distance < threshold` (strict);
/// confidence is `max(0, 1 - distance)`, zero when nothing clears the
/// threshold.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(
        &self,
        probe: &FaceVector,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        if gallery.is_empty() {
            return Ok(MatchResult::no_match());
        }

        let mut best_distance = f32::INFINITY;
        let mut best_idx = 0usize;

        for (i, entry) in gallery.iter().enumerate() {
            if entry.vector.len() != probe.len() {
                return Err(MatchError::DimensionMismatch {
                    person_id: entry.person_id.clone(),
                    expected: probe.len(),
                    actual: entry.vector.len(),
                });
            }

            // Strict `<` keeps the earliest entry on exact ties.
            let distance = probe.euclidean_distance(&entry.vector);
            if distance < best_distance {
                best_distance = distance;
                best_idx = i;
            }
        }

        if best_distance < threshold {
            Ok(MatchResult {
                person_id: Some(gallery[best_idx].person_id.clone()),
                confidence: (1.0 - best_distance).max(0.0),
            })
        } else {
            Ok(MatchResult::no_match())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            person_id: id.to_string(),
            vector: FaceVector::new(values),
        }
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let probe = FaceVector::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &[], 0.6).unwrap();
        assert!(!result.is_match());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_exact_match_full_confidence() {
        let probe = FaceVector::new(vec![0.3, 0.7, 0.1]);
        let gallery = vec![
            entry("decoy", vec![0.9, 0.9, 0.9]),
            entry("target", vec![0.3, 0.7, 0.1]),
        ];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.person_id.as_deref(), Some("target"));
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_at_threshold_rejected() {
        // Distance is exactly 0.6 — strict inequality must reject it.
        let probe = FaceVector::new(vec![0.0, 0.0]);
        let gallery = vec![entry("close", vec![0.6, 0.0])];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6).unwrap();
        assert!(!result.is_match());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_distance_just_under_threshold_accepted() {
        let probe = FaceVector::new(vec![0.0, 0.0]);
        let gallery = vec![entry("close", vec![0.59, 0.0])];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.person_id.as_deref(), Some("close"));
        assert!((result.confidence - 0.41).abs() < 1e-5);
    }

    #[test]
    fn test_tie_broken_by_earliest_entry() {
        let probe = FaceVector::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("first", vec![0.1, 0.0]),
            entry("second", vec![0.0, 0.1]),
        ];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.person_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_picks_minimum_distance() {
        let probe = FaceVector::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("far", vec![0.5, 0.0]),
            entry("near", vec![0.1, 0.0]),
            entry("farther", vec![0.55, 0.0]),
        ];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.person_id.as_deref(), Some("near"));
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let probe = FaceVector::new(vec![0.0, 0.0, 0.0]);
        let gallery = vec![entry("short", vec![0.0, 0.0])];
        let err = EuclideanMatcher
            .best_match(&probe, &gallery, 0.6)
            .unwrap_err();
        match err {
            MatchError::DimensionMismatch {
                person_id,
                expected,
                actual,
            } => {
                assert_eq!(person_id, "short");
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
        }
    }

    #[test]
    fn test_confidence_clamped_at_zero() {
        // Distance > 1 would produce a negative confidence without the clamp;
        // with a wide threshold the match is accepted but confidence floors at 0.
        let probe = FaceVector::new(vec![0.0, 0.0]);
        let gallery = vec![entry("distant", vec![1.5, 0.0])];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 2.0).unwrap();
        assert_eq!(result.person_id.as_deref(), Some("distant"));
        assert_eq!(result.confidence, 0.0);
    }
}
