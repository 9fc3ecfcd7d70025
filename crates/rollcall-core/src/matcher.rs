//! Nearest-neighbor matching of a probe embedding against a gallery.
//!
//! Exhaustive search over the whole gallery is intentional: rosters are
//! class-sized (tens to low hundreds) and exactness under a fixed threshold
//! matters more than asymptotic speed. Do not swap in an approximate index
//! unless that size assumption changes.

use crate::gallery::GalleryIndex;
use crate::types::Embedding;

/// Default cosine-distance acceptance threshold for the VGG-Face backends.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.65;

/// Outcome of matching one probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Best distance was strictly below the threshold.
    Matched {
        /// Dense gallery position of the winning entry.
        position: usize,
        student_id: i64,
        distance: f32,
        /// `(1 − distance) × 100`.
        confidence: f32,
    },
    /// No gallery entry was close enough (or the gallery was empty).
    Unknown {
        /// Best distance observed, if any comparable pair existed.
        best_distance: Option<f32>,
    },
}

/// Strategy for classifying a probe embedding against a gallery.
pub trait Matcher {
    fn classify(&self, probe: &Embedding, gallery: &GalleryIndex) -> MatchOutcome;
}

/// Cosine-distance matcher with a strict `<` acceptance threshold.
///
/// A probe at exactly the threshold distance is `Unknown`. Ties at the
/// minimum distance resolve to the first-encountered gallery position.
#[derive(Debug, Clone, Copy)]
pub struct CosineMatcher {
    pub threshold: f32,
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Matcher for CosineMatcher {
    fn classify(&self, probe: &Embedding, gallery: &GalleryIndex) -> MatchOutcome {
        let mut best: Option<(usize, f32)> = None;

        for (pos, entry) in gallery.entries().iter().enumerate() {
            // Zero-norm / length-mismatch pairs yield None: skipped, never
            // selected (infinite distance).
            let Some(dist) = probe.cosine_distance(&entry.embedding) else {
                continue;
            };
            // Strict < keeps the first position on exact ties.
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((pos, dist)),
            }
        }

        match best {
            Some((pos, dist)) if dist < self.threshold => MatchOutcome::Matched {
                position: pos,
                student_id: gallery.entries()[pos].student_id,
                distance: dist,
                confidence: (1.0 - dist) * 100.0,
            },
            Some((_, dist)) => MatchOutcome::Unknown {
                best_distance: Some(dist),
            },
            None => MatchOutcome::Unknown {
                best_distance: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::GalleryEntry;

    fn gallery(embeddings: Vec<Vec<f32>>) -> GalleryIndex {
        let count = embeddings.len();
        let entries = embeddings
            .into_iter()
            .enumerate()
            .map(|(i, values)| GalleryEntry {
                student_id: (i + 1) as i64,
                name: format!("s{}", i + 1),
                roll_no: format!("R{}", i + 1),
                embedding: Embedding::new(values).unwrap(),
            })
            .collect();
        GalleryIndex::new(entries, count)
    }

    #[test]
    fn test_exact_self_match() {
        let g = gallery(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        match CosineMatcher::default().classify(&probe, &g) {
            MatchOutcome::Matched {
                position,
                student_id,
                distance,
                confidence,
            } => {
                assert_eq!(position, 1);
                assert_eq!(student_id, 2);
                assert!(distance.abs() < 1e-6);
                assert!((confidence - 100.0).abs() < 1e-3);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        assert_eq!(
            CosineMatcher::default().classify(&probe, &GalleryIndex::empty()),
            MatchOutcome::Unknown {
                best_distance: None
            }
        );
    }

    #[test]
    fn test_threshold_boundary_is_unknown() {
        // Orthogonal vectors: distance exactly 1.0. With threshold 1.0 the
        // strict < rule must classify Unknown.
        let g = gallery(vec![vec![0.0, 1.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        let outcome = CosineMatcher { threshold: 1.0 }.classify(&probe, &g);
        assert_eq!(
            outcome,
            MatchOutcome::Unknown {
                best_distance: Some(1.0)
            }
        );
    }

    #[test]
    fn test_just_under_threshold_matches() {
        let g = gallery(vec![vec![0.0, 1.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        let outcome = CosineMatcher {
            threshold: 1.0 + 1e-4,
        }
        .classify(&probe, &g);
        assert!(matches!(outcome, MatchOutcome::Matched { .. }));
    }

    #[test]
    fn test_tie_breaks_to_first_position() {
        // Two identical gallery entries: the first position must win.
        let g = gallery(vec![vec![1.0, 0.0], vec![1.0, 0.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        match CosineMatcher::default().classify(&probe, &g) {
            MatchOutcome::Matched {
                position,
                student_id,
                ..
            } => {
                assert_eq!(position, 0);
                assert_eq!(student_id, 1);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_norm_gallery_entry_skipped() {
        let g = gallery(vec![vec![0.0, 0.0], vec![1.0, 0.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        match CosineMatcher::default().classify(&probe, &g) {
            MatchOutcome::Matched { position, .. } => assert_eq!(position, 1),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_global_minimum_wins_over_earlier_entries() {
        // Best match is last: the search must be exhaustive.
        let g = gallery(vec![vec![0.0, 1.0], vec![0.5, 0.5], vec![1.0, 0.0]]);
        let probe = Embedding::new(vec![1.0, 0.0]).unwrap();
        match CosineMatcher::default().classify(&probe, &g) {
            MatchOutcome::Matched { position, .. } => assert_eq!(position, 2),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_confidence_from_distance() {
        // cos 60° = 0.5 → distance 0.5 → confidence 50.0
        let g = gallery(vec![vec![1.0, 0.0]]);
        let probe = Embedding::new(vec![0.5, 3f32.sqrt() / 2.0]).unwrap();
        match CosineMatcher::default().classify(&probe, &g) {
            MatchOutcome::Matched {
                distance,
                confidence,
                ..
            } => {
                assert!((distance - 0.5).abs() < 1e-5);
                assert!((confidence - 50.0).abs() < 1e-3);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }
}
