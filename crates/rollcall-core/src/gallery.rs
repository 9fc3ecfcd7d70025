//! In-memory gallery of enrolled (subject, embedding) pairs.
//!
//! A `GalleryIndex` is derived from the store, never mutated in place, and
//! carries the enrolled-subject count observed at build time as its
//! staleness baseline.

use crate::types::Embedding;

/// One enrolled subject in the gallery, at a dense position.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub embedding: Embedding,
}

/// Immutable snapshot of the enrolled gallery for one session.
///
/// `baseline_count` is the number of subjects with a persisted embedding at
/// the moment the index was built. Staleness is detected purely by comparing
/// that count against the store's current count — an in-place embedding
/// replacement that leaves the count unchanged is NOT detected. That is a
/// known limitation of the count heuristic, kept deliberately.
#[derive(Debug, Clone)]
pub struct GalleryIndex {
    entries: Vec<GalleryEntry>,
    baseline_count: usize,
}

impl GalleryIndex {
    pub fn new(entries: Vec<GalleryEntry>, baseline_count: usize) -> Self {
        Self {
            entries,
            baseline_count,
        }
    }

    /// Build an empty index (no enrolled subjects). Valid: matching against
    /// it yields zero matches, never an error.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            baseline_count: 0,
        }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn baseline_count(&self) -> usize {
        self.baseline_count
    }

    /// Whether the gallery changed since this index was built, judged by
    /// enrolled-subject count alone.
    pub fn is_stale(&self, current_enrolled_count: usize) -> bool {
        self.baseline_count != current_enrolled_count
    }
}
