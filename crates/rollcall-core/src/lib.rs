//! rollcall-core — Embeddings, detector cascade, and gallery matching.
//!
//! Pure matching logic for the attendance engine: no storage, no I/O beyond
//! the injected detection capability.

pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod types;

pub use detector::{DetectorCascade, DetectorError, FaceDetector};
pub use gallery::{GalleryEntry, GalleryIndex};
pub use matcher::{CosineMatcher, MatchOutcome, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use types::{Detection, Embedding, EmbeddingError, FaceRegion, EMBEDDING_DIM};
