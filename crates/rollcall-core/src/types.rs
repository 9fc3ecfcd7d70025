use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedding length produced by the production VGG-Face backends.
///
/// Core does not hard-require this length — the matcher works on any
/// consistent dimensionality — but the engine's detector tiers all emit it.
pub const EMBEDDING_DIM: usize = 2622;

/// Bounding box of a detected face, in original-frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Error, Debug, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding is empty")]
    Empty,
    #[error("embedding value at index {0} is not finite")]
    NonFinite(usize),
}

/// Validated face embedding vector.
///
/// Construction rejects empty vectors and non-finite values, so every
/// `Embedding` in a gallery is safe to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite(idx));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine distance `1 − (A·B)/(‖A‖·‖B‖)` to another embedding.
    ///
    /// Returns `None` when the vectors differ in length or either has zero
    /// norm — such pairs are never selectable as a match (infinite distance).
    pub fn cosine_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            Some(1.0 - dot / denom)
        } else {
            None
        }
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Embedding::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(e: Embedding) -> Vec<f32> {
        e.values
    }
}

/// One detected face in a frame: region plus raw embedding values.
///
/// The embedding is left unvalidated here so a backend emitting garbage for
/// one face never poisons the rest of the frame — validation happens per
/// face at match time.
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: FaceRegion,
    pub embedding: Vec<f32>,
}
