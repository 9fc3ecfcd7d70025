//! Face detection/embedding capability and the enrollment fallback cascade.
//!
//! The model itself is opaque to this crate: backends implement
//! [`FaceDetector`] and are injected into the engine. Enrollment runs an
//! ordered list of tiers (most geometrically robust first) and takes the
//! first tier that finds a face — a data-driven fallback policy rather than
//! nested error handling.

use crate::types::Detection;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// Strict-mode detection found zero faces.
    #[error("no face detected")]
    NoFaceDetected,
    /// Backend-specific failure (model crash, unsupported input, ...).
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// Opaque detection + embedding capability.
///
/// `strict = true` fails with [`DetectorError::NoFaceDetected`] when zero
/// faces are found; `strict = false` returns an empty list instead.
pub trait FaceDetector: Send + Sync {
    /// Short backend name for logs (e.g. "retinaface", "ssd", "opencv").
    fn name(&self) -> &str;

    fn detect_and_embed(
        &self,
        image: &DynamicImage,
        strict: bool,
    ) -> Result<Vec<Detection>, DetectorError>;
}

/// Ordered detector tiers tried in sequence until one finds a face.
///
/// Tier order encodes reliability under pose variation: tier 1 handles
/// profile/angled faces, later tiers are faster but frontal-only. The first
/// tier returning at least one face wins; its first face is used.
pub struct DetectorCascade {
    tiers: Vec<Box<dyn FaceDetector>>,
}

impl DetectorCascade {
    pub fn new(tiers: Vec<Box<dyn FaceDetector>>) -> Self {
        Self { tiers }
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Run the cascade in strict mode and return the first face found,
    /// together with the name of the tier that produced it.
    ///
    /// Exhausting every tier without a face yields
    /// [`DetectorError::NoFaceDetected`].
    pub fn extract_first(
        &self,
        image: &DynamicImage,
    ) -> Result<(Detection, &str), DetectorError> {
        for tier in &self.tiers {
            match tier.detect_and_embed(image, true) {
                Ok(mut detections) if !detections.is_empty() => {
                    tracing::debug!(
                        tier = tier.name(),
                        faces = detections.len(),
                        "cascade: tier found faces"
                    );
                    return Ok((detections.remove(0), tier.name()));
                }
                Ok(_) => {
                    // Strict backends shouldn't return empty Ok, but treat
                    // it as a miss and keep falling through.
                    tracing::warn!(tier = tier.name(), "cascade: tier returned no faces");
                }
                Err(err) => {
                    tracing::warn!(
                        tier = tier.name(),
                        error = %err,
                        "cascade: tier failed, falling through"
                    );
                }
            }
        }
        Err(DetectorError::NoFaceDetected)
    }
}
