//! Enrollment pipeline: image in, persisted embedding out.
//!
//! Decodes the captured image, saves the raw bytes at a subject-keyed path
//! for later re-inspection, runs the detector cascade in strict mode, and
//! replaces the subject's stored embedding with the winning face's. Nothing
//! is persisted to the face table when every tier fails.

use crate::error::EngineError;
use rollcall_core::{DetectorCascade, Embedding, EMBEDDING_DIM};
use rollcall_store::Store;
use std::fs;
use std::path::{Path, PathBuf};

/// Successful enrollment summary.
#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub student_id: i64,
    /// Where the raw captured image was saved.
    pub image_path: PathBuf,
    /// Detector tier that found the face.
    pub detector_tier: String,
    /// Dimensionality of the persisted embedding.
    pub dimensions: usize,
}

pub(crate) fn enroll_subject(
    store: &Store,
    cascade: &DetectorCascade,
    faces_dir: &Path,
    student_id: i64,
    image_bytes: &[u8],
) -> Result<EnrollOutcome, EngineError> {
    let student = store
        .get_student(student_id)?
        .ok_or(EngineError::UnknownSubject(student_id))?;

    let image = image::load_from_memory(image_bytes)?;

    // Save the raw capture before extraction so a failed enrollment still
    // leaves an inspectable image behind. Deterministic path: re-enrollment
    // overwrites the previous capture along with the embedding.
    fs::create_dir_all(faces_dir)?;
    let image_path = faces_dir.join(format!("student_{student_id}_face.jpg"));
    fs::write(&image_path, image_bytes)?;

    let (detection, tier) = cascade
        .extract_first(&image)
        .map_err(|_| EngineError::NoFaceDetected)?;
    let tier = tier.to_string();

    let embedding = Embedding::new(detection.embedding)?;
    if embedding.len() != EMBEDDING_DIM {
        // A backend emitting an off-spec length still enrolls (the matcher
        // skips mismatched pairs), but it deserves a loud note.
        tracing::warn!(
            student_id,
            dim = embedding.len(),
            expected = EMBEDDING_DIM,
            "embedding dimensionality differs from the production backends"
        );
    }
    store.upsert_face(student_id, &embedding, &image_path.to_string_lossy())?;

    tracing::info!(
        student_id,
        name = %student.name,
        tier = %tier,
        dim = embedding.len(),
        "face enrolled"
    );

    Ok(EnrollOutcome {
        student_id,
        image_path,
        detector_tier: tier,
        dimensions: embedding.len(),
    })
}
