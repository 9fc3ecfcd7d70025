//! Frame recognition orchestration.

use crate::cache::GalleryCache;
use crate::commit::{commit_frame, FrameCandidate};
use crate::enroll::{enroll_subject, EnrollOutcome};
use crate::error::EngineError;
use rollcall_core::{
    CosineMatcher, DetectorCascade, Embedding, FaceDetector, FaceRegion, MatchOutcome, Matcher,
};
use rollcall_store::Store;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub use crate::commit::MarkedStudent;

/// A subject identified in the frame.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedStudent {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
}

/// Per-face match decision. `student` is `None` for Unknown faces.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMatch {
    pub region: FaceRegion,
    pub student: Option<MatchedStudent>,
    /// `(1 − distance) × 100` when matched.
    pub confidence: Option<f32>,
}

/// Result of processing one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    pub matches: Vec<FrameMatch>,
    pub newly_marked: Vec<MarkedStudent>,
}

/// Enrollment and real-time recognition engine.
///
/// Shareable across threads (`&self` methods). Frames from the same session
/// serialize on that session's cache slot; different sessions proceed in
/// parallel.
pub struct Engine {
    store: Arc<Store>,
    enroll_cascade: DetectorCascade,
    frame_detector: Box<dyn FaceDetector>,
    matcher: CosineMatcher,
    faces_dir: PathBuf,
    cache: GalleryCache,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        enroll_cascade: DetectorCascade,
        frame_detector: Box<dyn FaceDetector>,
        match_threshold: f32,
        faces_dir: PathBuf,
    ) -> Self {
        tracing::info!(
            tiers = ?enroll_cascade.tier_names(),
            frame_detector = frame_detector.name(),
            match_threshold,
            "engine initialized"
        );
        Self {
            store,
            enroll_cascade,
            frame_detector,
            matcher: CosineMatcher {
                threshold: match_threshold,
            },
            faces_dir,
            cache: GalleryCache::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Enroll (or re-enroll) a subject's face from a captured image.
    pub fn enroll(&self, student_id: i64, image_bytes: &[u8]) -> Result<EnrollOutcome, EngineError> {
        enroll_subject(
            &self.store,
            &self.enroll_cascade,
            &self.faces_dir,
            student_id,
            image_bytes,
        )
    }

    /// Detect, match, and mark attendance for one video frame.
    ///
    /// Recognition succeeding is independent of the attendance commit: a
    /// commit-time store failure is logged and `newly_marked` comes back
    /// empty, but the matches are still returned.
    pub fn process_frame(
        &self,
        session_id: i64,
        image_bytes: &[u8],
    ) -> Result<FrameReport, EngineError> {
        let started = Instant::now();

        // Inactive sessions are rejected before any decode or detection work.
        let session = self
            .store
            .get_session(session_id)?
            .ok_or(EngineError::UnknownSession(session_id))?;
        if !session.is_active {
            return Err(EngineError::SessionInactive(session_id));
        }

        let image = image::load_from_memory(image_bytes)?;

        let slot = self.cache.slot(session_id);
        let mut state = slot.lock().expect("session slot lock poisoned");
        let index = state.ensure_fresh(session_id, &self.store)?;

        if index.is_empty() {
            tracing::debug!(session_id, "empty gallery, nothing to match");
            return Ok(FrameReport::default());
        }

        // Non-strict: zero faces is an empty list. A whole-frame backend
        // failure must not abort the frame either; it degrades to zero faces.
        let detections = match self.frame_detector.detect_and_embed(&image, false) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(session_id, error = %err, "frame detection failed");
                Vec::new()
            }
        };
        tracing::debug!(session_id, faces = detections.len(), "frame detected");

        let mut matches = Vec::new();
        let mut candidates = Vec::new();

        for (face_idx, detection) in detections.into_iter().enumerate() {
            // One bad face never aborts the rest of the frame.
            let probe = match Embedding::new(detection.embedding) {
                Ok(probe) => probe,
                Err(err) => {
                    tracing::warn!(
                        session_id,
                        face = face_idx,
                        error = %err,
                        "skipping face with invalid embedding"
                    );
                    continue;
                }
            };

            match self.matcher.classify(&probe, &index) {
                MatchOutcome::Matched {
                    position,
                    distance,
                    confidence,
                    ..
                } => {
                    let entry = &index.entries()[position];
                    tracing::debug!(
                        session_id,
                        face = face_idx,
                        student_id = entry.student_id,
                        distance,
                        "face matched"
                    );
                    matches.push(FrameMatch {
                        region: detection.region,
                        student: Some(MatchedStudent {
                            student_id: entry.student_id,
                            name: entry.name.clone(),
                            roll_no: entry.roll_no.clone(),
                        }),
                        confidence: Some(confidence),
                    });
                    candidates.push(FrameCandidate {
                        student_id: entry.student_id,
                        name: entry.name.clone(),
                        roll_no: entry.roll_no.clone(),
                        confidence,
                    });
                }
                MatchOutcome::Unknown { best_distance } => {
                    tracing::debug!(
                        session_id,
                        face = face_idx,
                        ?best_distance,
                        "face below threshold, unknown"
                    );
                    matches.push(FrameMatch {
                        region: detection.region,
                        student: None,
                        confidence: None,
                    });
                }
            }
        }

        let recognition_secs = started.elapsed().as_secs_f64();
        let newly_marked = match commit_frame(
            &self.store,
            session_id,
            candidates,
            recognition_secs,
            chrono::Utc::now(),
        ) {
            Ok(marked) => marked,
            Err(err) => {
                tracing::error!(
                    session_id,
                    error = %err,
                    "attendance commit failed, batch rolled back"
                );
                Vec::new()
            }
        };

        Ok(FrameReport {
            matches,
            newly_marked,
        })
    }

    /// Force a gallery rebuild for the session. Returns the number of
    /// enrolled subjects in the fresh index.
    pub fn invalidate_cache(&self, session_id: i64) -> Result<usize, EngineError> {
        let slot = self.cache.slot(session_id);
        let mut state = slot.lock().expect("session slot lock poisoned");
        let index = state.rebuild(session_id, &self.store)?;
        Ok(index.len())
    }

    /// Start a new recognition session for a subject/course label.
    pub fn start_session(&self, subject: &str) -> Result<i64, EngineError> {
        let id = self.store.create_session(subject)?;
        tracing::info!(session_id = id, subject, "session started");
        Ok(id)
    }

    /// End the session and discard its cache slot. No further attendance is
    /// accepted for it.
    pub fn end_session(&self, session_id: i64) -> Result<(), EngineError> {
        if self
            .store
            .get_session(session_id)?
            .is_none()
        {
            return Err(EngineError::UnknownSession(session_id));
        }
        self.store.end_session(session_id)?;
        self.cache.discard(session_id);
        tracing::info!(session_id, "session ended");
        Ok(())
    }
}
