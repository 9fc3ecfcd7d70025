//! Attendance commit coordinator.
//!
//! Takes the frame's matched subjects and persists at most one record per
//! (subject, session): a same-frame buffer catches duplicates within one
//! batch, the store's existence check catches subjects marked by earlier
//! frames, and the batch goes in as a single transaction.

use chrono::{DateTime, Utc};
use rollcall_store::{NewAttendance, Store, StoreError};

/// One matched subject from the current frame, ready for staging.
#[derive(Debug, Clone)]
pub(crate) struct FrameCandidate {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub confidence: f32,
}

/// A subject newly marked present by this frame.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarkedStudent {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub marked_at: DateTime<Utc>,
}

/// Stage and commit the frame's candidates. Returns the subjects actually
/// marked; already-marked subjects are skipped silently (not an error).
pub(crate) fn commit_frame(
    store: &Store,
    session_id: i64,
    candidates: Vec<FrameCandidate>,
    recognition_secs: f64,
    now: DateTime<Utc>,
) -> Result<Vec<MarkedStudent>, StoreError> {
    let mut batch: Vec<NewAttendance> = Vec::new();
    let mut marked: Vec<MarkedStudent> = Vec::new();

    for candidate in candidates {
        // Same-frame dedup: two faces matching one subject stage one record.
        if batch.iter().any(|r| r.student_id == candidate.student_id) {
            continue;
        }
        if store.attendance_exists(candidate.student_id, session_id)? {
            tracing::debug!(
                session_id,
                student_id = candidate.student_id,
                "already marked this session"
            );
            continue;
        }
        batch.push(NewAttendance {
            student_id: candidate.student_id,
            session_id,
            confidence: candidate.confidence,
            recognition_secs,
            marked_at: now,
        });
        marked.push(MarkedStudent {
            student_id: candidate.student_id,
            name: candidate.name,
            roll_no: candidate.roll_no,
            marked_at: now,
        });
    }

    if batch.is_empty() {
        return Ok(Vec::new());
    }

    store.insert_attendance_batch(&batch)?;
    tracing::info!(session_id, count = batch.len(), "attendance batch committed");
    Ok(marked)
}
