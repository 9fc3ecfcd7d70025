//! End-to-end engine tests with scripted detector backends.
//!
//! The detection capability is injected, so these tests drive the full
//! enroll → cache → match → commit path with known embeddings and a real
//! (in-memory) store.

use rollcall_core::{Detection, DetectorCascade, DetectorError, FaceDetector, FaceRegion};
use rollcall_engine::{spawn_engine, Engine, EngineError};
use rollcall_store::Store;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Backend that returns a fixed set of faces on every call and counts
/// invocations. An empty script means strict-mode failure.
struct ScriptedDetector {
    name: &'static str,
    faces: Mutex<Vec<Vec<f32>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    fn boxed(
        name: &'static str,
        faces: Vec<Vec<f32>>,
    ) -> (Box<dyn FaceDetector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                name,
                faces: Mutex::new(faces),
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

impl FaceDetector for ScriptedDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn detect_and_embed(
        &self,
        _image: &image::DynamicImage,
        strict: bool,
    ) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let faces = self.faces.lock().unwrap().clone();
        if strict && faces.is_empty() {
            return Err(DetectorError::NoFaceDetected);
        }
        Ok(faces
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| Detection {
                region: FaceRegion {
                    x: i as f32 * 10.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                },
                embedding,
            })
            .collect())
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

struct Fixture {
    engine: Engine,
    store: Arc<Store>,
    frame_calls: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

/// Engine with a single-tier enroll cascade and a scripted frame detector.
fn fixture(enroll_faces: Vec<Vec<f32>>, frame_faces: Vec<Vec<f32>>) -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (enroll_tier, _) = ScriptedDetector::boxed("enroll", enroll_faces);
    let (frame_detector, frame_calls) = ScriptedDetector::boxed("frame", frame_faces);
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        store.clone(),
        DetectorCascade::new(vec![enroll_tier]),
        frame_detector,
        0.65,
        dir.path().join("faces"),
    );
    Fixture {
        engine,
        store,
        frame_calls,
        _dir: dir,
    }
}

#[test]
fn enroll_persists_embedding_and_saves_image() {
    let fx = fixture(vec![vec![1.0, 0.0, 0.0]], vec![]);
    let id = fx.store.add_student("Ada", "R001").unwrap();

    let outcome = fx.engine.enroll(id, &png_bytes()).unwrap();
    assert_eq!(outcome.student_id, id);
    assert_eq!(outcome.dimensions, 3);
    assert!(outcome.image_path.exists());
    assert!(outcome
        .image_path
        .to_string_lossy()
        .ends_with(&format!("student_{id}_face.jpg")));

    let faces = fx.store.enrolled_faces().unwrap();
    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].embedding.values(), &[1.0, 0.0, 0.0]);
}

#[test]
fn enroll_cascade_falls_through_tiers_in_order() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (t1, c1) = ScriptedDetector::boxed("retinaface", vec![]);
    let (t2, c2) = ScriptedDetector::boxed("ssd", vec![]);
    let (t3, c3) = ScriptedDetector::boxed("opencv", vec![vec![0.5, 0.5]]);
    let (frame, _) = ScriptedDetector::boxed("frame", vec![]);
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        store.clone(),
        DetectorCascade::new(vec![t1, t2, t3]),
        frame,
        0.65,
        dir.path().join("faces"),
    );

    let id = store.add_student("Ada", "R001").unwrap();
    let outcome = engine.enroll(id, &png_bytes()).unwrap();
    assert_eq!(outcome.detector_tier, "opencv");
    assert_eq!(c1.load(Ordering::SeqCst), 1);
    assert_eq!(c2.load(Ordering::SeqCst), 1);
    assert_eq!(c3.load(Ordering::SeqCst), 1);
}

#[test]
fn enroll_fails_closed_when_all_tiers_miss() {
    let fx = fixture(vec![], vec![]);
    let id = fx.store.add_student("Ada", "R001").unwrap();

    // Prior enrollment that must survive the failed attempt untouched.
    fx.store
        .upsert_face(
            id,
            &rollcall_core::Embedding::new(vec![9.0, 9.0]).unwrap(),
            "old.jpg",
        )
        .unwrap();

    let err = fx.engine.enroll(id, &png_bytes()).unwrap_err();
    assert!(matches!(err, EngineError::NoFaceDetected));

    let faces = fx.store.enrolled_faces().unwrap();
    assert_eq!(faces[0].embedding.values(), &[9.0, 9.0]);
}

#[test]
fn reenroll_replaces_embedding() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![]);
    let id = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(id, &png_bytes()).unwrap();

    // Second capture with a different face vector.
    let (tier, _) = ScriptedDetector::boxed("enroll", vec![vec![0.0, 1.0]]);
    let (frame, _) = ScriptedDetector::boxed("frame", vec![]);
    let dir = tempfile::tempdir().unwrap();
    let engine2 = Engine::new(
        fx.store.clone(),
        DetectorCascade::new(vec![tier]),
        frame,
        0.65,
        dir.path().join("faces"),
    );
    engine2.enroll(id, &png_bytes()).unwrap();

    let faces = fx.store.enrolled_faces().unwrap();
    assert_eq!(faces.len(), 1, "re-enrollment must not duplicate");
    assert_eq!(faces[0].embedding.values(), &[0.0, 1.0]);
}

#[test]
fn enroll_rejects_unknown_subject_and_garbage_image() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![]);
    assert!(matches!(
        fx.engine.enroll(42, &png_bytes()).unwrap_err(),
        EngineError::UnknownSubject(42)
    ));

    let id = fx.store.add_student("Ada", "R001").unwrap();
    assert!(matches!(
        fx.engine.enroll(id, b"definitely not an image").unwrap_err(),
        EngineError::Decode(_)
    ));
    assert_eq!(fx.store.enrolled_count().unwrap(), 0);
}

#[test]
fn frame_matches_and_marks_once_across_frames() {
    // Gallery: S1 opposite to the probe, S2 at cosine similarity 0.7 from
    // it, i.e. distance 0.3 under τ = 0.65 → match S2, confidence 70.
    let probe = vec![0.7, (1.0f32 - 0.49).sqrt()];
    let fx = fixture(vec![vec![-1.0, 0.0]], vec![probe]);

    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();

    let s2 = fx.store.add_student("Ben", "R002").unwrap();
    fx.store
        .upsert_face(
            s2,
            &rollcall_core::Embedding::new(vec![1.0, 0.0]).unwrap(),
            "ben.jpg",
        )
        .unwrap();

    let session = fx.engine.start_session("CS101").unwrap();

    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 1);
    let matched = report.matches[0].student.as_ref().unwrap();
    assert_eq!(matched.student_id, s2);
    assert_eq!(matched.name, "Ben");
    let confidence = report.matches[0].confidence.unwrap();
    assert!((confidence - 70.0).abs() < 0.01, "confidence {confidence}");
    assert_eq!(report.newly_marked.len(), 1);
    assert_eq!(report.newly_marked[0].student_id, s2);

    // Identical second frame: still recognized, but no new record.
    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 1);
    assert!(report.newly_marked.is_empty());
    assert_eq!(fx.store.attendance_for_session(session).unwrap().len(), 1);
}

#[test]
fn unknown_face_yields_no_attendance() {
    // Probe orthogonal to the only gallery entry: distance 1.0 > τ.
    let fx = fixture(vec![vec![1.0, 0.0]], vec![vec![0.0, 1.0]]);
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();
    let session = fx.engine.start_session("CS101").unwrap();

    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 1);
    assert!(report.matches[0].student.is_none());
    assert!(report.matches[0].confidence.is_none());
    assert!(report.newly_marked.is_empty());
    assert!(fx.store.attendance_for_session(session).unwrap().is_empty());
}

#[test]
fn inactive_session_rejected_before_detection() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![vec![1.0, 0.0]]);
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();

    let session = fx.engine.start_session("CS101").unwrap();
    fx.engine.end_session(session).unwrap();

    let err = fx.engine.process_frame(session, &png_bytes()).unwrap_err();
    assert!(matches!(err, EngineError::SessionInactive(id) if id == session));
    assert_eq!(
        fx.frame_calls.load(Ordering::SeqCst),
        0,
        "detector must not run for an inactive session"
    );

    assert!(matches!(
        fx.engine.process_frame(9999, &png_bytes()).unwrap_err(),
        EngineError::UnknownSession(9999)
    ));
}

#[test]
fn frame_decode_error_reported() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![vec![1.0, 0.0]]);
    let session = fx.engine.start_session("CS101").unwrap();
    assert!(matches!(
        fx.engine.process_frame(session, b"not a png").unwrap_err(),
        EngineError::Decode(_)
    ));
    assert_eq!(fx.frame_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn new_enrollment_triggers_cache_rebuild_mid_session() {
    let fx = fixture(vec![vec![0.0, 1.0]], vec![vec![0.0, 1.0]]);
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.store
        .upsert_face(
            s1,
            &rollcall_core::Embedding::new(vec![1.0, 0.0]).unwrap(),
            "ada.jpg",
        )
        .unwrap();

    let session = fx.engine.start_session("CS101").unwrap();

    // First frame builds the index with only S1; probe matches nobody.
    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert!(report.newly_marked.is_empty());

    // Ben enrolls mid-session with exactly the probe's face.
    let s2 = fx.store.add_student("Ben", "R002").unwrap();
    fx.engine.enroll(s2, &png_bytes()).unwrap();

    // Count changed → rebuild before matching → Ben is immediately matchable.
    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.newly_marked.len(), 1);
    assert_eq!(report.newly_marked[0].student_id, s2);
}

#[test]
fn empty_gallery_reports_zero_matches() {
    let fx = fixture(vec![], vec![vec![1.0, 0.0]]);
    let session = fx.engine.start_session("CS101").unwrap();
    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert!(report.matches.is_empty());
    assert!(report.newly_marked.is_empty());
}

#[test]
fn bad_face_skipped_rest_of_frame_processed() {
    // First face carries a NaN embedding, second is a clean match.
    let fx = fixture(
        vec![vec![1.0, 0.0]],
        vec![vec![f32::NAN, 0.0], vec![1.0, 0.0]],
    );
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();
    let session = fx.engine.start_session("CS101").unwrap();

    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 1, "bad face skipped, good face kept");
    assert_eq!(
        report.matches[0].student.as_ref().unwrap().student_id,
        s1
    );
    assert_eq!(report.newly_marked.len(), 1);
}

#[test]
fn commit_failure_still_returns_matches() {
    // Exploit the count heuristic to get a genuine persistence failure:
    // after the index is built, the enrolled student is removed and another
    // enrolled in their place. The count is unchanged, so the stale index
    // still carries the removed subject; marking them trips the attendance
    // foreign key and the batch rolls back. Recognition must still succeed.
    let fx = fixture(vec![], vec![vec![1.0, 0.0]]);
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.store
        .upsert_face(
            s1,
            &rollcall_core::Embedding::new(vec![1.0, 0.0]).unwrap(),
            "ada.jpg",
        )
        .unwrap();

    let session = fx.engine.start_session("CS101").unwrap();
    assert_eq!(fx.engine.invalidate_cache(session).unwrap(), 1);

    fx.store.remove_student(s1).unwrap();
    let s2 = fx.store.add_student("Ben", "R002").unwrap();
    fx.store
        .upsert_face(
            s2,
            &rollcall_core::Embedding::new(vec![0.0, 1.0]).unwrap(),
            "ben.jpg",
        )
        .unwrap();

    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 1);
    assert_eq!(
        report.matches[0].student.as_ref().unwrap().student_id,
        s1,
        "stale index still resolves the removed subject"
    );
    assert!(
        report.newly_marked.is_empty(),
        "failed commit must not report anyone as marked"
    );
    assert!(
        fx.store.attendance_for_session(session).unwrap().is_empty(),
        "batch must have rolled back"
    );
}

#[test]
fn invalidate_cache_returns_rebuilt_count() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![]);
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();

    let session = fx.engine.start_session("CS101").unwrap();
    assert_eq!(fx.engine.invalidate_cache(session).unwrap(), 1);
}

#[test]
fn two_faces_same_frame_both_marked() {
    let fx = fixture(
        vec![vec![1.0, 0.0]],
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
    );
    let s1 = fx.store.add_student("Ada", "R001").unwrap();
    fx.engine.enroll(s1, &png_bytes()).unwrap();
    let s2 = fx.store.add_student("Ben", "R002").unwrap();
    fx.store
        .upsert_face(
            s2,
            &rollcall_core::Embedding::new(vec![0.0, 1.0]).unwrap(),
            "ben.jpg",
        )
        .unwrap();

    let session = fx.engine.start_session("CS101").unwrap();
    let report = fx.engine.process_frame(session, &png_bytes()).unwrap();
    assert_eq!(report.matches.len(), 2);
    assert_eq!(report.newly_marked.len(), 2);
    assert_eq!(fx.store.attendance_for_session(session).unwrap().len(), 2);
}

#[tokio::test]
async fn handle_front_round_trips() {
    let fx = fixture(vec![vec![1.0, 0.0]], vec![vec![1.0, 0.0]]);
    let store = fx.store.clone();
    let id = store.add_student("Ada", "R001").unwrap();
    let session = fx.engine.start_session("CS101").unwrap();

    let handle = spawn_engine(fx.engine);

    let outcome = handle.enroll(id, png_bytes()).await.unwrap();
    assert_eq!(outcome.student_id, id);

    let report = handle.process_frame(session, png_bytes()).await.unwrap();
    assert_eq!(report.newly_marked.len(), 1);

    assert_eq!(handle.invalidate_cache(session).await.unwrap(), 1);

    handle.end_session(session).await.unwrap();
    assert!(matches!(
        handle.process_frame(session, png_bytes()).await.unwrap_err(),
        EngineError::SessionInactive(_)
    ));
}
