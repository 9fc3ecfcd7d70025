//! rollcall-store — SQLite persistence for the attendance engine.
//!
//! Typed access to subjects, per-subject face embeddings, recognition
//! sessions, and attendance records. Embeddings are stored as JSON arrays of
//! `f32`, which round-trips the values exactly. The (student, session)
//! uniqueness invariant is enforced at the schema level in addition to the
//! coordinator's own checks.

use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, GalleryEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt embedding for student {student_id}: {reason}")]
    CorruptEmbedding { student_id: i64, reason: String },
    /// Unreachable for validated embeddings (finite `f32` always encodes),
    /// but propagated rather than asserted.
    #[error("embedding encode: {0}")]
    EncodeEmbedding(#[from] serde_json::Error),
}

/// A student row.
#[derive(Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub roll_no: String,
}

/// A recognition session row.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub subject: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// A persisted attendance record.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_id: i64,
    pub session_id: i64,
    pub status: String,
    pub confidence: Option<f32>,
    pub recognition_secs: Option<f64>,
    pub marked_at: DateTime<Utc>,
}

/// A record staged for insertion by the commit coordinator.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: i64,
    pub session_id: i64,
    pub confidence: f32,
    pub recognition_secs: f64,
    pub marked_at: DateTime<Utc>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    roll_no     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS face_data (
    student_id  INTEGER PRIMARY KEY REFERENCES students(id) ON DELETE CASCADE,
    embedding   TEXT NOT NULL,
    image_path  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject     TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    ended_at    TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS attendance (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id       INTEGER NOT NULL REFERENCES students(id),
    session_id       INTEGER NOT NULL REFERENCES sessions(id),
    status           TEXT NOT NULL DEFAULT 'Present',
    confidence       REAL,
    recognition_secs REAL,
    marked_at        TEXT NOT NULL,
    UNIQUE(student_id, session_id)
);
";

/// Handle to the attendance database. Cheap to share behind an `Arc`;
/// callers serialize through the inner connection lock.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- students ---

    pub fn add_student(&self, name: &str, roll_no: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO students (name, roll_no) VALUES (?1, ?2)",
            params![name, roll_no],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_student(&self, id: i64) -> Result<Option<Student>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, roll_no FROM students WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Student {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        roll_no: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, roll_no FROM students ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Student {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    roll_no: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn remove_student(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM students WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // --- face data ---

    /// Persist the subject's embedding, fully replacing any prior one.
    pub fn upsert_face(
        &self,
        student_id: i64,
        embedding: &Embedding,
        image_path: &str,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(embedding.values())?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO face_data (student_id, embedding, image_path, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id) DO UPDATE SET
                 embedding = excluded.embedding,
                 image_path = excluded.image_path,
                 created_at = excluded.created_at",
            params![student_id, json, image_path, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(student_id, dim = embedding.len(), "face embedding stored");
        Ok(())
    }

    pub fn remove_face(&self, student_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM face_data WHERE student_id = ?1",
            params![student_id],
        )?;
        Ok(n > 0)
    }

    /// Number of subjects with a persisted embedding — the gallery cache's
    /// staleness baseline.
    pub fn enrolled_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM face_data", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All enrolled subjects with their embeddings, in stable id order.
    /// Subjects without face data never appear here.
    pub fn enrolled_faces(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.roll_no, f.embedding
             FROM students s JOIN face_data f ON f.student_id = s.id
             ORDER BY s.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (student_id, name, roll_no, json) in rows {
            let values: Vec<f32> = serde_json::from_str(&json).map_err(|e| {
                StoreError::CorruptEmbedding {
                    student_id,
                    reason: e.to_string(),
                }
            })?;
            let embedding =
                Embedding::new(values).map_err(|e| StoreError::CorruptEmbedding {
                    student_id,
                    reason: e.to_string(),
                })?;
            entries.push(GalleryEntry {
                student_id,
                name,
                roll_no,
                embedding,
            });
        }
        Ok(entries)
    }

    // --- sessions ---

    pub fn create_session(&self, subject: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (subject, started_at, is_active) VALUES (?1, ?2, 1)",
            params![subject, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, subject, started_at, ended_at, is_active
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(id, subject, started, ended, is_active)| Session {
            id,
            subject,
            started_at: parse_ts(&started),
            ended_at: ended.as_deref().map(parse_ts),
            is_active,
        }))
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subject, started_at, ended_at, is_active FROM sessions ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, subject, started, ended, is_active)| Session {
                id,
                subject,
                started_at: parse_ts(&started),
                ended_at: ended.as_deref().map(parse_ts),
                is_active,
            })
            .collect())
    }

    /// Mark the session inactive. Idempotent; returns whether a row changed.
    pub fn end_session(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?2 WHERE id = ?1 AND is_active = 1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        if n > 0 {
            tracing::debug!(session_id = id, "session marked inactive");
        }
        Ok(n > 0)
    }

    // --- attendance ---

    pub fn attendance_exists(&self, student_id: i64, session_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM attendance WHERE student_id = ?1 AND session_id = ?2",
                params![student_id, session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a frame's staged records as one transaction. On any failure
    /// the whole batch rolls back and nothing is persisted.
    pub fn insert_attendance_batch(&self, batch: &[NewAttendance]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for rec in batch {
            tx.execute(
                "INSERT INTO attendance
                     (student_id, session_id, status, confidence, recognition_secs, marked_at)
                 VALUES (?1, ?2, 'Present', ?3, ?4, ?5)",
                params![
                    rec.student_id,
                    rec.session_id,
                    rec.confidence,
                    rec.recognition_secs,
                    rec.marked_at.to_rfc3339()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn attendance_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT student_id, session_id, status, confidence, recognition_secs, marked_at
             FROM attendance WHERE session_id = ?1 ORDER BY marked_at",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<f32>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(
                |(student_id, session_id, status, confidence, secs, marked)| AttendanceRecord {
                    student_id,
                    session_id,
                    status,
                    confidence,
                    recognition_secs: secs,
                    marked_at: parse_ts(&marked),
                },
            )
            .collect())
    }
}

/// Timestamps are written by this crate as RFC 3339; a row that fails to
/// parse would mean external tampering, so fall back to the epoch rather
/// than erroring a read path.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}
