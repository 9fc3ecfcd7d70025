//! rollcall-engine — Enrollment and real-time recognition for classroom
//! attendance.
//!
//! Wires the detector cascade, the per-session gallery cache, the cosine
//! matcher, and the attendance commit coordinator around a shared store.
//! Detection backends are injected; this crate never loads a model itself.

mod cache;
mod commit;
mod engine;
mod enroll;
mod error;
mod handle;

pub mod config;

pub use config::Config;
pub use engine::{Engine, FrameMatch, FrameReport, MarkedStudent, MatchedStudent};
pub use enroll::EnrollOutcome;
pub use error::EngineError;
pub use handle::{spawn_engine, EngineHandle};
