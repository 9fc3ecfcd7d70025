//! Async front for the engine.
//!
//! The engine itself is synchronous and CPU-bound; the web layer talks to it
//! through a clone-safe [`EngineHandle`] backed by a dedicated OS thread, so
//! no lock is ever held across an `.await`.

use crate::engine::{Engine, FrameReport};
use crate::enroll::EnrollOutcome;
use crate::error::EngineError;
use tokio::sync::{mpsc, oneshot};

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Enroll {
        student_id: i64,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EnrollOutcome, EngineError>>,
    },
    ProcessFrame {
        session_id: i64,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
    InvalidateCache {
        session_id: i64,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    EndSession {
        session_id: i64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll a subject's face from a captured image.
    pub async fn enroll(
        &self,
        student_id: i64,
        image: Vec<u8>,
    ) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                student_id,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Run detection, matching, and attendance commit for one frame.
    pub async fn process_frame(
        &self,
        session_id: i64,
        image: Vec<u8>,
    ) -> Result<FrameReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ProcessFrame {
                session_id,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Force a gallery rebuild; returns the rebuilt entry count.
    pub async fn invalidate_cache(&self, session_id: i64) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::InvalidateCache {
                session_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// End a session and discard its cache entry.
    pub async fn end_session(&self, session_id: i64) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::EndSession {
                session_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread and return its handle.
pub fn spawn_engine(engine: Engine) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        student_id,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(engine.enroll(student_id, &image));
                    }
                    EngineRequest::ProcessFrame {
                        session_id,
                        image,
                        reply,
                    } => {
                        let _ = reply.send(engine.process_frame(session_id, &image));
                    }
                    EngineRequest::InvalidateCache { session_id, reply } => {
                        let _ = reply.send(engine.invalidate_cache(session_id));
                    }
                    EngineRequest::EndSession { session_id, reply } => {
                        let _ = reply.send(engine.end_session(session_id));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
