use rollcall_core::EmbeddingError;
use rollcall_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed image payload. Nothing was processed or persisted.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    /// Enrollment only: every detector tier failed to find a face.
    #[error("no face detected by any detector tier")]
    NoFaceDetected,
    /// Enrollment only: the winning tier produced unusable embedding values.
    #[error("detector produced an invalid embedding: {0}")]
    InvalidEmbedding(#[from] EmbeddingError),
    /// Recognition rejected before any detection work.
    #[error("session {0} is not active")]
    SessionInactive(i64),
    #[error("unknown session {0}")]
    UnknownSession(i64),
    #[error("unknown subject {0}")]
    UnknownSubject(i64),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("saving enrollment image: {0}")]
    Io(#[from] std::io::Error),
    /// The engine thread behind an `EngineHandle` has exited.
    #[error("engine thread exited")]
    ChannelClosed,
}
