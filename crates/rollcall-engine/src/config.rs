use rollcall_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;

/// Engine configuration, loaded from environment variables.
///
/// `db_path` is shared with the CLI; `faces_dir` and `match_threshold` are
/// consumed by whichever process constructs the [`Engine`](crate::Engine)
/// (the serving layer), which passes them to `Engine::new`.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory where raw enrollment images are kept for re-inspection.
    pub faces_dir: PathBuf,
    /// Cosine-distance threshold below which a face counts as a match.
    pub match_threshold: f32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let faces_dir = std::env::var("ROLLCALL_FACES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces"));

        Self {
            db_path,
            faces_dir,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
