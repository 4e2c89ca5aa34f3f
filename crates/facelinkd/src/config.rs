use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match (strict).
    pub distance_threshold: f32,
    /// Minutes between announced sightings of the same person.
    pub cooldown_minutes: i64,
    /// Path to the ONNX face encoder model; mock encoder when unset.
    pub encoder_model: Option<PathBuf>,
    /// Encoding length the encoder produces.
    pub embedding_dim: usize,
    /// Timeout in seconds for a single encode call.
    pub encode_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `FACELINK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facelink");

        let db_path = std::env::var("FACELINK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facelink.db"));

        Self {
            db_path,
            distance_threshold: env_f32(
                "FACELINK_DISTANCE_THRESHOLD",
                facelink_core::matcher::DEFAULT_DISTANCE_THRESHOLD,
            ),
            cooldown_minutes: env_i64(
                "FACELINK_COOLDOWN_MINUTES",
                facelink_core::cooldown::DEFAULT_COOLDOWN_MINUTES,
            ),
            encoder_model: std::env::var("FACELINK_ENCODER_MODEL").ok().map(PathBuf::from),
            embedding_dim: env_usize("FACELINK_EMBEDDING_DIM", facelink_core::DEFAULT_EMBEDDING_DIM),
            encode_timeout_secs: env_u64("FACELINK_ENCODE_TIMEOUT_SECS", 10),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
