use crate::error::AppError;

/// Every tunable the reconciliation engine reads at startup.
///
/// Loaded once in `main` via `dotenvy::dotenv()` + `std::env::var`,
/// the same way the teacher binary loads `RD_API_TOKEN`/`TMDB_API_KEY`.
#[derive(Debug, Clone)]
pub struct Config {
    pub mount_root: String,
    pub consumer_mount_root: String,
    pub films_dir: String,
    pub shows_dir: String,

    pub tmdb_api_key: String,
    pub tmdb_base: String,

    pub pocketbase_url: String,

    pub real_debrid_api_key: String,
    pub repair_enabled: bool,
    pub max_repair_attempts: u32,
    pub min_video_file_size_mb: u64,

    pub jellyfin_url: Option<String>,
    pub jellyfin_api_key: Option<String>,

    pub webhook_port: u16,
    pub scan_interval_secs: u64,
    pub cleanup_archived: bool,
}

fn required(name: &str) -> Result<String, AppError> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{name} must be set")))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn optional_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            mount_root: required("ZURG_MOUNT")?,
            consumer_mount_root: optional("JELLYFIN_ZURG_PATH", ""),
            films_dir: required("FILMS_DIR")?,
            shows_dir: required("SHOWS_DIR")?,

            tmdb_api_key: required("TMDB_API_KEY")?,
            tmdb_base: optional("TMDB_BASE", "https://api.themoviedb.org/3"),

            pocketbase_url: required("POCKETBASE_URL")?,

            real_debrid_api_key: required("REAL_DEBRID_API_KEY")?,
            repair_enabled: optional_bool("REPAIR_ENABLED", true),
            max_repair_attempts: optional_u64("MAX_REPAIR_ATTEMPTS", 3) as u32,
            min_video_file_size_mb: optional_u64("MIN_VIDEO_FILE_SIZE_MB", 100),

            jellyfin_url: std::env::var("JELLYFIN_URL").ok(),
            jellyfin_api_key: std::env::var("JELLYFIN_API_KEY").ok(),

            webhook_port: optional_u64("WEBHOOK_PORT", 8080) as u16,
            scan_interval_secs: optional_u64("SCAN_INTERVAL_SECS", 300),
            cleanup_archived: optional_bool("CLEANUP_ARCHIVED", true),
        })
    }
}
