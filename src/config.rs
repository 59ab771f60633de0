//! Runtime configuration, loaded once at startup.
//!
//! DESIGN
//! ======
//! Everything is environment-driven with tolerant parsing: a missing or
//! malformed value falls back to its default instead of aborting. Paths are
//! resolved relative to the working directory.

use std::path::PathBuf;

/// Default listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Where room snapshots live, relative to the working directory.
const ROOMS_DIR: &str = "data/rooms";

/// Where the debug log sink writes per-app files.
const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen port.
    pub port: u16,
    /// Directory holding per-room JSON snapshots.
    pub data_dir: PathBuf,
    /// Directory holding per-app debug log files.
    pub log_dir: PathBuf,
    /// Whether the `POST /log` sink writes to disk.
    pub debug_logs: bool,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            data_dir: PathBuf::from(ROOMS_DIR),
            log_dir: PathBuf::from(LOGS_DIR),
            debug_logs: std::env::var("REALTIME_DEBUG_LOGS").is_ok_and(|v| v == "true"),
        }
    }
}

pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TESTS
// =============================================================================
