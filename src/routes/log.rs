//! Log sink — `POST /log` for client-side debug logging.
//!
//! Browsers and companion devices ship their console noise here during
//! debugging sessions. Bodies are JSON `{app, level, msg, data}`; each entry
//! becomes one line in a per-app file. Everything is tolerant: malformed
//! bodies are ignored, and the endpoint always answers `ok` so client log
//! shippers never retry-loop. Writes only happen when the debug flag is on.

use std::io::Write;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use tracing::warn;

use crate::envelope::now_ms;
use crate::state::AppState;

/// Cap on the request body; larger uploads are terminated by the body
/// limit layer before reaching the handler.
pub const MAX_LOG_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct LogBody {
    #[serde(default)]
    app: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

pub async fn append_log(State(state): State<AppState>, body: Bytes) -> &'static str {
    if !state.config.debug_logs {
        return "ok";
    }
    let Ok(entry) = serde_json::from_slice::<LogBody>(&body) else {
        return "ok";
    };
    if let Err(e) = write_line(&state.config.log_dir, &entry) {
        warn!(error = %e, "log sink write failed");
    }
    "ok"
}

fn write_line(log_dir: &Path, entry: &LogBody) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let app = sanitize_app(entry.app.as_deref());
    let path = log_dir.join(format!("{app}.log"));

    let level = entry.level.as_deref().unwrap_or("info");
    let msg = entry.msg.as_deref().unwrap_or("");
    let data = match &entry.data {
        Some(data) => format!(" {data}"),
        None => String::new(),
    };
    let line = format!("{} [{}] {}{}\n", now_ms(), level, msg, data);

    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    // One write call per line keeps concurrent appends line-atomic.
    file.write_all(line.as_bytes())
}

/// App names become filenames; restrict them to a safe charset.
fn sanitize_app(app: Option<&str>) -> String {
    let name: String = app
        .unwrap_or("app")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    if name.is_empty() { "app".into() } else { name }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "log_test.rs"]
mod tests;
