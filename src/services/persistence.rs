//! Persistence — debounced whiteboard snapshots on disk.
//!
//! DESIGN
//! ======
//! Each room owns one JSON file under the data directory. Every mutating
//! whiteboard event bumps the room's save generation and arms a 250 ms
//! timer; a newer event within the window supersedes the older timer, so a
//! burst of stroke traffic collapses into one write. Writes are whole-file
//! replacements of pretty-printed JSON.
//!
//! ERROR HANDLING
//! ==============
//! Write failures are logged and never interrupt serving; the next mutation
//! re-arms the timer and retries naturally. Missing or corrupt files on load
//! are downgraded to "empty room, same id". Only strokes are persisted:
//! chat, undo/redo, and pair tokens are intentionally volatile.
//!
//! Writes use `std::fs` routed through `spawn_blocking`, so neither the
//! debounce timer nor an eviction flush ever stalls an executor thread.
//! The first-reference load stays synchronous: a room is not served until
//! its snapshot is in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::envelope::now_ms;
use crate::state::{Room, SharedRoom, Stroke};

/// How long a mutation may sit in memory before it must reach disk.
pub const SAVE_DEBOUNCE_MS: u64 = 250;

// =============================================================================
// FILE FORMAT
// =============================================================================

/// On-disk shape of a room snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomFile {
    pub room_id: String,
    /// Server wall clock at write time, milliseconds since the Unix epoch.
    pub saved_at: i64,
    pub strokes: Vec<Stroke>,
}

/// Resolve the snapshot path for a room. Room ids are opaque client input,
/// so anything outside a filename-safe charset is replaced before touching
/// the filesystem.
#[must_use]
pub fn room_path(data_dir: &Path, room_id: &str) -> PathBuf {
    data_dir.join(format!("{}.json", sanitize_file_stem(room_id)))
}

fn sanitize_file_stem(room_id: &str) -> String {
    let stem: String = room_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() { "room".into() } else { stem }
}

// =============================================================================
// LOAD / SAVE
// =============================================================================

/// Read a room's persisted strokes. Missing files and parse failures both
/// yield an empty map.
#[must_use]
pub fn load_room_strokes(data_dir: &Path, room_id: &str) -> HashMap<String, Stroke> {
    let path = room_path(data_dir, room_id);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(error = %e, %room_id, "room snapshot unreadable; starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_str::<RoomFile>(&raw) {
        Ok(file) => file
            .strokes
            .into_iter()
            .map(|s| (s.stroke_id.clone(), s))
            .collect(),
        Err(e) => {
            warn!(error = %e, %room_id, "room snapshot corrupt; starting empty");
            HashMap::new()
        }
    }
}

/// Write a room snapshot as a whole-file replacement.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the file
/// cannot be written.
pub fn save_room(data_dir: &Path, room_id: &str, strokes: Vec<Stroke>) -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let file = RoomFile { room_id: room_id.to_string(), saved_at: now_ms(), strokes };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(room_path(data_dir, room_id), json)
}

// =============================================================================
// DEBOUNCE
// =============================================================================

/// Arm (or re-arm) the room's debounced save. Call with the room lock held,
/// right after a mutation; the spawned timer only writes if no newer
/// mutation superseded it.
pub fn schedule_save(data_dir: &Path, shared: &SharedRoom, room: &mut Room) {
    room.save_seq += 1;
    let seq = room.save_seq;
    let shared = Arc::clone(shared);
    let data_dir = data_dir.to_path_buf();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(SAVE_DEBOUNCE_MS)).await;
        let (room_id, strokes) = {
            let room = shared.lock().await;
            if room.save_seq != seq {
                // A newer mutation re-armed the timer; let that one write.
                return;
            }
            (room.room_id.clone(), room.strokes.values().cloned().collect::<Vec<_>>())
        };
        write_snapshot(data_dir, room_id, strokes).await;
    });
}

/// Immediate best-effort flush, used when an emptied room is evicted.
/// Callers pass a snapshot taken under the room lock; no lock is held while
/// the file is written.
pub async fn flush_room(data_dir: &Path, room_id: &str, strokes: Vec<Stroke>) {
    write_snapshot(data_dir.to_path_buf(), room_id.to_string(), strokes).await;
}

/// Run the blocking file write on the blocking pool and log the outcome.
async fn write_snapshot(data_dir: PathBuf, room_id: String, strokes: Vec<Stroke>) {
    let label = room_id.clone();
    match tokio::task::spawn_blocking(move || save_room(&data_dir, &room_id, strokes)).await {
        Ok(Ok(())) => debug!(room_id = %label, "room snapshot written"),
        Ok(Err(e)) => warn!(error = %e, room_id = %label, "room snapshot write failed"),
        Err(e) => warn!(error = %e, room_id = %label, "room snapshot write task failed"),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
