//! Room registry — lifecycle and fan-out.
//!
//! DESIGN
//! ======
//! Rooms are created lazily on first reference, bootstrapping their stroke
//! map from the persisted snapshot when one exists. Undo/redo and chat
//! always start empty. A room lives while it has clients; when the last one
//! leaves, its strokes are flushed and the room is evicted from the
//! registry. Disk state survives eviction and seeds the next incarnation.
//!
//! LOCKING
//! =======
//! The registry lock is taken before any room lock, never the other way
//! around. Handlers hold only the room lock for the duration of a room
//! operation, so unrelated rooms never contend. Eviction snapshots under
//! the room lock, flushes with no locks held, then re-checks emptiness
//! before removing the room, in case a client joined during the flush.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::envelope::Envelope;
use crate::services::persistence;
use crate::state::{AppState, Room, SharedRoom};

// =============================================================================
// REGISTRY
// =============================================================================

/// Look up a room, constructing it from its persisted snapshot on first
/// reference.
pub async fn get_or_create(state: &AppState, room_id: &str) -> SharedRoom {
    {
        let rooms = state.rooms.read().await;
        if let Some(room) = rooms.get(room_id) {
            return Arc::clone(room);
        }
    }

    let mut rooms = state.rooms.write().await;
    // Another task may have created it between the two locks.
    if let Some(room) = rooms.get(room_id) {
        return Arc::clone(room);
    }

    let strokes = persistence::load_room_strokes(&state.config.data_dir, room_id);
    if !strokes.is_empty() {
        info!(%room_id, count = strokes.len(), "hydrated room from disk");
    }
    let room = Arc::new(Mutex::new(Room::new(room_id, strokes)));
    rooms.insert(room_id.to_string(), Arc::clone(&room));
    room
}

/// Evict the room if it has no clients left, flushing strokes to disk
/// first. Persisted state remains on disk.
pub async fn drop_if_empty(state: &AppState, room_id: &str) {
    let shared = {
        let rooms = state.rooms.read().await;
        match rooms.get(room_id) {
            Some(shared) => Arc::clone(shared),
            None => return,
        }
    };

    let strokes = {
        let mut room = shared.lock().await;
        if !room.clients.is_empty() {
            return;
        }
        // Supersede any debounce timer still in flight for this incarnation.
        room.save_seq += 1;
        room.strokes.values().cloned().collect::<Vec<_>>()
    };

    // Flush with no locks held; joins against other rooms proceed freely.
    persistence::flush_room(&state.config.data_dir, room_id, strokes).await;

    // A client may have joined while the flush was in flight.
    let mut rooms = state.rooms.write().await;
    let still_empty = match rooms.get(room_id) {
        Some(shared) => shared.lock().await.clients.is_empty(),
        None => false,
    };
    if still_empty {
        rooms.remove(room_id);
        info!(%room_id, "evicted empty room");
    }
}

/// Number of live rooms.
pub async fn live_count(state: &AppState) -> usize {
    state.rooms.read().await.len()
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Fan a frame out to every connected client, optionally excluding one.
/// Delivery is best-effort: a full per-connection queue drops the frame for
/// that recipient rather than stalling the room.
pub fn broadcast(room: &Room, env: &Envelope, exclude: Option<&str>) {
    for (user_id, tx) in &room.clients {
        if exclude == Some(user_id.as_str()) {
            continue;
        }
        let _ = tx.try_send(env.clone());
    }
}

/// Queue a frame for one specific client. Returns false when the user is
/// not connected to this room.
pub fn unicast(room: &Room, user_id: &str, env: Envelope) -> bool {
    let Some(tx) = room.clients.get(user_id) else {
        return false;
    };
    let _ = tx.try_send(env);
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
