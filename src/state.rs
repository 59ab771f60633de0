//! Shared application state and domain types.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the room registry and the pair-token table. Each live room is an
//! `Arc<Mutex<Room>>`: the mutex is the room's single-writer guarantee, so
//! stroke mutations, undo/redo, broadcasts, and save scheduling against one
//! room never interleave. Unrelated rooms proceed independently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::config::Config;
use crate::envelope::Envelope;
use crate::services::pairing::PairRegistry;

// =============================================================================
// STROKES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    Pen,
    Highlighter,
    Eraser,
}

/// Rendering style of a stroke. Replaced wholesale by the latest event that
/// carries one (last-writer-wins within a stroke).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub tool: StrokeTool,
    pub color: String,
    /// Width relative to the canvas, not in pixels.
    pub width: f64,
    pub opacity: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self { tool: StrokeTool::Pen, color: "#000000".into(), width: 0.004, opacity: 1.0 }
    }
}

/// A single polyline point in normalized [0,1] canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    /// Client-side timestamp; opaque to the server.
    #[serde(default)]
    pub t: f64,
}

/// Authoritative form of a whiteboard stroke.
///
/// `stroke_id` is client-chosen and unique within a room; `user_id` is
/// server-assigned at first sighting and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub stroke_id: String,
    pub user_id: String,
    pub style: StrokeStyle,
    pub points: Vec<StrokePoint>,
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-minted message id.
    pub id: String,
    pub user_id: String,
    /// Client-supplied display name, not validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    /// Server wall clock, milliseconds since the Unix epoch.
    pub ts: i64,
    /// Echoed back so the sender can drop its optimistic local copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

// =============================================================================
// CLIENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Web,
    Mobile,
}

impl Role {
    /// Role from the upgrade query string: `mobile` iff `role=mobile`.
    #[must_use]
    pub fn from_query(value: &str) -> Self {
        if value == "mobile" { Self::Mobile } else { Self::Web }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
        }
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Per-room live state: connected clients, the authoritative stroke map,
/// per-user undo/redo stacks, and the bounded chat tail. Strokes are
/// persisted by the debounced saver; everything else is volatile.
pub struct Room {
    pub room_id: String,
    /// Connected clients keyed by user id: the sending half of each
    /// client's bounded outbound queue. Overflow drops frames for that
    /// recipient so a stalled socket never freezes the room's writer.
    pub clients: HashMap<String, mpsc::Sender<Envelope>>,
    /// Authoritative whiteboard keyed by stroke id.
    pub strokes: HashMap<String, Stroke>,
    /// Per-user stacks of stroke ids eligible for undo.
    pub undo_stacks: HashMap<String, Vec<String>>,
    /// Per-user stacks of full strokes eligible for redo.
    pub redo_stacks: HashMap<String, Vec<Stroke>>,
    /// Bounded append-only chat tail.
    pub chat: VecDeque<ChatMessage>,
    /// Save generation; bumped per mutation so only the newest debounce
    /// timer writes.
    pub save_seq: u64,
}

impl Room {
    #[must_use]
    pub fn new(room_id: impl Into<String>, strokes: HashMap<String, Stroke>) -> Self {
        Self {
            room_id: room_id.into(),
            clients: HashMap::new(),
            strokes,
            undo_stacks: HashMap::new(),
            redo_stacks: HashMap::new(),
            chat: VecDeque::new(),
            save_seq: 0,
        }
    }
}

pub type SharedRoom = Arc<Mutex<Room>>;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or cheap.
#[derive(Clone)]
pub struct AppState {
    /// Live rooms keyed by room id. Lock order is always registry before
    /// room; a room lock is never held while taking this one.
    pub rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
    /// Process-wide pair-token table.
    pub pairing: PairRegistry,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            pairing: PairRegistry::new(),
            config,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
