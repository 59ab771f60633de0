//! Whiteboard engine — stroke map and per-user undo/redo.
//!
//! DESIGN
//! ======
//! Handler functions are pure state transitions against a locked [`Room`];
//! the dispatch layer owns all outbound concerns (fan-out, history unicasts,
//! save scheduling). Undo is strictly personal: a user's stack only ever
//! removes strokes that user authored, and stale entries are discarded on
//! the way down rather than eagerly pruned.
//!
//! OWNERSHIP RULES
//! ===============
//! - A stroke's author is fixed at first sighting and never rewritten, even
//!   when another user appends points to it.
//! - Any stroke start invalidates the author's redo stack.
//! - Clear wipes strokes and every user's stacks; it is not undoable.

use serde::Serialize;

use crate::envelope::StrokeEvent;
use crate::state::{Room, Stroke};

// =============================================================================
// RESULTS
// =============================================================================

/// What a stroke-start or stroke-move did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeChange {
    /// A new stroke was created; the author's history changed.
    Started,
    /// Points were appended to an existing stroke.
    Appended,
    /// The stroke id is unknown; nothing was mutated.
    Ignored,
}

/// Outcome of an undo attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The named stroke was removed and parked on the redo stack.
    Removed(String),
    /// Nothing was removed. `stack_changed` is true when stale entries were
    /// discarded while searching.
    Noop { stack_changed: bool },
}

/// Unicast to the acting user after any change to their own stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

// =============================================================================
// STROKE EVENTS
// =============================================================================

/// Handle a stroke-start. A start naming an already-known stroke id is
/// treated as a move; otherwise the stroke is created with the caller as its
/// author, the caller's undo stack grows, and their redo stack is emptied.
pub fn start_stroke(room: &mut Room, user_id: &str, ev: StrokeEvent) -> StrokeChange {
    if room.strokes.contains_key(&ev.stroke_id) {
        return apply_move(room, ev);
    }

    let stroke = Stroke {
        stroke_id: ev.stroke_id.clone(),
        user_id: user_id.to_string(),
        style: ev.style.unwrap_or_default(),
        points: ev.points,
    };
    room.strokes.insert(ev.stroke_id.clone(), stroke);
    room.undo_stacks.entry(user_id.to_string()).or_default().push(ev.stroke_id);
    room.redo_stacks.entry(user_id.to_string()).or_default().clear();
    StrokeChange::Started
}

/// Append points to an existing stroke, replacing its style when the event
/// carries one. The stored author is left untouched regardless of who sent
/// the event. Unknown stroke ids mutate nothing.
pub fn apply_move(room: &mut Room, ev: StrokeEvent) -> StrokeChange {
    let Some(stroke) = room.strokes.get_mut(&ev.stroke_id) else {
        return StrokeChange::Ignored;
    };
    stroke.points.extend(ev.points);
    if let Some(style) = ev.style {
        stroke.style = style;
    }
    StrokeChange::Appended
}

/// Wipe the whiteboard: all strokes and every user's undo/redo stacks.
pub fn clear(room: &mut Room) {
    room.strokes.clear();
    room.undo_stacks.clear();
    room.redo_stacks.clear();
}

/// Current stroke set, in map-iteration order. The order carries no causal
/// meaning; clients render unordered.
#[must_use]
pub fn snapshot(room: &Room) -> Vec<Stroke> {
    room.strokes.values().cloned().collect()
}

// =============================================================================
// UNDO / REDO
// =============================================================================

/// Pop the caller's undo stack until an entry matches a stroke that still
/// exists and is owned by the caller. Entries that fail either test are
/// discarded. On a match the stroke moves to the caller's redo stack.
pub fn undo(room: &mut Room, user_id: &str) -> UndoOutcome {
    let Room { strokes, undo_stacks, redo_stacks, .. } = room;
    let Some(stack) = undo_stacks.get_mut(user_id) else {
        return UndoOutcome::Noop { stack_changed: false };
    };

    let mut discarded = false;
    while let Some(stroke_id) = stack.pop() {
        let owned = strokes.get(&stroke_id).is_some_and(|s| s.user_id == user_id);
        if !owned {
            // Stale: the stroke was cleared, or its id was recycled by
            // another author after this user undid theirs.
            discarded = true;
            continue;
        }
        let Some(stroke) = strokes.remove(&stroke_id) else {
            discarded = true;
            continue;
        };
        redo_stacks.entry(user_id.to_string()).or_default().push(stroke);
        return UndoOutcome::Removed(stroke_id);
    }
    UndoOutcome::Noop { stack_changed: discarded }
}

/// Reinstate the most recently undone stroke, exactly as it was removed.
/// Returns the restored stroke for fan-out, or `None` when there is nothing
/// to redo.
pub fn redo(room: &mut Room, user_id: &str) -> Option<Stroke> {
    let stroke = room.redo_stacks.get_mut(user_id)?.pop()?;
    room.strokes.insert(stroke.stroke_id.clone(), stroke.clone());
    room.undo_stacks
        .entry(user_id.to_string())
        .or_default()
        .push(stroke.stroke_id.clone());
    Some(stroke)
}

/// Stack depths for one user.
#[must_use]
pub fn history(room: &Room, user_id: &str) -> HistoryStatus {
    let undo_count = room.undo_stacks.get(user_id).map_or(0, Vec::len);
    let redo_count = room.redo_stacks.get(user_id).map_or(0, Vec::len);
    HistoryStatus {
        can_undo: undo_count > 0,
        can_redo: redo_count > 0,
        undo_count,
        redo_count,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "whiteboard_test.rs"]
mod tests;
