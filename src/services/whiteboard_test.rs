use super::*;
use std::collections::HashMap;

use crate::envelope::StrokeEvent;
use crate::state::{Room, StrokePoint, StrokeStyle, StrokeTool};

fn empty_room() -> Room {
    Room::new("r1", HashMap::new())
}

fn pt(x: f64, y: f64) -> StrokePoint {
    StrokePoint { x, y, t: 1.0 }
}

fn ev(stroke_id: &str, points: Vec<StrokePoint>) -> StrokeEvent {
    StrokeEvent {
        stroke_id: stroke_id.to_string(),
        style: Some(StrokeStyle::default()),
        points,
    }
}

// =============================================================================
// stroke start / move
// =============================================================================

#[test]
fn start_creates_stroke_with_caller_as_author() {
    let mut room = empty_room();
    let change = start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));

    assert_eq!(change, StrokeChange::Started);
    let stroke = room.strokes.get("s1").expect("stroke should exist");
    assert_eq!(stroke.user_id, "u1");
    assert_eq!(stroke.points.len(), 1);
    assert_eq!(room.undo_stacks.get("u1").map(Vec::len), Some(1));
}

#[test]
fn start_without_style_uses_default() {
    let mut room = empty_room();
    let event = StrokeEvent { stroke_id: "s1".into(), style: None, points: vec![] };
    start_stroke(&mut room, "u1", event);
    assert_eq!(room.strokes["s1"].style, StrokeStyle::default());
}

#[test]
fn start_empties_redo_stack() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    assert!(matches!(undo(&mut room, "u1"), UndoOutcome::Removed(_)));
    assert_eq!(room.redo_stacks["u1"].len(), 1);

    // Any new stroke invalidates the pending redo.
    start_stroke(&mut room, "u1", ev("s2", vec![pt(0.2, 0.2)]));
    assert!(room.redo_stacks["u1"].is_empty());
}

#[test]
fn start_on_known_id_appends_instead() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));

    let change = start_stroke(&mut room, "u1", ev("s1", vec![pt(0.2, 0.2)]));
    assert_eq!(change, StrokeChange::Appended);
    assert_eq!(room.strokes["s1"].points.len(), 2);
    // Deduped starts grow no history.
    assert_eq!(room.undo_stacks["u1"].len(), 1);
}

#[test]
fn move_appends_points_and_replaces_style() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));

    let restyled = StrokeEvent {
        stroke_id: "s1".into(),
        style: Some(StrokeStyle {
            tool: StrokeTool::Highlighter,
            color: "#ff0000".into(),
            width: 0.01,
            opacity: 0.5,
        }),
        points: vec![pt(0.2, 0.2), pt(0.3, 0.3)],
    };
    assert_eq!(apply_move(&mut room, restyled), StrokeChange::Appended);

    let stroke = &room.strokes["s1"];
    assert_eq!(stroke.points.len(), 3);
    assert_eq!(stroke.style.tool, StrokeTool::Highlighter);
}

#[test]
fn move_without_style_keeps_existing() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    apply_move(
        &mut room,
        StrokeEvent { stroke_id: "s1".into(), style: None, points: vec![pt(0.2, 0.2)] },
    );
    assert_eq!(room.strokes["s1"].style, StrokeStyle::default());
}

#[test]
fn move_unknown_id_is_ignored() {
    let mut room = empty_room();
    assert_eq!(apply_move(&mut room, ev("ghost", vec![pt(0.1, 0.1)])), StrokeChange::Ignored);
    assert!(room.strokes.is_empty());
}

#[test]
fn cross_user_move_keeps_original_author() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));

    apply_move(&mut room, ev("s1", vec![pt(0.9, 0.9)]));
    start_stroke(&mut room, "u2", ev("s1", vec![pt(0.5, 0.5)]));

    let stroke = &room.strokes["s1"];
    assert_eq!(stroke.user_id, "u1");
    assert_eq!(stroke.points.len(), 3);
    // u2 gained no history over a stroke it does not own.
    assert!(room.undo_stacks.get("u2").is_none_or(Vec::is_empty));
}

// =============================================================================
// undo
// =============================================================================

#[test]
fn undo_removes_own_latest_stroke() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    start_stroke(&mut room, "u1", ev("s2", vec![pt(0.2, 0.2)]));

    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Removed("s2".into()));
    assert!(!room.strokes.contains_key("s2"));
    assert!(room.strokes.contains_key("s1"));
    assert_eq!(room.redo_stacks["u1"].len(), 1);
    assert_eq!(room.redo_stacks["u1"][0].stroke_id, "s2");
}

#[test]
fn undo_discards_stale_entries_until_match() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("mine", vec![pt(0.1, 0.1)]));
    start_stroke(&mut room, "u2", ev("foreign", vec![pt(0.2, 0.2)]));

    // Corrupt u1's stack: a vanished stroke and another user's stroke sit on
    // top of a legitimate entry.
    room.undo_stacks.insert(
        "u1".into(),
        vec!["mine".into(), "foreign".into(), "gone".into()],
    );

    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Removed("mine".into()));
    assert!(room.strokes.contains_key("foreign"), "foreign stroke must survive");
    assert!(room.undo_stacks["u1"].is_empty());
}

#[test]
fn undo_never_removes_foreign_strokes() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));

    room.undo_stacks.insert("u2".into(), vec!["s1".into()]);
    assert_eq!(undo(&mut room, "u2"), UndoOutcome::Noop { stack_changed: true });
    assert!(room.strokes.contains_key("s1"));
}

#[test]
fn undo_on_empty_stack_is_silent_noop() {
    let mut room = empty_room();
    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Noop { stack_changed: false });
}

// =============================================================================
// redo
// =============================================================================

#[test]
fn redo_restores_the_exact_stroke() {
    let mut room = empty_room();
    let original = StrokeEvent {
        stroke_id: "s1".into(),
        style: Some(StrokeStyle {
            tool: StrokeTool::Eraser,
            color: "#123456".into(),
            width: 0.02,
            opacity: 0.8,
        }),
        points: vec![pt(0.1, 0.1), pt(0.2, 0.2)],
    };
    start_stroke(&mut room, "u1", original);
    let before = room.strokes["s1"].clone();

    assert!(matches!(undo(&mut room, "u1"), UndoOutcome::Removed(_)));
    let restored = redo(&mut room, "u1").expect("redo should restore");

    assert_eq!(restored, before);
    assert_eq!(room.strokes["s1"], before);
    assert_eq!(room.undo_stacks["u1"], vec!["s1".to_string()]);
    assert!(room.redo_stacks["u1"].is_empty());
}

#[test]
fn redo_with_nothing_undone_is_none() {
    let mut room = empty_room();
    assert!(redo(&mut room, "u1").is_none());
}

#[test]
fn undo_undo_redo_sequence() {
    let mut room = empty_room();
    for id in ["s1", "s2", "s3"] {
        start_stroke(&mut room, "u1", ev(id, vec![pt(0.1, 0.1)]));
    }

    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Removed("s3".into()));
    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Removed("s2".into()));
    assert_eq!(redo(&mut room, "u1").map(|s| s.stroke_id), Some("s2".to_string()));

    let mut ids: Vec<&str> = room.strokes.keys().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["s1", "s2"]);
    assert_eq!(room.undo_stacks["u1"], vec!["s1".to_string(), "s2".to_string()]);
    assert_eq!(room.redo_stacks["u1"].len(), 1);

    // A fresh stroke empties the remaining redo entry.
    start_stroke(&mut room, "u1", ev("s4", vec![pt(0.4, 0.4)]));
    assert!(room.redo_stacks["u1"].is_empty());
}

// =============================================================================
// clear / snapshot / history
// =============================================================================

#[test]
fn clear_wipes_strokes_and_every_stack() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    start_stroke(&mut room, "u2", ev("s2", vec![pt(0.2, 0.2)]));
    assert!(matches!(undo(&mut room, "u2"), UndoOutcome::Removed(_)));

    clear(&mut room);
    assert!(room.strokes.is_empty());
    assert!(room.undo_stacks.is_empty());
    assert!(room.redo_stacks.is_empty());
}

#[test]
fn clear_is_idempotent() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    clear(&mut room);
    clear(&mut room);
    assert!(room.strokes.is_empty());
    assert!(room.undo_stacks.is_empty());
    assert!(room.redo_stacks.is_empty());
}

#[test]
fn cleared_strokes_are_not_undoable() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    clear(&mut room);
    assert_eq!(undo(&mut room, "u1"), UndoOutcome::Noop { stack_changed: false });
}

#[test]
fn snapshot_matches_stroke_set() {
    let mut room = empty_room();
    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    start_stroke(&mut room, "u1", ev("s2", vec![pt(0.2, 0.2)]));
    assert!(matches!(undo(&mut room, "u1"), UndoOutcome::Removed(_)));

    let mut ids: Vec<String> = snapshot(&room).into_iter().map(|s| s.stroke_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["s1"]);
}

#[test]
fn history_reports_stack_depths() {
    let mut room = empty_room();
    assert_eq!(
        history(&room, "u1"),
        HistoryStatus { can_undo: false, can_redo: false, undo_count: 0, redo_count: 0 }
    );

    start_stroke(&mut room, "u1", ev("s1", vec![pt(0.1, 0.1)]));
    start_stroke(&mut room, "u1", ev("s2", vec![pt(0.2, 0.2)]));
    assert!(matches!(undo(&mut room, "u1"), UndoOutcome::Removed(_)));

    assert_eq!(
        history(&room, "u1"),
        HistoryStatus { can_undo: true, can_redo: true, undo_count: 1, redo_count: 1 }
    );
}
