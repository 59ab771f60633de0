use super::*;
use serde_json::json;

use crate::state::test_helpers;

// =============================================================================
// registry
// =============================================================================

#[tokio::test]
async fn get_or_create_returns_the_same_room() {
    let (state, _guard) = test_helpers::test_app_state();
    let first = get_or_create(&state, "r1").await;
    let second = get_or_create(&state, "r1").await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(live_count(&state).await, 1);
}

#[tokio::test]
async fn get_or_create_hydrates_strokes_from_disk() {
    let (state, _guard) = test_helpers::test_app_state();
    persistence::save_room(
        &state.config.data_dir,
        "r1",
        vec![test_helpers::dummy_stroke("s1", "u1")],
    )
    .expect("seed snapshot");

    let shared = get_or_create(&state, "r1").await;
    let room = shared.lock().await;
    assert!(room.strokes.contains_key("s1"));
    // Only strokes survive restarts.
    assert!(room.undo_stacks.is_empty());
    assert!(room.redo_stacks.is_empty());
    assert!(room.chat.is_empty());
}

#[tokio::test]
async fn drop_if_empty_flushes_and_evicts() {
    let (state, _guard) = test_helpers::test_app_state();
    let shared = get_or_create(&state, "r1").await;
    {
        let mut room = shared.lock().await;
        room.strokes.insert("s1".into(), test_helpers::dummy_stroke("s1", "u1"));
    }

    drop_if_empty(&state, "r1").await;
    assert_eq!(live_count(&state).await, 0);
    let loaded = persistence::load_room_strokes(&state.config.data_dir, "r1");
    assert!(loaded.contains_key("s1"), "strokes must be flushed before eviction");
}

#[tokio::test]
async fn drop_if_empty_keeps_occupied_rooms() {
    let (state, _guard) = test_helpers::test_app_state();
    let shared = get_or_create(&state, "r1").await;
    {
        let mut room = shared.lock().await;
        let _rx = test_helpers::register_client(&mut room, "u1");
    }
    drop_if_empty(&state, "r1").await;
    assert_eq!(live_count(&state).await, 1);
}

#[tokio::test]
async fn eviction_leaves_disk_state_for_the_next_incarnation() {
    let (state, _guard) = test_helpers::test_app_state();
    let shared = get_or_create(&state, "r1").await;
    {
        let mut room = shared.lock().await;
        room.strokes.insert("s1".into(), test_helpers::dummy_stroke("s1", "u1"));
    }
    drop_if_empty(&state, "r1").await;

    let revived = get_or_create(&state, "r1").await;
    let room = revived.lock().await;
    assert!(room.strokes.contains_key("s1"));
}

// =============================================================================
// delivery
// =============================================================================

#[test]
fn broadcast_reaches_everyone_except_the_excluded() {
    let mut room = Room::new("r1", std::collections::HashMap::new());
    let mut rx_a = test_helpers::register_client(&mut room, "a");
    let mut rx_b = test_helpers::register_client(&mut room, "b");
    let mut rx_c = test_helpers::register_client(&mut room, "c");

    let env = Envelope::event("wb.clear", json!({})).with_room_id("r1");
    broadcast(&room, &env, Some("b"));

    assert_eq!(rx_a.try_recv().expect("a should receive").kind, "wb.clear");
    assert_eq!(rx_c.try_recv().expect("c should receive").kind, "wb.clear");
    assert!(rx_b.try_recv().is_err(), "excluded client must receive nothing");
}

#[test]
fn broadcast_without_exclusion_includes_everyone() {
    let mut room = Room::new("r1", std::collections::HashMap::new());
    let mut rx_a = test_helpers::register_client(&mut room, "a");
    let mut rx_b = test_helpers::register_client(&mut room, "b");

    broadcast(&room, &Envelope::event("chat.message", json!({"text": "hi"})), None);
    assert!(rx_a.try_recv().is_ok());
    assert!(rx_b.try_recv().is_ok());
}

#[test]
fn unicast_reports_missing_targets() {
    let mut room = Room::new("r1", std::collections::HashMap::new());
    let mut rx = test_helpers::register_client(&mut room, "a");

    assert!(unicast(&room, "a", Envelope::event("pair.success", json!({}))));
    assert!(rx.try_recv().is_ok());
    assert!(!unicast(&room, "ghost", Envelope::event("pair.success", json!({}))));
}
