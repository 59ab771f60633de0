//! WebSocket handler — per-client state machine and envelope dispatch.
//!
//! DESIGN
//! ======
//! On upgrade, the connection is assigned a fresh user id and greeted with
//! `hello`. A `select!` loop then interleaves two streams:
//! - Inbound frames from the socket: decode, resolve to a typed event,
//!   dispatch to the owning component.
//! - Outbound frames from the connection's bounded queue: write to the
//!   socket.
//!
//! Every frame bound for this client, including its own replies, goes
//! through the queue, so each recipient observes room events in commit
//! order. Frames that fail to decode, arrive out of context (no room yet,
//! wrong role), or name an absent relay target are dropped without a reply.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `hello{userId, role}`; state Accepted.
//! 2. `room.join` → register, `room.joined`, `rtc.peers`, peer-joined
//!    broadcast, `wb.snapshot`, `wb.history`, `chat.history`; state InRoom.
//!    A join while already in a room leaves the old room first.
//! 3. In-room frames dispatch by type to whiteboard/chat/pairing/signaling.
//! 4. Close → peer-left broadcast, room eviction if empty.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::{ChatSend, ClientEvent, Envelope, StrokeEvent};
use crate::ids;
use crate::services::whiteboard::{StrokeChange, UndoOutcome};
use crate::services::{chat, persistence, room, signaling, whiteboard};
use crate::state::{AppState, Role, Room, SharedRoom};

/// Per-connection outbound queue depth. Overflow drops frames for that
/// recipient; the protocol is loss-tolerant for fan-out traffic.
pub const SEND_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// CONNECTION STATE
// =============================================================================

/// Everything the dispatch layer knows about one connection.
pub(crate) struct Conn {
    pub user_id: String,
    pub role: Role,
    /// Sending half of this connection's outbound queue.
    pub tx: mpsc::Sender<Envelope>,
    /// Current room id, if joined.
    pub room_id: Option<String>,
    /// Handle to the current room, kept alongside the id to avoid a registry
    /// lookup per frame.
    pub room: Option<SharedRoom>,
    /// Web peer this mobile connection is bound to after a claim.
    pub paired_to: Option<String>,
}

impl Conn {
    fn new(user_id: String, role: Role, tx: mpsc::Sender<Envelope>) -> Self {
        Self { user_id, role, tx, room_id: None, room: None, paired_to: None }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

/// Fallback handler for every unrouted request: WebSocket upgrades are
/// accepted on any URL, anything else gets a plaintext `ok`.
pub async fn handle_any(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(upgrade) => {
            let role = params
                .get("role")
                .map_or(Role::Web, |value| Role::from_query(value));
            upgrade.on_upgrade(move |socket| run_ws(socket, state, role))
        }
        Err(_) => (StatusCode::OK, "ok").into_response(),
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, role: Role) {
    let user_id = ids::new_user_id();
    let (tx, mut rx) = mpsc::channel::<Envelope>(SEND_QUEUE_CAPACITY);
    let mut conn = Conn::new(user_id, role, tx);

    let hello = Envelope::event(
        "hello",
        json!({ "userId": conn.user_id, "role": conn.role.as_str() }),
    )
    .with_user_id(&conn.user_id);
    let _ = conn.tx.try_send(hello);

    info!(user_id = %conn.user_id, role = conn.role.as_str(), "client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(msg)) = inbound else { break };
                match msg {
                    Message::Text(text) => process_inbound_text(&state, &mut conn, &text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                let Some(env) = outbound else { break };
                if send_envelope(&mut socket, &env).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_current_room(&state, &mut conn).await;
    info!(user_id = %conn.user_id, "client disconnected");
}

async fn send_envelope(socket: &mut WebSocket, env: &Envelope) -> Result<(), ()> {
    let json = match serde_json::to_string(env) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, kind = %env.kind, "failed to serialize outbound frame");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode one inbound text frame and dispatch it. Kept free of socket
/// concerns so tests can drive the state machine directly.
pub(crate) async fn process_inbound_text(state: &AppState, conn: &mut Conn, text: &str) {
    let Some(env) = Envelope::decode(text) else {
        debug!(user_id = %conn.user_id, "dropping malformed frame");
        return;
    };
    let Some(event) = ClientEvent::decode(&env) else {
        debug!(user_id = %conn.user_id, kind = %env.kind, "dropping unroutable frame");
        return;
    };

    match event {
        ClientEvent::RoomJoin { room_id } => handle_join(state, conn, &env, room_id).await,
        ClientEvent::StrokeStart(ev) => handle_stroke_start(state, conn, &env, ev).await,
        ClientEvent::StrokeMove(ev) => handle_stroke_move(state, conn, &env, ev).await,
        ClientEvent::StrokeEnd(_) => handle_stroke_end(conn, &env).await,
        ClientEvent::Clear => handle_clear(state, conn, &env).await,
        ClientEvent::SnapshotRequest => handle_snapshot_request(conn, &env).await,
        ClientEvent::Undo => handle_undo(state, conn).await,
        ClientEvent::Redo => handle_redo(state, conn).await,
        ClientEvent::CursorMove => handle_cursor(conn, &env).await,
        ClientEvent::PairCreate => handle_pair_create(state, conn, &env).await,
        ClientEvent::PairClaim { pair_token } => {
            handle_pair_claim(state, conn, &env, &pair_token).await;
        }
        ClientEvent::Signal { to_user_id } => handle_signal(conn, &env, &to_user_id).await,
        ClientEvent::ChatSend(send) => handle_chat(conn, send).await,
        ClientEvent::ChatHistoryRequest => handle_chat_history(conn, &env).await,
    }
}

/// Queue a frame for this connection itself. Same overflow policy as any
/// other recipient.
fn self_send(conn: &Conn, env: Envelope) {
    let _ = conn.tx.try_send(env);
}

fn history_envelope(room: &Room, conn: &Conn) -> Envelope {
    let status = whiteboard::history(room, &conn.user_id);
    Envelope::event("wb.history", json!(status))
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id)
}

fn snapshot_envelope(room: &Room, conn: &Conn) -> Envelope {
    Envelope::event("wb.snapshot", json!({ "strokes": whiteboard::snapshot(room) }))
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id)
}

// =============================================================================
// ROOM MEMBERSHIP
// =============================================================================

async fn handle_join(state: &AppState, conn: &mut Conn, env: &Envelope, room_id: String) {
    // Moving rooms: leave the old one first, peer-left broadcast included.
    leave_current_room(state, conn).await;

    let shared = room::get_or_create(state, &room_id).await;
    {
        let mut room = shared.lock().await;
        room.clients.insert(conn.user_id.clone(), conn.tx.clone());
        info!(%room_id, user_id = %conn.user_id, clients = room.clients.len(), "client joined room");

        let joined = Envelope::event("room.joined", json!({ "ok": true }))
            .with_room_id(&room_id)
            .with_user_id(&conn.user_id)
            .with_request_id(env.request_id.clone());
        self_send(conn, joined);
        self_send(conn, signaling::peers_envelope(&room, &conn.user_id));
        room::broadcast(
            &room,
            &signaling::peer_joined(&room_id, &conn.user_id),
            Some(conn.user_id.as_str()),
        );
        self_send(conn, snapshot_envelope(&room, conn));
        self_send(conn, history_envelope(&room, conn));
        let chat_history = Envelope::event("chat.history", json!({ "messages": chat::history(&room) }))
            .with_room_id(&room_id)
            .with_user_id(&conn.user_id);
        self_send(conn, chat_history);
    }

    conn.room_id = Some(room_id);
    conn.room = Some(shared);
}

/// Depart the current room, if any: remove self, announce `rtc.peer.left`,
/// and evict the room when it empties. Used for both moves and disconnects.
async fn leave_current_room(state: &AppState, conn: &mut Conn) {
    let Some(room_id) = conn.room_id.take() else {
        return;
    };
    if let Some(shared) = conn.room.take() {
        let mut room = shared.lock().await;
        room.clients.remove(&conn.user_id);
        room::broadcast(&room, &signaling::peer_left(&room_id, &conn.user_id), None);
        info!(%room_id, user_id = %conn.user_id, remaining = room.clients.len(), "client left room");
    }
    room::drop_if_empty(state, &room_id).await;
}

// =============================================================================
// WHITEBOARD
// =============================================================================

async fn handle_stroke_start(state: &AppState, conn: &mut Conn, env: &Envelope, ev: StrokeEvent) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    let change = whiteboard::start_stroke(&mut room, &conn.user_id, ev);
    if change == StrokeChange::Ignored {
        return;
    }
    fan_out_stroke(&room, conn, env);
    if change == StrokeChange::Started {
        self_send(conn, history_envelope(&room, conn));
    }
    persistence::schedule_save(&state.config.data_dir, &shared, &mut room);
}

async fn handle_stroke_move(state: &AppState, conn: &mut Conn, env: &Envelope, ev: StrokeEvent) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    if whiteboard::apply_move(&mut room, ev) == StrokeChange::Ignored {
        return;
    }
    fan_out_stroke(&room, conn, env);
    persistence::schedule_save(&state.config.data_dir, &shared, &mut room);
}

/// Stroke-end is advisory: no state change, no save, fan-out only. Later
/// moves for the same stroke are still accepted.
async fn handle_stroke_end(conn: &mut Conn, env: &Envelope) {
    let Some(shared) = conn.room.clone() else { return };
    let room = shared.lock().await;
    fan_out_stroke(&room, conn, env);
}

/// Re-emit a stroke event to the whole room, payload unchanged, sender
/// stamped as the acting user.
fn fan_out_stroke(room: &Room, conn: &Conn, env: &Envelope) {
    let fan = Envelope::event(env.kind.clone(), env.payload.clone())
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id);
    room::broadcast(room, &fan, None);
}

async fn handle_clear(state: &AppState, conn: &mut Conn, env: &Envelope) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    whiteboard::clear(&mut room);
    let fan = Envelope::event("wb.clear", env.payload.clone())
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id);
    room::broadcast(&room, &fan, None);
    self_send(conn, history_envelope(&room, conn));
    persistence::schedule_save(&state.config.data_dir, &shared, &mut room);
}

async fn handle_snapshot_request(conn: &mut Conn, env: &Envelope) {
    let Some(shared) = conn.room.clone() else { return };
    let room = shared.lock().await;
    let snapshot = snapshot_envelope(&room, conn).with_request_id(env.request_id.clone());
    self_send(conn, snapshot);
}

async fn handle_undo(state: &AppState, conn: &mut Conn) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    match whiteboard::undo(&mut room, &conn.user_id) {
        UndoOutcome::Removed(stroke_id) => {
            let fan = Envelope::event("wb.stroke.remove", json!({ "strokeId": stroke_id }))
                .with_room_id(&room.room_id)
                .with_user_id(&conn.user_id);
            room::broadcast(&room, &fan, None);
            self_send(conn, history_envelope(&room, conn));
            persistence::schedule_save(&state.config.data_dir, &shared, &mut room);
        }
        UndoOutcome::Noop { stack_changed: true } => {
            // Stale entries were discarded; the caller's stack shrank.
            self_send(conn, history_envelope(&room, conn));
        }
        UndoOutcome::Noop { stack_changed: false } => {}
    }
}

async fn handle_redo(state: &AppState, conn: &mut Conn) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    let Some(stroke) = whiteboard::redo(&mut room, &conn.user_id) else {
        return;
    };
    let fan = Envelope::event("wb.stroke.restore", json!({ "stroke": stroke }))
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id);
    room::broadcast(&room, &fan, None);
    self_send(conn, history_envelope(&room, conn));
    persistence::schedule_save(&state.config.data_dir, &shared, &mut room);
}

// =============================================================================
// CURSOR
// =============================================================================

async fn handle_cursor(conn: &mut Conn, env: &Envelope) {
    let Some(shared) = conn.room.clone() else { return };
    let room = shared.lock().await;
    let fan = Envelope::event("cursor.move", env.payload.clone())
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id);
    room::broadcast(&room, &fan, Some(conn.user_id.as_str()));
}

// =============================================================================
// PAIRING
// =============================================================================

async fn handle_pair_create(state: &AppState, conn: &mut Conn, env: &Envelope) {
    let Some(room_id) = conn.room_id.clone() else { return };
    if conn.role != Role::Web {
        debug!(user_id = %conn.user_id, "pair.create from non-web role dropped");
        return;
    }

    let token = state.pairing.create(&room_id, &conn.user_id);
    info!(%room_id, user_id = %conn.user_id, "pair token created");
    let created = Envelope::event(
        "pair.created",
        json!({ "pairToken": token.token, "expiresAt": token.expires_at }),
    )
    .with_room_id(&room_id)
    .with_user_id(&conn.user_id)
    .with_request_id(env.request_id.clone());
    self_send(conn, created);
}

async fn handle_pair_claim(state: &AppState, conn: &mut Conn, env: &Envelope, pair_token: &str) {
    let Some(shared) = conn.room.clone() else { return };
    let Some(room_id) = conn.room_id.clone() else { return };
    if conn.role != Role::Mobile {
        debug!(user_id = %conn.user_id, "pair.claim from non-mobile role dropped");
        return;
    }

    match state.pairing.claim(pair_token, &room_id) {
        Ok(token) => {
            conn.paired_to = Some(token.web_user_id.clone());
            info!(%room_id, mobile = %conn.user_id, web = %token.web_user_id, "pair claimed");

            let success = Envelope::event(
                "pair.success",
                json!({ "mobileUserId": conn.user_id, "webUserId": token.web_user_id }),
            )
            .with_room_id(&room_id)
            .with_user_id(&conn.user_id);
            self_send(conn, success.clone().with_request_id(env.request_id.clone()));

            // Notify the originating web client, if it is still connected.
            let room = shared.lock().await;
            room::unicast(&room, &token.web_user_id, success);
        }
        Err(e) => {
            let error = Envelope::event("pair.error", json!({ "message": e.to_string() }))
                .with_room_id(&room_id)
                .with_user_id(&conn.user_id)
                .with_request_id(env.request_id.clone());
            self_send(conn, error);
        }
    }
}

// =============================================================================
// SIGNALING
// =============================================================================

async fn handle_signal(conn: &mut Conn, env: &Envelope, to_user_id: &str) {
    let Some(shared) = conn.room.clone() else { return };
    let room = shared.lock().await;
    if !signaling::relay(&room, &conn.user_id, env, to_user_id) {
        debug!(kind = %env.kind, to = %to_user_id, "relay target absent; dropping");
    }
}

// =============================================================================
// CHAT
// =============================================================================

async fn handle_chat(conn: &mut Conn, send: ChatSend) {
    let Some(shared) = conn.room.clone() else { return };
    let mut room = shared.lock().await;

    let Some(msg) = chat::append(&mut room, &conn.user_id, send) else {
        return;
    };
    let fan = Envelope::event("chat.message", json!(msg))
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id);
    room::broadcast(&room, &fan, None);
}

async fn handle_chat_history(conn: &mut Conn, env: &Envelope) {
    let Some(shared) = conn.room.clone() else { return };
    let room = shared.lock().await;
    let history = Envelope::event("chat.history", json!({ "messages": chat::history(&room) }))
        .with_room_id(&room.room_id)
        .with_user_id(&conn.user_id)
        .with_request_id(env.request_id.clone());
    self_send(conn, history);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
