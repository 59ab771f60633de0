//! Signaling relay — opaque WebRTC plumbing between named peers.
//!
//! DESIGN
//! ======
//! The server forwards `rtc.offer` / `rtc.answer` / `rtc.ice` bodies
//! verbatim; it never parses SDP or candidates, because evolving WebRTC
//! extensions depend on forward compatibility. Routing uses only the
//! `toUserId` field, resolved within the sender's room. A missing target is
//! a silent drop: transient peer disconnects are normal.
//!
//! Membership notifications (`rtc.peers`, `rtc.peer.joined`,
//! `rtc.peer.left`) are built here and emitted by the connection handler;
//! clients use them to bootstrap peer connections.

use serde_json::json;

use crate::envelope::Envelope;
use crate::state::Room;

/// Forward a signaling envelope to the named peer in the sender's room,
/// payload untouched, sender stamped. Returns false when the target is not
/// connected to this room.
pub fn relay(room: &Room, from_user_id: &str, env: &Envelope, to_user_id: &str) -> bool {
    let Some(target) = room.clients.get(to_user_id) else {
        return false;
    };
    let forwarded = Envelope::event(env.kind.clone(), env.payload.clone())
        .with_room_id(&room.room_id)
        .with_user_id(from_user_id);
    let _ = target.try_send(forwarded);
    true
}

/// `rtc.peers` for a joiner: every connected user except the joiner itself.
#[must_use]
pub fn peers_envelope(room: &Room, joiner_id: &str) -> Envelope {
    let peers: Vec<&String> = room.clients.keys().filter(|id| id.as_str() != joiner_id).collect();
    Envelope::event("rtc.peers", json!({ "peers": peers }))
        .with_room_id(&room.room_id)
        .with_user_id(joiner_id)
}

/// `rtc.peer.joined` announcement for the rest of the room.
#[must_use]
pub fn peer_joined(room_id: &str, user_id: &str) -> Envelope {
    Envelope::event("rtc.peer.joined", json!({ "userId": user_id }))
        .with_room_id(room_id)
        .with_user_id(user_id)
}

/// `rtc.peer.left` announcement for a departed user's old room.
#[must_use]
pub fn peer_left(room_id: &str, user_id: &str) -> Envelope {
    Envelope::event("rtc.peer.left", json!({ "userId": user_id }))
        .with_room_id(room_id)
        .with_user_id(user_id)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "signaling_test.rs"]
mod tests;
