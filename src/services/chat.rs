//! Chat — bounded append-only message tail per room.
//!
//! Chat is intentionally volatile: the tail lives with the room and dies
//! with it. History requests serve at most the last [`CHAT_HISTORY_LIMIT`]
//! messages out of a buffer capped at [`CHAT_BUFFER_CAP`].

use uuid::Uuid;

use crate::envelope::{ChatSend, now_ms};
use crate::state::{ChatMessage, Room};

/// Buffer cap; the oldest messages are dropped beyond this.
pub const CHAT_BUFFER_CAP: usize = 200;

/// Upper bound on messages served by a history request.
pub const CHAT_HISTORY_LIMIT: usize = 100;

/// Append a message to the room's tail. The text is trimmed; an empty
/// result drops the message entirely. Returns the minted message for
/// fan-out.
pub fn append(room: &mut Room, user_id: &str, send: ChatSend) -> Option<ChatMessage> {
    let text = send.text.trim();
    if text.is_empty() {
        return None;
    }

    let msg = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: send.name,
        text: text.to_string(),
        ts: now_ms(),
        client_id: send.client_id,
    };
    room.chat.push_back(msg.clone());
    while room.chat.len() > CHAT_BUFFER_CAP {
        room.chat.pop_front();
    }
    Some(msg)
}

/// The newest messages, oldest first, at most [`CHAT_HISTORY_LIMIT`].
#[must_use]
pub fn history(room: &Room) -> Vec<ChatMessage> {
    let skip = room.chat.len().saturating_sub(CHAT_HISTORY_LIMIT);
    room.chat.iter().skip(skip).cloned().collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
