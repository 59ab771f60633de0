//! Envelope — the uniform wire wrapper for every message.
//!
//! ARCHITECTURE
//! ============
//! Clients and server exchange JSON envelopes over WebSocket. Each frame
//! carries a protocol version, a dotted `type` string ("wb.stroke.start",
//! "pair.claim", ...), optional addressing fields, and an arbitrary payload.
//! Inbound frames that fail to parse, carry the wrong version, or name an
//! unknown type are dropped without a reply: there is no per-message NACK,
//! and silence gives misbehaving clients no probe oracle.
//!
//! DESIGN
//! ======
//! - Inbound `userId` is advisory only; every outbound frame is stamped with
//!   the server's own assignment for the acting user.
//! - Dispatch is typed: [`ClientEvent::decode`] maps the `type` string to a
//!   sum type with serde-decoded payloads. Signaling and cursor payloads stay
//!   opaque; only the routing field is extracted.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::state::{StrokePoint, StrokeStyle};

/// Protocol version carried in the `v` field. Frames with any other value
/// are dropped.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// ENVELOPE
// =============================================================================

/// The uniform message wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version. Always [`PROTOCOL_VERSION`] on outbound frames.
    pub v: u32,
    /// Dotted message type, e.g. `"wb.stroke.start"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Client-chosen correlation id, echoed on direct replies.
    #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Room this frame concerns, when applicable.
    #[serde(default, rename = "roomId", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Acting user. Advisory on inbound frames; authoritative on outbound.
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Envelope {
    /// Create an outbound frame. The only constructor; addressing is added
    /// with the `with_*` builders.
    pub fn event(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            kind: kind.into(),
            request_id: None,
            room_id: None,
            user_id: None,
            payload,
        }
    }

    /// Parse one inbound text frame. Unparseable JSON, a non-object body,
    /// a missing or empty `type`, or a version other than
    /// [`PROTOCOL_VERSION`] all yield `None`.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        let env: Self = serde_json::from_str(text).ok()?;
        if env.v != PROTOCOL_VERSION || env.kind.is_empty() {
            return None;
        }
        Some(env)
    }

    /// Set the `roomId` field on this frame.
    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Stamp the acting user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Echo a correlation id taken from the request being answered.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

// =============================================================================
// TYPED PAYLOADS
// =============================================================================

/// Payload shared by `wb.stroke.start`, `.move`, and `.end`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeEvent {
    pub stroke_id: String,
    #[serde(default)]
    pub style: Option<StrokeStyle>,
    #[serde(default)]
    pub points: Vec<StrokePoint>,
}

/// Payload of an inbound `chat.message`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Echoed back verbatim so the sender can reconcile its optimistic echo.
    #[serde(default)]
    pub client_id: Option<String>,
}

// =============================================================================
// DISPATCH
// =============================================================================

/// An inbound envelope resolved to a routable operation.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    RoomJoin { room_id: String },
    StrokeStart(StrokeEvent),
    StrokeMove(StrokeEvent),
    StrokeEnd(StrokeEvent),
    Clear,
    SnapshotRequest,
    Undo,
    Redo,
    /// Opaque cursor broadcast; the payload is forwarded untouched.
    CursorMove,
    PairCreate,
    PairClaim { pair_token: String },
    /// One of `rtc.offer` / `rtc.answer` / `rtc.ice`. The body stays opaque;
    /// only the routing target is extracted.
    Signal { to_user_id: String },
    ChatSend(ChatSend),
    ChatHistoryRequest,
}

impl ClientEvent {
    /// Resolve an envelope's `type` to a typed event, decoding its payload.
    /// Unknown types and payloads that fail to decode yield `None`; callers
    /// drop those frames silently.
    #[must_use]
    pub fn decode(env: &Envelope) -> Option<Self> {
        match env.kind.as_str() {
            "room.join" => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct JoinPayload {
                    #[serde(default)]
                    room_id: Option<String>,
                }
                let p: JoinPayload = serde_json::from_value(env.payload.clone()).ok()?;
                // The room may ride in the payload or on the envelope itself.
                let room_id = p.room_id.or_else(|| env.room_id.clone())?;
                if room_id.is_empty() {
                    return None;
                }
                Some(Self::RoomJoin { room_id })
            }
            "wb.stroke.start" => Some(Self::StrokeStart(decode_payload(env)?)),
            "wb.stroke.move" => Some(Self::StrokeMove(decode_payload(env)?)),
            "wb.stroke.end" => Some(Self::StrokeEnd(decode_payload(env)?)),
            "wb.clear" => Some(Self::Clear),
            "wb.snapshot.request" => Some(Self::SnapshotRequest),
            "wb.undo" => Some(Self::Undo),
            "wb.redo" => Some(Self::Redo),
            "cursor.move" => Some(Self::CursorMove),
            "pair.create" => Some(Self::PairCreate),
            "pair.claim" => {
                let pair_token = env
                    .payload
                    .get("pairToken")
                    .and_then(|v| v.as_str())
                    .filter(|t| !t.is_empty())?
                    .to_string();
                Some(Self::PairClaim { pair_token })
            }
            "rtc.offer" | "rtc.answer" | "rtc.ice" => {
                let to_user_id = env
                    .payload
                    .get("toUserId")
                    .and_then(|v| v.as_str())
                    .filter(|t| !t.is_empty())?
                    .to_string();
                Some(Self::Signal { to_user_id })
            }
            "chat.message" => Some(Self::ChatSend(decode_payload(env)?)),
            "chat.history.request" => Some(Self::ChatHistoryRequest),
            _ => None,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(env: &Envelope) -> Option<T> {
    serde_json::from_value(env.payload.clone()).ok()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
