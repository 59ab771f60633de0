//! Pairing — short-lived tokens binding a mobile client to a web client.
//!
//! DESIGN
//! ======
//! A web client in a room mints a token; a mobile client in the same room
//! claims it exactly once. Tokens carry absolute expiry deadlines and live
//! in a process-wide table swept by a periodic reaper. Claims are validated
//! against the deadline as well, so an expired token is dead even before
//! the reaper gets to it.
//!
//! TRADE-OFFS
//! ==========
//! Consumption is destructive to guarantee single use; a lost `pair.success`
//! means re-creating a token rather than replaying the old one. A room
//! mismatch does not consume: the token stays claimable from the right room.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::envelope::now_ms;
use crate::ids::new_pair_token;

/// Token lifetime from mint to deadline.
pub const PAIR_TOKEN_TTL_MS: i64 = 120_000;

/// Sweep cadence for expired tokens.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// TYPES
// =============================================================================

/// An outstanding pairing capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairToken {
    pub token: String,
    /// Room the token was minted in; claims from other rooms are refused.
    pub room_id: String,
    /// The web client a successful claim binds to.
    pub web_user_id: String,
    /// Absolute deadline, milliseconds since the Unix epoch.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PairClaimError {
    #[error("Invalid or expired token")]
    UnknownToken,
    #[error("Token is for a different room")]
    RoomMismatch,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Process-wide pair-token table.
#[derive(Clone)]
pub struct PairRegistry {
    inner: Arc<Mutex<HashMap<String, PairToken>>>,
}

impl PairRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Mint a token for a web client in a room. Repeated creates coexist;
    /// earlier tokens stay valid until their own deadlines.
    pub fn create(&self, room_id: &str, web_user_id: &str) -> PairToken {
        self.create_at(room_id, web_user_id, now_ms())
    }

    fn create_at(&self, room_id: &str, web_user_id: &str, now: i64) -> PairToken {
        let token = PairToken {
            token: new_pair_token(),
            room_id: room_id.to_string(),
            web_user_id: web_user_id.to_string(),
            expires_at: now + PAIR_TOKEN_TTL_MS,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.insert(token.token.clone(), token.clone());
        token
    }

    /// Claim a token from within `room_id`. Success consumes the token.
    ///
    /// # Errors
    ///
    /// [`PairClaimError::UnknownToken`] when the token is absent or past its
    /// deadline; [`PairClaimError::RoomMismatch`] when it was minted in a
    /// different room (the token survives for the right room to claim).
    pub fn claim(&self, token: &str, room_id: &str) -> Result<PairToken, PairClaimError> {
        self.claim_at(token, room_id, now_ms())
    }

    fn claim_at(&self, token: &str, room_id: &str, now: i64) -> Result<PairToken, PairClaimError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.get(token) else {
            return Err(PairClaimError::UnknownToken);
        };
        if entry.expires_at <= now {
            inner.remove(token);
            return Err(PairClaimError::UnknownToken);
        }
        if entry.room_id != room_id {
            return Err(PairClaimError::RoomMismatch);
        }
        // Present, fresh, and room-matched: consume it.
        inner.remove(token).ok_or(PairClaimError::UnknownToken)
    }

    /// Delete every token past its deadline. Returns how many were removed.
    pub fn reap_expired(&self) -> usize {
        self.reap_expired_at(now_ms())
    }

    fn reap_expired_at(&self, now: i64) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.len();
        inner.retain(|_, entry| entry.expires_at > now);
        before - inner.len()
    }

    /// Number of outstanding tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PairRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// REAPER
// =============================================================================

/// Spawn the background reaper. Returns a handle for shutdown.
pub fn spawn_reaper(registry: PairRegistry) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let removed = registry.reap_expired();
            if removed > 0 {
                debug!(removed, "reaped expired pair tokens");
            }
        }
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "pairing_test.rs"]
mod tests;
