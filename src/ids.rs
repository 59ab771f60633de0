//! Random opaque identifiers.
//!
//! User ids and pair tokens are short hex strings minted from OS randomness.
//! They are capabilities, not secrets with long lifetimes, so compact sizes
//! are preferred over UUID-length strings on the wire.

use rand::Rng;
use std::fmt::Write;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Mint a 10-char user id, assigned once per connection at accept time.
#[must_use]
pub fn new_user_id() -> String {
    let bytes: [u8; 5] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Mint a 16-char pair token.
#[must_use]
pub fn new_pair_token() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_hex_known_values() {
        assert_eq!(bytes_to_hex(&[]), "");
        assert_eq!(bytes_to_hex(&[0x0a]), "0a");
        assert_eq!(bytes_to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn user_id_is_10_hex_chars() {
        let id = new_user_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn pair_token_is_16_hex_chars() {
        let token = new_pair_token();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_ids_differ() {
        assert_ne!(new_user_id(), new_user_id());
        assert_ne!(new_pair_token(), new_pair_token());
    }
}
