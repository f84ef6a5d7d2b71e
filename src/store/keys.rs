//! Stored-key namespace codec.
//!
//! Every record in the store carries a single leading namespace byte. User
//! data lives under [`USER_PREFIX`]; the rest of the byte space is reserved
//! for internal entries, so snapshot consumers must filter on the prefix
//! rather than assume every record is user-visible.

/// Namespace byte for user data.
pub const USER_PREFIX: u8 = b'k';

/// Build a full stored key: prefix byte followed by the user key.
pub fn namespaced(prefix: u8, key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(1 + key.len());
    full.push(prefix);
    full.extend_from_slice(key);
    full
}

/// Strip the namespace byte from a full stored key.
pub fn user_key(full: &[u8]) -> &[u8] {
    &full[1..]
}

/// Defensive copy. Iterator callbacks hand out borrowed slices whose backing
/// buffers may be reused on the next step; copy before retaining.
pub fn copy_bytes(b: &[u8]) -> Vec<u8> {
    b.to_vec()
}
