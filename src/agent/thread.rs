//! Thread identity derivation.

use sha1::{Digest, Sha1};

/// Derive the memory thread id for a user.
///
/// A non-empty `session_id` is used verbatim. Otherwise the id is
/// `"{user_id}-{first 8 hex chars of SHA1(user_id)}"`, stable across restarts.
pub fn stable_thread_id(user_id: &str, session_id: &str) -> String {
    if !session_id.is_empty() {
        return session_id.to_string();
    }
    let digest = Sha1::digest(user_id.as_bytes());
    format!("{user_id}-{}", &hex::encode(digest)[..8])
}
