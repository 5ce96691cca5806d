//! Challenge id generation.
//!
//! Ids are 8 characters from `[A-Z0-9]` drawn from the OS CSPRNG (~41 bits).
//! Uniqueness is enforced by the caller through rejection sampling against storage.

use rand::{rngs::OsRng, Rng};

pub const CHALLENGE_ID_LEN: usize = 8;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fresh random challenge id.
pub fn generate_challenge_id() -> String {
  let mut rng = OsRng;
  (0..CHALLENGE_ID_LEN)
    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
    .collect()
}

/// True if `s` has the exact shape of a challenge id.
pub fn is_valid_challenge_id(s: &str) -> bool {
  s.len() == CHALLENGE_ID_LEN && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Normalize user input (trim, uppercase) before checking it as an id.
pub fn normalize_challenge_id(s: &str) -> String {
  s.trim().to_ascii_uppercase()
}
