//! Small helpers for code generation and token fingerprints.

use rand::{Rng, rngs::OsRng};
use sha2::{Digest, Sha256};

const OTP_DIGITS: usize = 6;
const REQUEST_ID_LEN: usize = 12;
const REQUEST_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six random decimal digits. Leading zeros are kept, so this is a string.
pub(crate) fn generate_otp_code() -> String {
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}

/// Correlation id tying a code to its dispatch record.
pub(crate) fn generate_request_id() -> String {
    (0..REQUEST_ID_LEN)
        .map(|_| {
            let index = OsRng.gen_range(0..REQUEST_ID_ALPHABET.len());
            char::from(REQUEST_ID_ALPHABET[index])
        })
        .collect()
}

/// SHA-256 of a bearer token. Sessions and revocations compare on this value.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Keep at most `max_chars` characters of a token for the legacy `token` column.
pub(crate) fn truncate_token(token: &str, max_chars: usize) -> String {
    token.chars().take(max_chars).collect()
}
