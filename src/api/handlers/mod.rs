//! API handlers and shared input checks.

pub mod auth;
pub mod health;
pub mod portal;
pub mod verification;

use regex::Regex;

/// Lightweight email sanity check used before dispatching codes.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Ten-digit national mobile number, no country prefix.
pub fn valid_mobile(mobile: &str) -> bool {
    Regex::new(r"^[0-9]{10}$").is_ok_and(|re| re.is_match(mobile))
}
