//! # Lendgate (back-office authentication)
//!
//! `lendgate` authenticates lending back-office staff and leads, issues
//! portal-scoped JWTs, binds login sessions to the client device, and gates
//! portal routes.
//!
//! ## Portals
//!
//! Every protected route lives under `/api/<portal>/...`. The portal name maps
//! to a numeric id (`ems`, `cms`, `lead`, `dedup`, `code_of_conduct`), and a
//! token is only accepted on the portal it was minted for.
//!
//! ## Login flows
//!
//! - **Employees** sign in with a mobile number, email, or employee code and a
//!   password. Accounts with two-step enabled receive an SMS one-time code
//!   before tokens are issued.
//! - **Leads** sign in with a mobile number and an SMS code only.
//!
//! Repeated bad passwords lock the account; success resets the counter.
//!
//! ## Sessions & revocation
//!
//! Each token issuance writes a login session recording the caller's IP and
//! user agent. Strict-tier routes require that session to still be active for
//! the same device and the token to not be revoked. Logout revokes both tokens.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
