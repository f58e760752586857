//! # Authentication and session lifecycle
//!
//! Components, each usable on its own against the storage traits in [`store`]:
//!
//! - [`credentials`]: identifier resolution, password check, lockout counter.
//! - [`otp`]: one-time code issuance, dispatch, single-use validation.
//! - [`token`]: HS256 access/refresh pairs carrying the `portal_id` claim.
//! - [`session`]: login sessions bound to the client IP and user agent.
//! - [`revocation`]: explicit revocation of individual tokens, plus pruning.
//! - [`guard`]: portal scoping of request paths, in a basic and a strict tier.
//!
//! Persistence is behind [`store::AuthStore`]. [`repo::PgStore`] is the
//! production implementation; an in-process store backs the unit tests.

pub mod config;
pub mod credentials;
pub mod error;
pub mod guard;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod otp;
pub mod password;
pub mod repo;
pub mod revocation;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;
pub mod utils;

pub use config::{AuthConfig, PortalMap};
pub use credentials::CredentialVerifier;
pub use error::AuthError;
pub use guard::{PortalGuard, PortalScope};
#[cfg(test)]
pub use memory::MemoryStore;
pub use otp::{IssuedOtp, OtpRequest, OtpService};
pub use repo::PgStore;
pub use revocation::{RevocationList, spawn_revocation_pruner};
pub use session::SessionRegistry;
pub use store::AuthStore;
pub use token::{TokenClaims, TokenIssuer, TokenPair, TokenType};
pub use transport::{LogTransport, OtpTransport, SmsGatewayTransport};
