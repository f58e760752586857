//! Auth endpoints under `/api/auth_system` and the portal guard middleware.
//!
//! Flow Overview:
//! 1) `login` verifies credentials and either issues tokens or sends a two-step OTP.
//! 2) `verify-otp` / `lead-verify-otp` consume the OTP and issue tokens.
//! 3) Every issuance writes a session bound to the caller's IP and user agent.
//! 4) `token/refresh` mints a new access token from an unrevoked refresh token.
//! 5) `logout` ends the session and revokes both tokens.

pub mod client;
pub mod login;
pub mod logout;
pub mod middleware;
pub mod otp;
pub mod principal;
pub mod refresh;
pub mod state;
pub mod types;


pub use principal::AuthenticatedPrincipal;
pub use state::AuthState;
