//! Authenticated principal placed in request extensions by the portal guards.

use crate::auth::{PortalScope, TokenClaims};

/// Verified caller derived from the bearer access token.
#[derive(Clone, Debug)]
pub struct AuthenticatedPrincipal {
    pub claims: TokenClaims,
    pub token: String,
    pub scope: PortalScope,
}

impl AuthenticatedPrincipal {
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.claims.user_id
    }
}
