//! Portal authorization guard.
//!
//! The second path segment names the portal (`/api/<portal>/...`). The token's
//! `portal_id` claim must equal the id that name resolves to. Unscoped
//! namespaces such as the auth endpoints and docs skip the check.
//!
//! Two tiers exist:
//!
//! - **basic**: a structurally valid token whose portal claim matches.
//! - **strict**: the token is not revoked, passes the basic check, and is the
//!   token a live session bound to the caller's current IP and user agent was
//!   opened with. The revocation lookup runs before the token is decoded, so a
//!   revoked token reports `TokenRevoked` even after it expired.

use tracing::debug;

use super::{
    config::{AuthConfig, PortalMap},
    error::AuthError,
    models::{DeviceFingerprint, SessionRecord},
    revocation::RevocationList,
    session::SessionRegistry,
    token::TokenClaims,
    utils::hash_token,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalScope {
    /// Namespace is exempt from portal scoping.
    Unscoped,
    Portal(i64),
}

#[derive(Clone, Debug)]
pub struct PortalGuard {
    portals: PortalMap,
    exempt: Vec<String>,
}

impl PortalGuard {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            portals: config.portals().clone(),
            exempt: config.exempt_namespaces().to_vec(),
        }
    }

    /// Resolve which portal a request path belongs to.
    ///
    /// # Errors
    /// `InvalidPath` for fewer than two segments, `UnknownPortal` for a name
    /// missing from the portal map.
    pub fn required_portal(&self, path: &str) -> Result<PortalScope, AuthError> {
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        let Some(name) = segments.get(1) else {
            return Err(AuthError::InvalidPath);
        };

        let name = name.to_lowercase();
        if self.exempt.iter().any(|exempt| *exempt == name) {
            return Ok(PortalScope::Unscoped);
        }

        self.portals
            .resolve(&name)
            .map(PortalScope::Portal)
            .ok_or(AuthError::UnknownPortal)
    }

    /// Basic tier: the token's portal claim must match the path's portal.
    ///
    /// # Errors
    /// Path errors from [`PortalGuard::required_portal`], `MalformedToken` for
    /// a missing or non-numeric claim, `PortalMismatch` otherwise.
    pub fn check(&self, path: &str, claims: &TokenClaims) -> Result<PortalScope, AuthError> {
        let scope = self.required_portal(path)?;
        if let PortalScope::Portal(required) = scope {
            let claimed = claims.portal_id()?;
            if claimed != required {
                debug!(required, claimed, user_id = claims.user_id, "portal mismatch");
                return Err(AuthError::PortalMismatch);
            }
        }
        Ok(scope)
    }

    /// Strict tier, first step. `principal_id` comes from the token's verified
    /// signature alone, so this runs before expiry is checked.
    ///
    /// # Errors
    /// `TokenRevoked`, or `Internal` if the lookup fails.
    pub async fn ensure_not_revoked(
        &self,
        token: &str,
        principal_id: i64,
        revocations: &RevocationList,
    ) -> Result<(), AuthError> {
        if revocations.is_revoked(token, principal_id).await? {
            debug!(principal_id, "revoked token presented");
            return Err(AuthError::TokenRevoked);
        }
        Ok(())
    }

    /// Strict tier: the basic check, then the session bound to `fingerprint`
    /// must have been opened with `token`.
    ///
    /// # Errors
    /// Any basic-tier error, or `SessionNotBound` when no live session exists
    /// for the device or it holds a different token.
    pub async fn check_strict(
        &self,
        path: &str,
        token: &str,
        claims: &TokenClaims,
        fingerprint: &DeviceFingerprint,
        sessions: &SessionRegistry,
    ) -> Result<SessionRecord, AuthError> {
        self.check(path, claims)?;

        let session = sessions
            .find_bound_session(claims.user_id, fingerprint)
            .await?
            .ok_or(AuthError::SessionNotBound)?;

        if session.token_hash != hash_token(token) {
            debug!(
                user_id = claims.user_id,
                session_id = %session.session_id,
                "token is not the one the bound session was opened with"
            );
            return Err(AuthError::SessionNotBound);
        }
        Ok(session)
    }
}
