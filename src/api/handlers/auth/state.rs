//! Shared auth state: configuration plus the wired auth components.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{
    AuthConfig, AuthError, CredentialVerifier, OtpService, PortalGuard, RevocationList,
    SessionRegistry, TokenIssuer, TokenPair,
    models::{ClientContext, PrincipalRecord},
    store::{AuthStore, CredentialStore},
    transport::OtpTransport,
};

pub struct AuthState {
    config: AuthConfig,
    principals: Arc<dyn CredentialStore>,
    credentials: CredentialVerifier,
    otp: OtpService,
    tokens: TokenIssuer,
    sessions: SessionRegistry,
    revocations: RevocationList,
    guard: PortalGuard,
}

impl AuthState {
    /// Wire every component against one backing store.
    pub fn new<S>(config: AuthConfig, store: Arc<S>, transport: Arc<dyn OtpTransport>) -> Self
    where
        S: AuthStore + 'static,
    {
        let principals: Arc<dyn CredentialStore> = store.clone();
        Self {
            credentials: CredentialVerifier::new(principals.clone(), &config),
            otp: OtpService::new(store.clone(), transport, &config),
            tokens: TokenIssuer::new(&config),
            sessions: SessionRegistry::new(store.clone(), &config),
            revocations: RevocationList::new(store),
            guard: PortalGuard::new(&config),
            principals,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn principals(&self) -> &dyn CredentialStore {
        self.principals.as_ref()
    }

    pub(crate) fn credentials(&self) -> &CredentialVerifier {
        &self.credentials
    }

    pub(crate) fn otp(&self) -> &OtpService {
        &self.otp
    }

    pub(crate) fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub(crate) fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub(crate) fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    pub(crate) fn guard(&self) -> &PortalGuard {
        &self.guard
    }

    /// Reject portal ids outside the configured map before any work happens.
    pub(crate) fn ensure_known_portal(&self, portal_id: i64) -> Result<(), AuthError> {
        if self.config.portals().contains_id(portal_id) {
            Ok(())
        } else {
            Err(AuthError::InvalidPortalId)
        }
    }

    /// The principal a verified token names, if it still exists and is not
    /// soft-deleted.
    pub(crate) async fn active_principal(
        &self,
        principal_id: i64,
    ) -> Result<PrincipalRecord, AuthError> {
        match self.principals.find_principal_by_id(principal_id).await? {
            Some(principal) => Ok(principal),
            None => {
                warn!(principal_id, "token presented for missing or deleted principal");
                Err(AuthError::InactivePrincipal)
            }
        }
    }

    /// Mint a token pair and persist the session bound to `client`.
    ///
    /// Tokens are only handed back once the session row exists; a failed
    /// write surfaces as `Internal` and the minted tokens are dropped.
    pub(crate) async fn open_session(
        &self,
        principal: &PrincipalRecord,
        portal_id: i64,
        client: &ClientContext,
    ) -> Result<TokenPair, AuthError> {
        let pair = self.tokens.issue(principal, portal_id)?;
        self.sessions
            .create_session(principal.id, portal_id, &pair.access_token, client)
            .await?;
        Ok(pair)
    }

    /// Refresh `last_activity`, at most once per threshold window. Failures are
    /// logged and never fail the request.
    pub(crate) async fn touch_activity(&self, principal_id: i64) {
        let now = Utc::now();
        let stale_before = now - Duration::seconds(self.config.last_activity_threshold_seconds());
        match self
            .principals
            .touch_last_activity(principal_id, now, stale_before)
            .await
        {
            Ok(true) => debug!(principal_id, "last activity updated"),
            Ok(false) => {}
            Err(err) => warn!(principal_id, "failed to update last activity: {err:#}"),
        }
    }
}
