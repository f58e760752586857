//! Credential verification with lockout.

use std::sync::Arc;
use tracing::{info, warn};

use super::{
    config::AuthConfig,
    error::AuthError,
    models::{ClientContext, FailedLoginAttempt, Identifier, PrincipalRecord},
    password,
    store::CredentialStore,
};

pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    max_login_attempts: i32,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            max_login_attempts: config.max_login_attempts(),
        }
    }

    /// Check `secret` for the principal behind `identifier`.
    ///
    /// A locked account is rejected before the password is looked at. On
    /// success the counter is reset, the principal is marked logged in, and the
    /// failed attempt trail for `identifier` is cleared. The caller decides
    /// between token issuance and an OTP challenge from `two_step`.
    ///
    /// # Errors
    /// `UnknownIdentifier`, `AccountLocked`, `BadCredentials`, or `Internal`.
    pub async fn verify(
        &self,
        identifier: &str,
        secret: &str,
        client: &ClientContext,
    ) -> Result<PrincipalRecord, AuthError> {
        let lookup = Identifier::classify(identifier);
        let Some(mut principal) = self.store.find_principal(&lookup).await? else {
            info!(identifier = lookup.as_str(), "login for unknown identifier");
            return Err(AuthError::UnknownIdentifier);
        };

        self.ensure_not_locked(&principal)?;

        if !password::verify_password(secret, &principal.password_hash)? {
            let attempt = FailedLoginAttempt {
                username: identifier.trim().to_string(),
                ip: client.fingerprint.ip_address.clone(),
                user_agent: client.fingerprint.user_agent.clone(),
                principal_snapshot: principal.snapshot(),
            };
            let failed = self.store.record_failed_login(principal.id, &attempt).await?;
            warn!(
                principal_id = principal.id,
                failed_attempts = failed,
                ip = %client.fingerprint.ip_address,
                "login rejected: bad credentials"
            );
            return Err(AuthError::BadCredentials);
        }

        self.store
            .record_successful_login(principal.id, identifier.trim())
            .await?;
        principal.failed_attempts = 0;
        principal.is_login = true;

        info!(principal_id = principal.id, two_step = principal.two_step, "credentials verified");
        Ok(principal)
    }

    /// # Errors
    /// `AccountLocked` once the counter reached the configured maximum.
    pub fn ensure_not_locked(&self, principal: &PrincipalRecord) -> Result<(), AuthError> {
        if principal.failed_attempts >= self.max_login_attempts {
            warn!(principal_id = principal.id, "login rejected: account locked");
            return Err(AuthError::AccountLocked);
        }
        Ok(())
    }
}
