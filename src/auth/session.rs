//! Device-bound login sessions.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::AuthError,
    models::{ClientContext, DeviceFingerprint, NewSession, RevokedToken, SessionRecord},
    store::SessionStore,
    utils::{hash_token, truncate_token},
};

/// Width of the legacy `login_sessions.token` column.
pub const SESSION_TOKEN_MAX_LEN: usize = 1024;

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            lifetime: Duration::seconds(config.refresh_token_ttl_seconds()),
        }
    }

    /// Persist an active session bound to the caller's fingerprint. Sessions
    /// live as long as the refresh token.
    ///
    /// # Errors
    /// Returns `Internal` if the row cannot be written.
    pub async fn create_session(
        &self,
        principal_id: i64,
        portal_id: i64,
        access_token: &str,
        client: &ClientContext,
    ) -> Result<SessionRecord, AuthError> {
        let now = Utc::now();
        let session = NewSession {
            session_id: Uuid::new_v4(),
            principal_id,
            portal_id,
            token: truncate_token(access_token, SESSION_TOKEN_MAX_LEN),
            token_hash: hash_token(access_token),
            fingerprint: client.fingerprint.clone(),
            request_headers: client.headers.clone(),
            login_at: now,
            expiry_at: now + self.lifetime,
        };
        let record = self.store.insert_session(&session).await?;
        info!(
            principal_id,
            portal_id,
            session_id = %record.session_id,
            ip = %record.ip_address,
            "session created"
        );
        Ok(record)
    }

    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn find_bound_session(
        &self,
        principal_id: i64,
        fingerprint: &DeviceFingerprint,
    ) -> Result<Option<SessionRecord>, AuthError> {
        Ok(self.store.find_bound_session(principal_id, fingerprint).await?)
    }

    /// End `session` and revoke both tokens in one transaction.
    ///
    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn end_session(
        &self,
        session: &SessionRecord,
        revocations: [RevokedToken; 2],
    ) -> Result<(), AuthError> {
        self.store
            .end_session(session.session_id, session.principal_id, Utc::now(), &revocations)
            .await?;
        info!(
            principal_id = session.principal_id,
            session_id = %session.session_id,
            "session ended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryStore;
    use anyhow::{Result, anyhow};
    use secrecy::SecretString;

    fn registry(store: &Arc<MemoryStore>) -> SessionRegistry {
        SessionRegistry::new(store.clone(), &AuthConfig::new(SecretString::from("secret")))
    }

    #[tokio::test]
    async fn create_session_truncates_and_hashes() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let token = "t".repeat(1500);
        let record = registry
            .create_session(1, 1, &token, &ClientContext::new("10.0.0.1", "ua"))
            .await?;

        assert!(record.is_active);
        assert!(record.logout_at.is_none());
        assert_eq!(record.token.len(), SESSION_TOKEN_MAX_LEN);
        assert_eq!(record.token_hash, hash_token(&token));
        assert_eq!(record.expiry_at - record.login_at, Duration::days(1));
        Ok(())
    }

    #[tokio::test]
    async fn lookup_requires_exact_fingerprint() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let client = ClientContext::new("10.0.0.1", "ua");
        registry.create_session(1, 1, "token", &client).await?;

        assert!(
            registry
                .find_bound_session(1, &client.fingerprint)
                .await?
                .is_some()
        );
        let moved = DeviceFingerprint {
            ip_address: "10.0.0.2".to_string(),
            user_agent: "ua".to_string(),
        };
        assert!(registry.find_bound_session(1, &moved).await?.is_none());
        assert!(registry.find_bound_session(2, &client.fingerprint).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn ending_a_session_is_idempotent() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let client = ClientContext::new("10.0.0.1", "ua");
        let session = registry.create_session(1, 1, "access", &client).await?;
        let expires_at = Utc::now() + Duration::hours(1);
        let revocations = || {
            [
                RevokedToken {
                    token_hash: hash_token("access"),
                    principal_id: 1,
                    expires_at,
                },
                RevokedToken {
                    token_hash: hash_token("refresh"),
                    principal_id: 1,
                    expires_at,
                },
            ]
        };

        registry.end_session(&session, revocations()).await?;
        registry.end_session(&session, revocations()).await?;

        let stored = store
            .session(session.session_id)
            .await
            .ok_or_else(|| anyhow!("session missing"))?;
        assert!(!stored.is_active);
        assert!(stored.logout_at.is_some());
        assert_eq!(store.revoked_count().await, 2);
        assert!(registry.find_bound_session(1, &client.fingerprint).await?.is_none());
        Ok(())
    }
}
