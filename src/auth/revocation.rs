//! Explicit token revocation and retention pruning.
//!
//! Revoked tokens are keyed by `(sha256(token), principal)`. Each row carries
//! the token's own expiry; once that passes the signature check already
//! rejects the token, so the pruner can drop the row.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, info};

use super::{error::AuthError, models::RevokedToken, store::RevocationStore, utils::hash_token};

pub struct RevocationList {
    store: Arc<dyn RevocationStore>,
}

impl RevocationList {
    #[must_use]
    pub fn new(store: Arc<dyn RevocationStore>) -> Self {
        Self { store }
    }

    /// Returns `false` if the pair was already revoked.
    ///
    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn revoke(
        &self,
        token: &str,
        principal_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let revoked = RevokedToken {
            token_hash: hash_token(token),
            principal_id,
            expires_at,
        };
        Ok(self.store.revoke(&revoked).await?)
    }

    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn is_revoked(&self, token: &str, principal_id: i64) -> Result<bool, AuthError> {
        Ok(self
            .store
            .is_revoked(&hash_token(token), principal_id)
            .await?)
    }

    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn prune_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.prune_expired(Utc::now()).await?)
    }
}

/// Periodically delete revocations whose tokens have expired. A zero interval
/// disables the task.
pub fn spawn_revocation_pruner(
    store: Arc<dyn RevocationStore>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("revocation pruning disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let revocations = RevocationList::new(store);
        loop {
            sleep(interval).await;
            match revocations.prune_expired().await {
                Ok(removed) => debug!(removed, "pruned expired revocations"),
                Err(err) => error!("revocation prune failed: {err}"),
            }
        }
    }))
}
