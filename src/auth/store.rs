//! Storage seams for the auth core.
//!
//! Each trait owns one table family. `PgStore` implements all of them against
//! Postgres; `MemoryStore` backs unit and router tests. Race-sensitive updates
//! (lockout counter, OTP consumption, logout) are single atomic operations here
//! so callers never do read-modify-write.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{
    DeviceFingerprint, FailedLoginAttempt, Identifier, NewOneTimeCode, NewSession, OneTimeCode,
    OtpDispatch, OtpPurpose, PrincipalRecord, RevokedToken, SessionRecord,
};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a non-deleted principal by mobile, email, or employee code.
    async fn find_principal(&self, identifier: &Identifier) -> Result<Option<PrincipalRecord>>;

    async fn find_principal_by_id(&self, principal_id: i64) -> Result<Option<PrincipalRecord>>;

    /// Increment `failed_attempts` and append the audit row in one unit.
    /// Returns the counter value after the increment.
    async fn record_failed_login(
        &self,
        principal_id: i64,
        attempt: &FailedLoginAttempt,
    ) -> Result<i32>;

    /// Reset the counter, mark the principal logged in, and clear the failed
    /// attempt rows recorded under `username`.
    async fn record_successful_login(&self, principal_id: i64, username: &str) -> Result<()>;

    async fn reset_failed_attempts(&self, principal_id: i64) -> Result<()>;

    /// Set `last_activity = now` only when it is unset or older than `stale_before`.
    /// Returns whether a write happened.
    async fn touch_last_activity(
        &self,
        principal_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait OtpLedger: Send + Sync {
    async fn insert_code(&self, code: &NewOneTimeCode) -> Result<OneTimeCode>;

    /// Most recently created code for `(owner, request_id)`. A `None` owner only
    /// matches codes issued without an owner.
    async fn latest_code(
        &self,
        principal_id: Option<i64>,
        request_id: &str,
    ) -> Result<Option<OneTimeCode>>;

    /// Compare-and-swap `pending -> verified`. Returns `false` if the row was no
    /// longer pending.
    async fn mark_verified(&self, code_id: i64, verified_at: DateTime<Utc>) -> Result<bool>;

    async fn last_issued_at(
        &self,
        principal_id: Option<i64>,
        purpose: OtpPurpose,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn record_dispatch(&self, dispatch: &OtpDispatch) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord>;

    /// Most recent active, not logged out session for the principal whose
    /// stored fingerprint matches exactly.
    async fn find_bound_session(
        &self,
        principal_id: i64,
        fingerprint: &DeviceFingerprint,
    ) -> Result<Option<SessionRecord>>;

    /// End the session, clear the principal's `is_login` flag, and insert the
    /// revocations, all in one transaction. Duplicate revocations are ignored.
    async fn end_session(
        &self,
        session_id: Uuid,
        principal_id: i64,
        ended_at: DateTime<Utc>,
        revocations: &[RevokedToken],
    ) -> Result<()>;
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Returns `false` when the `(token, principal)` pair was already revoked.
    async fn revoke(&self, token: &RevokedToken) -> Result<bool>;

    async fn is_revoked(&self, token_hash: &[u8], principal_id: i64) -> Result<bool>;

    /// Delete revocations whose token expired before `now`. Returns rows removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Everything the auth core needs from a single backing store.
pub trait AuthStore: CredentialStore + OtpLedger + SessionStore + RevocationStore {}

impl<T> AuthStore for T where T: CredentialStore + OtpLedger + SessionStore + RevocationStore {}
