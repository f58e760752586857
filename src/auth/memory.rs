//! In-process store backing the unit and router tests.
//!
//! A single `tokio::sync::Mutex` guards all tables, so every trait method is
//! atomic with respect to the others, matching the transactional guarantees of
//! `PgStore`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    models::{
        DeliveryStatus, DeviceFingerprint, FailedLoginAttempt, Identifier, NewOneTimeCode,
        NewPrincipal, NewSession, OneTimeCode, OtpDispatch, OtpPurpose, PrincipalRecord,
        RevokedToken, SessionRecord,
    },
    store::{CredentialStore, OtpLedger, RevocationStore, SessionStore},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    principals: Vec<PrincipalRecord>,
    failed_attempts: Vec<FailedLoginAttempt>,
    codes: Vec<OneTimeCode>,
    dispatches: Vec<OtpDispatch>,
    sessions: Vec<SessionRecord>,
    revoked: Vec<RevokedToken>,
    deleted: Vec<i64>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_deleted(&self, principal_id: i64) -> bool {
        self.deleted.contains(&principal_id)
    }

    fn principal_mut(&mut self, principal_id: i64) -> Option<&mut PrincipalRecord> {
        self.principals.iter_mut().find(|p| p.id == principal_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_principal(&self, principal: NewPrincipal) -> PrincipalRecord {
        let mut tables = self.tables.lock().await;
        let record = PrincipalRecord {
            id: tables.next_id(),
            full_name: principal.full_name,
            email: principal.email.to_lowercase(),
            mobile_number: principal.mobile_number,
            employee_id: principal.employee_id,
            employee_code: principal.employee_code,
            role_id: principal.role_id,
            password_hash: principal.password_hash,
            failed_attempts: 0,
            two_step: principal.two_step,
            is_login: false,
            last_activity: None,
        };
        tables.principals.push(record.clone());
        record
    }

    pub async fn principal(&self, principal_id: i64) -> Option<PrincipalRecord> {
        let tables = self.tables.lock().await;
        tables.principals.iter().find(|p| p.id == principal_id).cloned()
    }

    /// Soft delete: the row stays but lookups no longer return it.
    pub async fn soft_delete(&self, principal_id: i64) {
        let mut tables = self.tables.lock().await;
        if !tables.is_deleted(principal_id) {
            tables.deleted.push(principal_id);
        }
    }

    pub async fn failed_attempts_for(&self, username: &str) -> Vec<FailedLoginAttempt> {
        let tables = self.tables.lock().await;
        tables
            .failed_attempts
            .iter()
            .filter(|attempt| attempt.username == username)
            .cloned()
            .collect()
    }

    /// Plain code of the newest row for `(owner, request_id)`.
    pub async fn latest_code_value(
        &self,
        principal_id: Option<i64>,
        request_id: &str,
    ) -> Option<String> {
        let tables = self.tables.lock().await;
        latest(&tables.codes, principal_id, request_id).map(|code| code.code.clone())
    }

    /// Move every code with `request_id` into the past.
    pub async fn expire_codes(&self, request_id: &str) {
        let mut tables = self.tables.lock().await;
        for code in tables.codes.iter_mut().filter(|c| c.request_id == request_id) {
            code.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub async fn dispatches(&self) -> Vec<OtpDispatch> {
        self.tables.lock().await.dispatches.clone()
    }

    pub async fn session(&self, session_id: Uuid) -> Option<SessionRecord> {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub async fn sessions_for(&self, principal_id: i64) -> Vec<SessionRecord> {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .iter()
            .filter(|s| s.principal_id == principal_id)
            .cloned()
            .collect()
    }

    pub async fn revoked_count(&self) -> usize {
        self.tables.lock().await.revoked.len()
    }
}

fn latest<'a>(
    codes: &'a [OneTimeCode],
    principal_id: Option<i64>,
    request_id: &str,
) -> Option<&'a OneTimeCode> {
    codes
        .iter()
        .filter(|c| c.principal_id == principal_id && c.request_id == request_id)
        .max_by_key(|c| c.id)
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_principal(&self, identifier: &Identifier) -> Result<Option<PrincipalRecord>> {
        let tables = self.tables.lock().await;
        let found = tables
            .principals
            .iter()
            .filter(|p| !tables.is_deleted(p.id))
            .find(|p| match identifier {
                Identifier::Mobile(mobile) => p.mobile_number == *mobile,
                Identifier::Email(email) => p.email == *email,
                Identifier::Username(username) => {
                    p.employee_code.as_deref() == Some(username.as_str())
                }
            });
        Ok(found.cloned())
    }

    async fn find_principal_by_id(&self, principal_id: i64) -> Result<Option<PrincipalRecord>> {
        let tables = self.tables.lock().await;
        if tables.is_deleted(principal_id) {
            return Ok(None);
        }
        Ok(tables.principals.iter().find(|p| p.id == principal_id).cloned())
    }

    async fn record_failed_login(
        &self,
        principal_id: i64,
        attempt: &FailedLoginAttempt,
    ) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        let failed = match tables.principal_mut(principal_id) {
            Some(principal) => {
                principal.failed_attempts += 1;
                principal.failed_attempts
            }
            None => 0,
        };
        tables.failed_attempts.push(attempt.clone());
        Ok(failed)
    }

    async fn record_successful_login(&self, principal_id: i64, username: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(principal) = tables.principal_mut(principal_id) {
            principal.failed_attempts = 0;
            principal.is_login = true;
        }
        tables
            .failed_attempts
            .retain(|attempt| attempt.username != username);
        Ok(())
    }

    async fn reset_failed_attempts(&self, principal_id: i64) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(principal) = tables.principal_mut(principal_id) {
            principal.failed_attempts = 0;
        }
        Ok(())
    }

    async fn touch_last_activity(
        &self,
        principal_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.is_deleted(principal_id) {
            return Ok(false);
        }
        let Some(principal) = tables.principal_mut(principal_id) else {
            return Ok(false);
        };
        if principal.last_activity.is_some_and(|last| last >= stale_before) {
            return Ok(false);
        }
        principal.last_activity = Some(now);
        Ok(true)
    }
}

#[async_trait]
impl OtpLedger for MemoryStore {
    async fn insert_code(&self, code: &NewOneTimeCode) -> Result<OneTimeCode> {
        let mut tables = self.tables.lock().await;
        let record = OneTimeCode {
            id: tables.next_id(),
            principal_id: code.principal_id,
            purpose: code.purpose,
            code: code.code.clone(),
            request_id: code.request_id.clone(),
            status: DeliveryStatus::Pending,
            created_at: code.created_at,
            expires_at: code.expires_at,
            verified_at: None,
        };
        tables.codes.push(record.clone());
        Ok(record)
    }

    async fn latest_code(
        &self,
        principal_id: Option<i64>,
        request_id: &str,
    ) -> Result<Option<OneTimeCode>> {
        let tables = self.tables.lock().await;
        Ok(latest(&tables.codes, principal_id, request_id).cloned())
    }

    async fn mark_verified(&self, code_id: i64, verified_at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(code) = tables
            .codes
            .iter_mut()
            .find(|c| c.id == code_id && c.status == DeliveryStatus::Pending)
        else {
            return Ok(false);
        };
        code.status = DeliveryStatus::Verified;
        code.verified_at = Some(verified_at);
        Ok(true)
    }

    async fn last_issued_at(
        &self,
        principal_id: Option<i64>,
        purpose: OtpPurpose,
    ) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .codes
            .iter()
            .filter(|c| c.principal_id == principal_id && c.purpose == purpose)
            .map(|c| c.created_at)
            .max())
    }

    async fn record_dispatch(&self, dispatch: &OtpDispatch) -> Result<()> {
        self.tables.lock().await.dispatches.push(dispatch.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord> {
        let mut tables = self.tables.lock().await;
        let record = SessionRecord {
            id: tables.next_id(),
            session_id: session.session_id,
            principal_id: session.principal_id,
            portal_id: session.portal_id,
            token: session.token.clone(),
            token_hash: session.token_hash.clone(),
            ip_address: session.fingerprint.ip_address.clone(),
            user_agent: session.fingerprint.user_agent.clone(),
            request_headers: session.request_headers.clone(),
            login_at: session.login_at,
            logout_at: None,
            expiry_at: session.expiry_at,
            is_active: true,
        };
        tables.sessions.push(record.clone());
        Ok(record)
    }

    async fn find_bound_session(
        &self,
        principal_id: i64,
        fingerprint: &DeviceFingerprint,
    ) -> Result<Option<SessionRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .filter(|s| {
                s.principal_id == principal_id
                    && s.is_active
                    && s.logout_at.is_none()
                    && s.ip_address == fingerprint.ip_address
                    && s.user_agent == fingerprint.user_agent
            })
            .max_by_key(|s| (s.login_at, s.id))
            .cloned())
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        principal_id: i64,
        ended_at: DateTime<Utc>,
        revocations: &[RevokedToken],
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(session) = tables
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id && s.is_active)
        {
            session.is_active = false;
            session.logout_at = Some(ended_at);
        }
        if let Some(principal) = tables.principal_mut(principal_id) {
            principal.is_login = false;
        }
        for revoked in revocations {
            let duplicate = tables.revoked.iter().any(|existing| {
                existing.token_hash == revoked.token_hash
                    && existing.principal_id == revoked.principal_id
            });
            if !duplicate {
                tables.revoked.push(revoked.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn revoke(&self, token: &RevokedToken) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.revoked.iter().any(|existing| {
            existing.token_hash == token.token_hash && existing.principal_id == token.principal_id
        });
        if duplicate {
            return Ok(false);
        }
        tables.revoked.push(token.clone());
        Ok(true)
    }

    async fn is_revoked(&self, token_hash: &[u8], principal_id: i64) -> Result<bool> {
        let tables = self.tables.lock().await;
        Ok(tables
            .revoked
            .iter()
            .any(|r| r.token_hash == token_hash && r.principal_id == principal_id))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.revoked.len();
        tables.revoked.retain(|r| r.expires_at >= now);
        Ok(u64::try_from(before - tables.revoked.len()).unwrap_or(0))
    }
}
