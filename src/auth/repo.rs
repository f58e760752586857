//! Postgres implementation of the auth storage traits.
//!
//! Every statement runs inside a `db.query` span. Multi-row effects (failed
//! login audit, successful login cleanup, logout) are single transactions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{
    models::{
        DeviceFingerprint, FailedLoginAttempt, Identifier, NewOneTimeCode, NewPrincipal,
        NewSession, OneTimeCode, OtpDispatch, OtpPurpose, PrincipalRecord, RevokedToken,
        SessionRecord,
    },
    store::{CredentialStore, OtpLedger, RevocationStore, SessionStore},
};

const PRINCIPAL_COLUMNS: &str = "id, full_name, email, mobile_number, employee_id, employee_code, \
    role_id, password_hash, failed_attempts, two_step, is_login, last_activity";

const CODE_COLUMNS: &str = "id, principal_id, purpose::text AS purpose, code, request_id, \
    status::text AS status, created_at, expires_at, verified_at";

const SESSION_COLUMNS: &str = "id, session_id, principal_id, portal_id, token, token_hash, \
    ip_address, user_agent, request_headers, login_at, logout_at, expiry_at, is_active";

const INSERT_REVOCATION: &str = r"
    INSERT INTO revoked_tokens (token_hash, principal_id, expires_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (token_hash, principal_id) DO NOTHING
";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a principal. Provisioning lives outside this service; this is
    /// used for seeding and integration tests.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including unique violations.
    pub async fn insert_principal(&self, principal: &NewPrincipal) -> Result<PrincipalRecord> {
        let query = format!(
            r"
            INSERT INTO principals
                (full_name, email, mobile_number, employee_id, employee_code, role_id,
                 password_hash, two_step)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRINCIPAL_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, PrincipalRecord>(&query)
            .bind(&principal.full_name)
            .bind(principal.email.to_lowercase())
            .bind(&principal.mobile_number)
            .bind(&principal.employee_id)
            .bind(&principal.employee_code)
            .bind(principal.role_id)
            .bind(&principal.password_hash)
            .bind(principal.two_step)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert principal")
    }

    async fn fetch_principal(&self, column: &str, value: &str) -> Result<Option<PrincipalRecord>> {
        let query = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE {column} = $1 AND NOT is_deleted"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, PrincipalRecord>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup principal")
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_principal(&self, identifier: &Identifier) -> Result<Option<PrincipalRecord>> {
        match identifier {
            Identifier::Mobile(mobile) => self.fetch_principal("mobile_number", mobile).await,
            Identifier::Email(email) => self.fetch_principal("email", email).await,
            Identifier::Username(code) => self.fetch_principal("employee_code", code).await,
        }
    }

    async fn find_principal_by_id(&self, principal_id: i64) -> Result<Option<PrincipalRecord>> {
        let query =
            format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1 AND NOT is_deleted");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, PrincipalRecord>(&query)
            .bind(principal_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup principal by id")
    }

    async fn record_failed_login(
        &self,
        principal_id: i64,
        attempt: &FailedLoginAttempt,
    ) -> Result<i32> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin failed login transaction")?;

        let query = r"
            UPDATE principals
            SET failed_attempts = failed_attempts + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING failed_attempts
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal_id)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to increment failed attempts")?;
        let failed: i32 = row.get("failed_attempts");

        let query = r"
            INSERT INTO failed_login_attempts (username, ip, user_agent, principal_snapshot)
            VALUES ($1, $2, $3, $4)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&attempt.username)
            .bind(&attempt.ip)
            .bind(&attempt.user_agent)
            .bind(&attempt.principal_snapshot)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert failed login attempt")?;

        tx.commit().await.context("commit failed login transaction")?;
        Ok(failed)
    }

    async fn record_successful_login(&self, principal_id: i64, username: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin successful login transaction")?;

        let query = r"
            UPDATE principals
            SET failed_attempts = 0, is_login = TRUE, updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to reset failed attempts")?;

        let query = "DELETE FROM failed_login_attempts WHERE username = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear failed login attempts")?;

        tx.commit()
            .await
            .context("commit successful login transaction")?;
        Ok(())
    }

    async fn reset_failed_attempts(&self, principal_id: i64) -> Result<()> {
        let query = "UPDATE principals SET failed_attempts = 0, updated_at = NOW() WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset failed attempts")?;
        Ok(())
    }

    async fn touch_last_activity(
        &self,
        principal_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let query = r"
            UPDATE principals
            SET last_activity = $2
            WHERE id = $1 AND NOT is_deleted AND (last_activity IS NULL OR last_activity < $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(principal_id)
            .bind(now)
            .bind(stale_before)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch last activity")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OtpLedger for PgStore {
    async fn insert_code(&self, code: &NewOneTimeCode) -> Result<OneTimeCode> {
        let query = format!(
            r"
            INSERT INTO one_time_codes
                (principal_id, purpose, code, request_id, status, created_at, expires_at)
            VALUES ($1, $2::otp_purpose, $3, $4, 'pending', $5, $6)
            RETURNING {CODE_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, OneTimeCode>(&query)
            .bind(code.principal_id)
            .bind(code.purpose.as_str())
            .bind(&code.code)
            .bind(&code.request_id)
            .bind(code.created_at)
            .bind(code.expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert one time code")
    }

    async fn latest_code(
        &self,
        principal_id: Option<i64>,
        request_id: &str,
    ) -> Result<Option<OneTimeCode>> {
        let query = format!(
            r"
            SELECT {CODE_COLUMNS}
            FROM one_time_codes
            WHERE principal_id IS NOT DISTINCT FROM $1 AND request_id = $2
            ORDER BY id DESC
            LIMIT 1
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, OneTimeCode>(&query)
            .bind(principal_id)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup one time code")
    }

    async fn mark_verified(&self, code_id: i64, verified_at: DateTime<Utc>) -> Result<bool> {
        let query = r"
            UPDATE one_time_codes
            SET status = 'verified', verified_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(code_id)
            .bind(verified_at)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark one time code verified")?;
        Ok(row.is_some())
    }

    async fn last_issued_at(
        &self,
        principal_id: Option<i64>,
        purpose: OtpPurpose,
    ) -> Result<Option<DateTime<Utc>>> {
        let query = r"
            SELECT MAX(created_at) AS last_issued_at
            FROM one_time_codes
            WHERE principal_id IS NOT DISTINCT FROM $1 AND purpose = $2::otp_purpose
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(principal_id)
            .bind(purpose.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup last issued code")?;
        row.try_get("last_issued_at")
            .context("failed to decode last issued timestamp")
    }

    async fn record_dispatch(&self, dispatch: &OtpDispatch) -> Result<()> {
        let query = r"
            INSERT INTO otp_dispatch_log
                (principal_id, channel, destination, purpose, message, request_id, status, response)
            VALUES ($1, $2, $3, $4::otp_purpose, $5, $6, $7::delivery_status, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(dispatch.principal_id)
            .bind(dispatch.channel.as_str())
            .bind(&dispatch.destination)
            .bind(dispatch.purpose.as_str())
            .bind(&dispatch.message)
            .bind(&dispatch.request_id)
            .bind(dispatch.status.as_str())
            .bind(&dispatch.response)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record otp dispatch")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &NewSession) -> Result<SessionRecord> {
        let query = format!(
            r"
            INSERT INTO login_sessions
                (session_id, principal_id, portal_id, token, token_hash, ip_address, user_agent,
                 request_headers, login_at, expiry_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(session.session_id)
            .bind(session.principal_id)
            .bind(session.portal_id)
            .bind(&session.token)
            .bind(&session.token_hash)
            .bind(&session.fingerprint.ip_address)
            .bind(&session.fingerprint.user_agent)
            .bind(&session.request_headers)
            .bind(session.login_at)
            .bind(session.expiry_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert login session")
    }

    async fn find_bound_session(
        &self,
        principal_id: i64,
        fingerprint: &DeviceFingerprint,
    ) -> Result<Option<SessionRecord>> {
        let query = format!(
            r"
            SELECT {SESSION_COLUMNS}
            FROM login_sessions
            WHERE principal_id = $1
              AND is_active
              AND logout_at IS NULL
              AND ip_address = $2
              AND user_agent = $3
            ORDER BY login_at DESC, id DESC
            LIMIT 1
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, SessionRecord>(&query)
            .bind(principal_id)
            .bind(&fingerprint.ip_address)
            .bind(&fingerprint.user_agent)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup bound session")
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        principal_id: i64,
        ended_at: DateTime<Utc>,
        revocations: &[RevokedToken],
    ) -> Result<()> {
        // Session end and revocations commit together so neither is visible alone.
        let mut tx = self.pool.begin().await.context("begin logout transaction")?;

        let query = r"
            UPDATE login_sessions
            SET logout_at = $2, is_active = FALSE
            WHERE session_id = $1 AND is_active
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .bind(ended_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to end login session")?;

        let query = "UPDATE principals SET is_login = FALSE, updated_at = NOW() WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear login flag")?;

        for revoked in revocations {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = INSERT_REVOCATION
            );
            sqlx::query(INSERT_REVOCATION)
                .bind(&revoked.token_hash)
                .bind(revoked.principal_id)
                .bind(revoked.expires_at)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to insert revoked token")?;
        }

        tx.commit().await.context("commit logout transaction")?;
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for PgStore {
    async fn revoke(&self, token: &RevokedToken) -> Result<bool> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = INSERT_REVOCATION
        );
        let result = sqlx::query(INSERT_REVOCATION)
            .bind(&token.token_hash)
            .bind(token.principal_id)
            .bind(token.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert revoked token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_revoked(&self, token_hash: &[u8], principal_id: i64) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM revoked_tokens WHERE token_hash = $1 AND principal_id = $2
            ) AS revoked
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(principal_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check token revocation")?;
        Ok(row.get("revoked"))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM revoked_tokens WHERE expires_at < $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to prune revoked tokens")?;
        Ok(result.rows_affected())
    }
}
