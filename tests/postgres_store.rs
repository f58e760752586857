//! `PgStore` against a real Postgres. Set `LENDGATE_TEST_DATABASE_URL` to run;
//! every test is skipped otherwise.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use lendgate::auth::{
    AuthConfig, AuthError, CredentialVerifier, LogTransport, OtpRequest, OtpService, PgStore,
    RevocationList, SessionRegistry,
    models::{ClientContext, NewPrincipal, OtpChannel, OtpPurpose, PrincipalRecord, RevokedToken},
    password::hash_password,
    utils::hash_token,
};
use secrecy::SecretString;
use sqlx::{Connection, Executor, PgConnection, PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::sync::OnceCell;
use ulid::Ulid;

const PASSWORD: &str = "Correct@123";

static SCHEMA: OnceCell<()> = OnceCell::const_new();

fn database_url() -> Option<String> {
    match std::env::var("LENDGATE_TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("Skipping Postgres store test: LENDGATE_TEST_DATABASE_URL is not set");
            None
        }
    }
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_dollar_quote = false;

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") && current.trim().is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if line.matches("$$").count() % 2 == 1 {
            in_dollar_quote = !in_dollar_quote;
        }

        if !in_dollar_quote && trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

async fn apply_schema(url: &str) -> Result<()> {
    let mut conn = PgConnection::connect(url)
        .await
        .context("failed to connect for schema setup")?;
    for statement in split_sql_statements(include_str!("../sql/schema.sql")) {
        conn.execute(statement.as_str())
            .await
            .with_context(|| format!("failed to apply: {statement}"))?;
    }
    conn.close().await?;
    Ok(())
}

async fn pool() -> Result<Option<PgPool>> {
    let Some(url) = database_url() else {
        return Ok(None);
    };
    SCHEMA.get_or_try_init(|| apply_schema(&url)).await?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .context("failed to connect to test database")?;
    Ok(Some(pool))
}

fn config() -> AuthConfig {
    AuthConfig::new(SecretString::from("integration-secret"))
}

// Unique per call so runs against a shared database never collide.
async fn seed(store: &PgStore, two_step: bool) -> Result<PrincipalRecord> {
    let tag = Ulid::new().to_string().to_lowercase();
    let mobile = format!("9{:09}", rand::random::<u32>() % 1_000_000_000);
    store
        .insert_principal(&NewPrincipal {
            full_name: "Ravi Menon".to_string(),
            email: format!("ravi.{tag}@lender.in"),
            mobile_number: mobile,
            employee_id: format!("EMP-{tag}"),
            employee_code: Some(format!("RM{tag}")),
            role_id: Some(2),
            password_hash: hash_password(PASSWORD)?,
            two_step,
        })
        .await
}

#[test]
fn schema_splitter_keeps_do_blocks_whole() {
    let statements = split_sql_statements(include_str!("../sql/schema.sql"));
    assert!(statements[0].starts_with("DO $$"));
    assert!(statements[0].ends_with("$$;"));
    assert!(statements.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS revoked_tokens")));
}

#[tokio::test]
async fn lockout_is_persisted() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, false).await?;
    let verifier = CredentialVerifier::new(store.clone(), &config());
    let client = ClientContext::new("10.1.1.1", "integration");

    for _ in 0..3 {
        assert!(matches!(
            verifier.verify(&principal.mobile_number, "wrong", &client).await,
            Err(AuthError::BadCredentials)
        ));
    }
    assert!(matches!(
        verifier.verify(&principal.mobile_number, PASSWORD, &client).await,
        Err(AuthError::AccountLocked)
    ));

    let trail: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM failed_login_attempts WHERE username = $1")
            .bind(&principal.mobile_number)
            .fetch_one(&pool)
            .await?;
    assert_eq!(trail, 3);
    Ok(())
}

#[tokio::test]
async fn successful_login_resets_counter() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, false).await?;
    let verifier = CredentialVerifier::new(store.clone(), &config());
    let client = ClientContext::new("10.1.1.2", "integration");

    assert!(verifier.verify(&principal.email, "wrong", &client).await.is_err());
    let verified = verifier.verify(&principal.email, PASSWORD, &client).await?;
    assert_eq!(verified.id, principal.id);

    let (attempts, is_login): (i32, bool) =
        sqlx::query_as("SELECT failed_attempts, is_login FROM principals WHERE id = $1")
            .bind(principal.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(attempts, 0);
    assert!(is_login);
    Ok(())
}

#[tokio::test]
async fn otp_is_single_use_and_rate_limited() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, true).await?;
    let otp = OtpService::new(store.clone(), Arc::new(LogTransport), &config());

    let request = OtpRequest {
        owner: Some(principal.id),
        purpose: OtpPurpose::EmployeeLogin,
        channel: OtpChannel::Sms,
        destination: principal.mobile_number.clone(),
        suffix: None,
    };
    let issued = otp.issue(&request).await?;

    let code: String = sqlx::query_scalar(
        "SELECT code FROM one_time_codes WHERE principal_id = $1 AND request_id = $2",
    )
    .bind(principal.id)
    .bind(&issued.request_id)
    .fetch_one(&pool)
    .await?;

    let purpose = OtpPurpose::EmployeeLogin;
    otp.validate(Some(principal.id), &issued.request_id, &code, purpose)
        .await?;
    assert!(matches!(
        otp.validate(Some(principal.id), &issued.request_id, &code, purpose)
            .await,
        Err(AuthError::OtpAlreadyUsed)
    ));
    assert!(matches!(otp.resend(&request).await, Err(AuthError::OtpCooldown)));

    let dispatched: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM otp_dispatch_log WHERE request_id = $1")
            .bind(&issued.request_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(dispatched, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failed_logins_are_all_counted() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, false).await?;
    let config = config().with_max_login_attempts(20);
    let verifier = Arc::new(CredentialVerifier::new(store.clone(), &config));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let verifier = verifier.clone();
            let mobile = principal.mobile_number.clone();
            tokio::spawn(async move {
                let client = ClientContext::new("10.1.1.4", "integration");
                verifier.verify(&mobile, "wrong", &client).await
            })
        })
        .collect();
    for handle in handles {
        assert!(matches!(handle.await?, Err(AuthError::BadCredentials)));
    }

    let attempts: i32 = sqlx::query_scalar("SELECT failed_attempts FROM principals WHERE id = $1")
        .bind(principal.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(attempts, 8);
    let trail: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM failed_login_attempts WHERE username = $1")
            .bind(&principal.mobile_number)
            .fetch_one(&pool)
            .await?;
    assert_eq!(trail, 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_otp_validation_consumes_code_once() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, true).await?;
    let otp = Arc::new(OtpService::new(store.clone(), Arc::new(LogTransport), &config()));

    let issued = otp
        .issue(&OtpRequest {
            owner: Some(principal.id),
            purpose: OtpPurpose::EmployeeLogin,
            channel: OtpChannel::Sms,
            destination: principal.mobile_number.clone(),
            suffix: None,
        })
        .await?;
    let code: String = sqlx::query_scalar(
        "SELECT code FROM one_time_codes WHERE principal_id = $1 AND request_id = $2",
    )
    .bind(principal.id)
    .bind(&issued.request_id)
    .fetch_one(&pool)
    .await?;

    let owner = principal.id;
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let otp = otp.clone();
            let request_id = issued.request_id.clone();
            let code = code.clone();
            tokio::spawn(async move {
                otp.validate(Some(owner), &request_id, &code, OtpPurpose::EmployeeLogin)
                    .await
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await?);
    }

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(AuthError::OtpAlreadyUsed)))
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn session_binding_and_revocation() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, false).await?;
    let sessions = SessionRegistry::new(store.clone(), &config());
    let revocations = RevocationList::new(store.clone());

    let access = format!("access-{}", Ulid::new());
    let refresh = format!("refresh-{}", Ulid::new());
    let client = ClientContext::new("10.1.1.3", "integration");

    let created = sessions
        .create_session(principal.id, 1, &access, &client)
        .await?;
    let bound = sessions
        .find_bound_session(principal.id, &client.fingerprint)
        .await?
        .context("session not bound")?;
    assert_eq!(bound.session_id, created.session_id);
    assert_eq!(bound.token_hash, hash_token(&access));

    let elsewhere = ClientContext::new("10.9.9.9", "integration");
    assert!(sessions
        .find_bound_session(principal.id, &elsewhere.fingerprint)
        .await?
        .is_none());

    let expires_at = Utc::now() + Duration::hours(1);
    sessions
        .end_session(
            &bound,
            [
                RevokedToken {
                    token_hash: hash_token(&access),
                    principal_id: principal.id,
                    expires_at,
                },
                RevokedToken {
                    token_hash: hash_token(&refresh),
                    principal_id: principal.id,
                    expires_at,
                },
            ],
        )
        .await?;

    assert!(sessions
        .find_bound_session(principal.id, &client.fingerprint)
        .await?
        .is_none());
    assert!(revocations.is_revoked(&access, principal.id).await?);
    assert!(revocations.is_revoked(&refresh, principal.id).await?);
    assert!(!revocations.revoke(&access, principal.id, expires_at).await?);
    Ok(())
}

#[tokio::test]
async fn prune_removes_only_expired_revocations() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = Arc::new(PgStore::new(pool.clone()));
    let principal = seed(&store, false).await?;
    let revocations = RevocationList::new(store.clone());

    let stale = format!("stale-{}", Ulid::new());
    let live = format!("live-{}", Ulid::new());
    assert!(revocations
        .revoke(&stale, principal.id, Utc::now() - Duration::minutes(5))
        .await?);
    assert!(revocations
        .revoke(&live, principal.id, Utc::now() + Duration::minutes(5))
        .await?);

    assert!(revocations.prune_expired().await? >= 1);
    assert!(!revocations.is_revoked(&stale, principal.id).await?);
    assert!(revocations.is_revoked(&live, principal.id).await?);
    Ok(())
}
