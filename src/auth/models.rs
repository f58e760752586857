use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Row, postgres::PgRow};
use utoipa::ToSchema;
use uuid::Uuid;

fn invalid_enum(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} value: {value}"),
    )))
}

/// How a login identifier is resolved against the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Mobile(String),
    Email(String),
    Username(String),
}

impl Identifier {
    /// Exactly ten ASCII digits is a mobile number, anything with `@` is an
    /// email, everything else falls back to the employee code.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let value = raw.trim();
        if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
            Self::Mobile(value.to_string())
        } else if value.contains('@') {
            Self::Email(value.to_lowercase())
        } else {
            Self::Username(value.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mobile(value) | Self::Email(value) | Self::Username(value) => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub employee_id: String,
    pub employee_code: Option<String>,
    pub role_id: Option<i64>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub failed_attempts: i32,
    pub two_step: bool,
    pub is_login: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

impl PrincipalRecord {
    /// Public fields captured on failed login audit rows.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "employee_id": self.employee_id,
            "employee_code": self.employee_code,
            "mobile_number": self.mobile_number,
            "email": self.email,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for PrincipalRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            mobile_number: row.try_get("mobile_number")?,
            employee_id: row.try_get("employee_id")?,
            employee_code: row.try_get("employee_code")?,
            role_id: row.try_get("role_id")?,
            password_hash: row.try_get("password_hash")?,
            failed_attempts: row.try_get("failed_attempts")?,
            two_step: row.try_get("two_step")?,
            is_login: row.try_get("is_login")?,
            last_activity: row.try_get("last_activity")?,
        })
    }
}

/// Provisioning input, used by seeding and tests.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub employee_id: String,
    pub employee_code: Option<String>,
    pub role_id: Option<i64>,
    pub password_hash: String,
    pub two_step: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    CustomerLogin,
    FdLogin,
    EmployeeLogin,
    LeadVerification,
}

impl OtpPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CustomerLogin => "customer_login",
            Self::FdLogin => "fd_login",
            Self::EmployeeLogin => "employee_login",
            Self::LeadVerification => "lead_verification",
        }
    }

    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "customer_login" => Ok(Self::CustomerLogin),
            "fd_login" => Ok(Self::FdLogin),
            "employee_login" => Ok(Self::EmployeeLogin),
            "lead_verification" => Ok(Self::LeadVerification),
            _ => Err(invalid_enum("otp purpose", value)),
        }
    }
}

/// Lifecycle of a one-time code. `Delivered` and `Failed` describe dispatch
/// outcomes only; validation moves `Pending` to `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Verified,
    Expired,
    Cancelled,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Verified => "verified",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "verified" => Ok(Self::Verified),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(invalid_enum("delivery status", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    Sms,
    Email,
}

impl OtpChannel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: i64,
    pub principal_id: Option<i64>,
    pub purpose: OtpPurpose,
    pub code: String,
    pub request_id: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OneTimeCode {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let purpose: String = row.try_get("purpose")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            principal_id: row.try_get("principal_id")?,
            purpose: OtpPurpose::from_db(&purpose)?,
            code: row.try_get("code")?,
            request_id: row.try_get("request_id")?,
            status: DeliveryStatus::from_db(&status)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            verified_at: row.try_get("verified_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewOneTimeCode {
    pub principal_id: Option<i64>,
    pub purpose: OtpPurpose,
    pub code: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Audit row written after each transport attempt.
#[derive(Debug, Clone)]
pub struct OtpDispatch {
    pub principal_id: Option<i64>,
    pub channel: OtpChannel,
    pub destination: String,
    pub purpose: OtpPurpose,
    pub message: String,
    pub request_id: String,
    pub status: DeliveryStatus,
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub ip_address: String,
    pub user_agent: String,
}

/// Who is calling: device fingerprint plus a snapshot of the request headers.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub fingerprint: DeviceFingerprint,
    pub headers: Value,
}

impl ClientContext {
    #[must_use]
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            fingerprint: DeviceFingerprint {
                ip_address: ip_address.into(),
                user_agent: user_agent.into(),
            },
            headers: Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Value) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub principal_id: i64,
    pub portal_id: i64,
    pub token: String,
    #[serde(skip)]
    pub token_hash: Vec<u8>,
    pub ip_address: String,
    pub user_agent: String,
    pub request_headers: Value,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    pub expiry_at: DateTime<Utc>,
    pub is_active: bool,
}

impl SessionRecord {
    #[must_use]
    pub fn fingerprint(&self) -> DeviceFingerprint {
        DeviceFingerprint {
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<'r> FromRow<'r, PgRow> for SessionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            principal_id: row.try_get("principal_id")?,
            portal_id: row.try_get("portal_id")?,
            token: row.try_get("token")?,
            token_hash: row.try_get("token_hash")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            request_headers: row.try_get("request_headers")?,
            login_at: row.try_get("login_at")?,
            logout_at: row.try_get("logout_at")?,
            expiry_at: row.try_get("expiry_at")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: Uuid,
    pub principal_id: i64,
    pub portal_id: i64,
    pub token: String,
    pub token_hash: Vec<u8>,
    pub fingerprint: DeviceFingerprint,
    pub request_headers: Value,
    pub login_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
}

/// A revoked token keyed by the hash of the full token string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedToken {
    pub token_hash: Vec<u8>,
    pub principal_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FailedLoginAttempt {
    pub username: String,
    pub ip: String,
    pub user_agent: String,
    pub principal_snapshot: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_ten_digits_as_mobile() {
        assert_eq!(
            Identifier::classify("9876543210"),
            Identifier::Mobile("9876543210".to_string())
        );
    }

    #[test]
    fn classify_other_digit_lengths_as_username() {
        assert_eq!(
            Identifier::classify("987654321"),
            Identifier::Username("987654321".to_string())
        );
        assert_eq!(
            Identifier::classify("98765432101"),
            Identifier::Username("98765432101".to_string())
        );
    }

    #[test]
    fn classify_email_lowercases() {
        assert_eq!(
            Identifier::classify(" Asha@Lender.IN "),
            Identifier::Email("asha@lender.in".to_string())
        );
    }

    #[test]
    fn classify_fallback_username() {
        assert_eq!(
            Identifier::classify("EMP-0042"),
            Identifier::Username("EMP-0042".to_string())
        );
    }

    #[test]
    fn enum_db_values_parse() {
        assert!(matches!(
            OtpPurpose::from_db("lead_verification"),
            Ok(OtpPurpose::LeadVerification)
        ));
        assert!(OtpPurpose::from_db("unknown").is_err());
        assert!(matches!(
            DeliveryStatus::from_db("verified"),
            Ok(DeliveryStatus::Verified)
        ));
        assert!(DeliveryStatus::from_db("sent").is_err());
    }
}
