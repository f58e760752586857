//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{config::DEFAULT_PORTAL_ID, models::OtpPurpose};

const fn default_portal_id() -> i64 {
    DEFAULT_PORTAL_ID
}

const fn default_resend_purpose() -> OtpPurpose {
    OtpPurpose::EmployeeLogin
}

/// Password login. `username`/`password` are accepted as aliases.
#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub identifier: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default = "default_portal_id")]
    pub portal_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpChallengeResponse {
    pub user_id: i64,
    pub request_id: String,
    pub otp_expiry: DateTime<Utc>,
    pub two_step: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub user_id: i64,
    pub otp_code: String,
    pub request_id: String,
    #[serde(default = "default_portal_id")]
    pub portal_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub user_id: i64,
    #[serde(default = "default_resend_purpose")]
    pub purpose: OtpPurpose,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpIssuedResponse {
    pub request_id: String,
    pub otp_expiry: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LeadLoginRequest {
    pub mobile_number: String,
    pub portal_id: i64,
    /// Appended to the SMS so the mobile app can autofill the code.
    #[serde(default)]
    pub app_signature: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LeadLoginResponse {
    pub user_id: i64,
    pub portal_id: i64,
    pub request_id: String,
    pub otp_expiry: DateTime<Utc>,
}

#[derive(ToSchema, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(ToSchema, Deserialize)]
pub struct LogoutRequest {
    #[serde(alias = "refresh_token")]
    pub refresh: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub success: bool,
}
