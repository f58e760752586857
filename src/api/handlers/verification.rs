//! Out-of-band contact verification for the lead portal.
//!
//! A signed-in lead proves ownership of a mobile number or email address by
//! echoing back a one-time code. Email codes use the short validity window.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{
    AuthError, OtpRequest,
    error::ErrorBody,
    models::{OtpChannel, OtpPurpose},
};

use super::auth::{AuthState, AuthenticatedPrincipal};
use super::{valid_email, valid_mobile};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationOtpRequest {
    pub channel: OtpChannel,
    pub destination: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationOtpResponse {
    pub request_id: String,
    pub otp_expiry: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationConfirmRequest {
    pub request_id: String,
    pub otp_code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationConfirmResponse {
    pub verified: bool,
}

#[utoipa::path(
    post,
    path = "/api/lead/verification/otp",
    request_body = VerificationOtpRequest,
    responses(
        (status = 200, description = "Verification code sent", body = VerificationOtpResponse),
        (status = 400, description = "Invalid destination", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Token minted for another portal", body = ErrorBody),
        (status = 429, description = "Cooldown active", body = ErrorBody)
    ),
    tag = "lead"
)]
pub async fn request_verification_otp(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    payload: Option<Json<VerificationOtpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    let destination = request.destination.trim();
    let valid = match request.channel {
        OtpChannel::Sms => valid_mobile(destination),
        OtpChannel::Email => valid_email(destination),
    };
    if !valid {
        return AuthError::BadRequest("Invalid destination").into_response();
    }

    let issued = auth_state
        .otp()
        .resend(&OtpRequest {
            owner: Some(principal.user_id()),
            purpose: OtpPurpose::LeadVerification,
            channel: request.channel,
            destination: destination.to_string(),
            suffix: None,
        })
        .await;

    match issued {
        Ok(issued) => (
            StatusCode::OK,
            Json(VerificationOtpResponse {
                request_id: issued.request_id,
                otp_expiry: issued.expires_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/lead/verification/otp/verify",
    request_body = VerificationConfirmRequest,
    responses(
        (status = 200, description = "Contact verified", body = VerificationConfirmResponse),
        (status = 401, description = "OTP incorrect, expired, or already used", body = ErrorBody),
        (status = 404, description = "Unknown OTP request", body = ErrorBody)
    ),
    tag = "lead"
)]
pub async fn confirm_verification_otp(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    payload: Option<Json<VerificationConfirmRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match auth_state
        .otp()
        .validate(
            Some(principal.user_id()),
            &request.request_id,
            &request.otp_code,
            OtpPurpose::LeadVerification,
        )
        .await
    {
        Ok(code) => {
            info!(
                principal_id = principal.user_id(),
                request_id = %code.request_id,
                "lead contact verified"
            );
            (StatusCode::OK, Json(VerificationConfirmResponse { verified: true })).into_response()
        }
        Err(err) => err.into_response(),
    }
}
