//! OTP-based endpoints: two-step completion, resend, and lead login.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::valid_mobile;
use crate::auth::{
    AuthError, IssuedOtp, OtpRequest,
    error::ErrorBody,
    models::{ClientContext, Identifier, OtpChannel, OtpPurpose, PrincipalRecord},
};

use super::state::AuthState;
use super::types::{
    LeadLoginRequest, LeadLoginResponse, OtpIssuedResponse, ResendOtpRequest, TokenResponse,
    VerifyOtpRequest,
};

/// Complete an employee two-step login.
#[utoipa::path(
    post,
    path = "/api/auth_system/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP accepted, tokens issued", body = TokenResponse),
        (status = 400, description = "Missing payload or unknown portal", body = ErrorBody),
        (status = 401, description = "OTP incorrect, expired, or already used", body = ErrorBody),
        (status = 404, description = "Unknown user or OTP request", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    auth_state: Extension<Arc<AuthState>>,
    client: ClientContext,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match complete_otp_login(&auth_state, &client, &request, OtpPurpose::EmployeeLogin).await {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Complete a lead login started with `lead-login`.
#[utoipa::path(
    post,
    path = "/api/auth_system/lead-verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP accepted, tokens issued", body = TokenResponse),
        (status = 400, description = "Missing payload or unknown portal", body = ErrorBody),
        (status = 401, description = "OTP incorrect, expired, or already used", body = ErrorBody),
        (status = 404, description = "Unknown user or OTP request", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn lead_verify_otp(
    auth_state: Extension<Arc<AuthState>>,
    client: ClientContext,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match complete_otp_login(&auth_state, &client, &request, OtpPurpose::CustomerLogin).await {
        Ok(mut tokens) => {
            tokens.employee_id = None;
            (StatusCode::OK, Json(tokens)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn complete_otp_login(
    state: &AuthState,
    client: &ClientContext,
    request: &VerifyOtpRequest,
    purpose: OtpPurpose,
) -> Result<TokenResponse, AuthError> {
    state.ensure_known_portal(request.portal_id)?;
    let principal = find_principal(state, request.user_id).await?;

    state
        .otp()
        .validate(
            Some(principal.id),
            &request.request_id,
            &request.otp_code,
            purpose,
        )
        .await?;
    state.principals().reset_failed_attempts(principal.id).await?;

    let pair = state
        .open_session(&principal, request.portal_id, client)
        .await?;
    info!(principal_id = principal.id, portal_id = request.portal_id, "otp login succeeded");

    Ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        employee_id: Some(principal.employee_id),
    })
}

/// Send a fresh code for an outstanding challenge. Refused inside the cooldown.
#[utoipa::path(
    post,
    path = "/api/auth_system/resend-otp",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "New OTP sent", body = OtpIssuedResponse),
        (status = 400, description = "Missing payload or no mobile number", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody),
        (status = 429, description = "Cooldown active", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendOtpRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match resend_flow(&auth_state, request).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(OtpIssuedResponse {
                request_id: issued.request_id,
                otp_expiry: issued.expires_at,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn resend_flow(state: &AuthState, request: ResendOtpRequest) -> Result<IssuedOtp, AuthError> {
    let principal = find_principal(state, request.user_id).await?;
    if principal.mobile_number.trim().is_empty() {
        return Err(AuthError::BadRequest("No mobile number on file"));
    }
    state
        .otp()
        .resend(&OtpRequest {
            owner: Some(principal.id),
            purpose: request.purpose,
            channel: OtpChannel::Sms,
            destination: principal.mobile_number,
            suffix: None,
        })
        .await
}

/// Start a passwordless lead login: an SMS code goes to the registered number.
#[utoipa::path(
    post,
    path = "/api/auth_system/lead-login",
    request_body = LeadLoginRequest,
    responses(
        (status = 200, description = "OTP sent", body = LeadLoginResponse),
        (status = 400, description = "Invalid mobile number or portal", body = ErrorBody),
        (status = 401, description = "Unknown mobile number", body = ErrorBody),
        (status = 403, description = "Account locked", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn lead_login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LeadLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match lead_login_flow(&auth_state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn lead_login_flow(
    state: &AuthState,
    request: LeadLoginRequest,
) -> Result<LeadLoginResponse, AuthError> {
    state.ensure_known_portal(request.portal_id)?;
    let mobile = request.mobile_number.trim();
    if !valid_mobile(mobile) {
        return Err(AuthError::BadRequest("Invalid mobile number"));
    }

    let Some(principal) = state
        .principals()
        .find_principal(&Identifier::Mobile(mobile.to_string()))
        .await?
    else {
        return Err(AuthError::UnknownIdentifier);
    };
    state.credentials().ensure_not_locked(&principal)?;

    let suffix = request
        .app_signature
        .as_deref()
        .map(str::trim)
        .filter(|signature| !signature.is_empty())
        .map(ToString::to_string);
    let issued = state
        .otp()
        .issue(&OtpRequest {
            owner: Some(principal.id),
            purpose: OtpPurpose::CustomerLogin,
            channel: OtpChannel::Sms,
            destination: principal.mobile_number.clone(),
            suffix,
        })
        .await?;
    info!(principal_id = principal.id, "lead login challenge sent");

    Ok(LeadLoginResponse {
        user_id: principal.id,
        portal_id: request.portal_id,
        request_id: issued.request_id,
        otp_expiry: issued.expires_at,
    })
}

async fn find_principal(
    state: &AuthState,
    principal_id: i64,
) -> Result<PrincipalRecord, AuthError> {
    state
        .principals()
        .find_principal_by_id(principal_id)
        .await?
        .ok_or(AuthError::UnknownPrincipal)
}
