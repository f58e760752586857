//! Employee password login.
//!
//! Flow Overview: verify credentials (lockout enforced before the password is
//! checked), then either send an SMS one-time code for two-step accounts or
//! mint tokens and write the device-bound session.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::auth::{
    AuthError, OtpRequest,
    error::ErrorBody,
    models::{ClientContext, OtpChannel, OtpPurpose},
};

use super::state::AuthState;
use super::types::{LoginRequest, OtpChallengeResponse, TokenResponse};

#[utoipa::path(
    post,
    path = "/api/auth_system/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued, or an OTP challenge for two-step accounts", body = TokenResponse),
        (status = 400, description = "Missing payload or unknown portal", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account locked", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    client: ClientContext,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match login_flow(&auth_state, &client, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn login_flow(
    state: &AuthState,
    client: &ClientContext,
    request: LoginRequest,
) -> Result<Response, AuthError> {
    state.ensure_known_portal(request.portal_id)?;

    let principal = state
        .credentials()
        .verify(&request.identifier, &request.secret, client)
        .await?;

    if principal.two_step {
        let issued = state
            .otp()
            .issue(&OtpRequest {
                owner: Some(principal.id),
                purpose: OtpPurpose::EmployeeLogin,
                channel: OtpChannel::Sms,
                destination: principal.mobile_number.clone(),
                suffix: None,
            })
            .await?;
        info!(principal_id = principal.id, "two-step challenge sent");
        return Ok((
            StatusCode::OK,
            Json(OtpChallengeResponse {
                user_id: principal.id,
                request_id: issued.request_id,
                otp_expiry: issued.expires_at,
                two_step: true,
            }),
        )
            .into_response());
    }

    let pair = state
        .open_session(&principal, request.portal_id, client)
        .await?;
    info!(principal_id = principal.id, portal_id = request.portal_id, "login succeeded");

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            employee_id: Some(principal.employee_id),
        }),
    )
        .into_response())
}
