//! Logout: end the device-bound session and revoke both tokens.
//!
//! Flow Overview: the bearer access token and the refresh token in the body
//! must both verify and belong to the same principal. The session found for
//! the caller's fingerprint must have been opened with that access token. The
//! session end and both revocations commit together.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    AuthError, TokenType,
    error::ErrorBody,
    models::{ClientContext, RevokedToken},
    utils::hash_token,
};

use super::client::extract_bearer_token;
use super::state::AuthState;
use super::types::{LogoutRequest, LogoutResponse};

#[utoipa::path(
    post,
    path = "/api/auth_system/logout",
    request_body = LogoutRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Session ended, tokens revoked", body = LogoutResponse),
        (status = 400, description = "Missing payload or no active session for this device", body = ErrorBody),
        (status = 401, description = "Missing or invalid tokens", body = ErrorBody),
        (status = 403, description = "Access token does not belong to the session", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    client: ClientContext,
    payload: Option<Json<LogoutRequest>>,
) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::MissingCredentials.into_response();
    };
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match logout_flow(&auth_state, &client, access_token, request.refresh.trim()).await {
        Ok(()) => (StatusCode::OK, Json(LogoutResponse { success: true })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn logout_flow(
    state: &AuthState,
    client: &ClientContext,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), AuthError> {
    let access = state.tokens().decode(access_token, TokenType::Access)?;
    let refresh = state.tokens().decode(refresh_token, TokenType::Refresh)?;
    if access.user_id != refresh.user_id {
        warn!(
            access_user = access.user_id,
            refresh_user = refresh.user_id,
            "logout with tokens of different principals"
        );
        return Err(AuthError::SessionTokenMismatch);
    }

    let Some(session) = state
        .sessions()
        .find_bound_session(access.user_id, &client.fingerprint)
        .await?
    else {
        return Err(AuthError::BadRequest("No active session for this device"));
    };

    if session.token_hash != hash_token(access_token) {
        warn!(
            principal_id = access.user_id,
            session_id = %session.session_id,
            "logout token does not match the bound session"
        );
        return Err(AuthError::SessionTokenMismatch);
    }

    state
        .sessions()
        .end_session(
            &session,
            [
                RevokedToken {
                    token_hash: hash_token(access_token),
                    principal_id: access.user_id,
                    expires_at: access.expires_at(),
                },
                RevokedToken {
                    token_hash: hash_token(refresh_token),
                    principal_id: refresh.user_id,
                    expires_at: refresh.expires_at(),
                },
            ],
        )
        .await?;

    info!(principal_id = access.user_id, "logged out");
    Ok(())
}
