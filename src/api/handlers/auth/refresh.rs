use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::auth::{AuthError, TokenType, error::ErrorBody};

use super::state::AuthState;
use super::types::{RefreshRequest, RefreshResponse};

/// Exchange a refresh token for a new access token. The refresh token is not
/// rotated and no new session is written.
#[utoipa::path(
    post,
    path = "/api/auth_system/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Refresh token malformed, expired, or revoked", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return AuthError::BadRequest("Missing payload").into_response();
    };

    match refresh_flow(&auth_state, request.refresh.trim()).await {
        Ok(access_token) => {
            (StatusCode::OK, Json(RefreshResponse { access_token })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn refresh_flow(state: &AuthState, refresh_token: &str) -> Result<String, AuthError> {
    let claims = state.tokens().decode(refresh_token, TokenType::Refresh)?;
    if state
        .revocations()
        .is_revoked(refresh_token, claims.user_id)
        .await?
    {
        return Err(AuthError::TokenRevoked);
    }

    let (access_token, _) = state.tokens().refresh_access(refresh_token)?;
    debug!(principal_id = claims.user_id, "access token refreshed");
    Ok(access_token)
}
