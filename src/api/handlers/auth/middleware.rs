//! Portal guard middleware.
//!
//! `require_portal_token` is the basic tier: a valid access token whose portal
//! claim matches the path. `require_bound_session` is the strict tier: the
//! token must also be unrevoked and be the token of a live session for the
//! caller's IP and user agent. Both tiers reject tokens whose principal is gone
//! or soft-deleted, refresh `last_activity`, and hand the verified principal to
//! handlers through request extensions.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::auth::{
    AuthError, TokenType,
    models::{ClientContext, SessionRecord},
};

use super::client::extract_bearer_token;
use super::principal::AuthenticatedPrincipal;
use super::state::AuthState;

pub async fn require_portal_token(
    auth_state: Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer(&request) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    let path = request.uri().path().to_string();
    let principal = match basic_tier(&auth_state, token, &path).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    auth_state.touch_activity(principal.user_id()).await;
    request.extensions_mut().insert(principal);
    next.run(request).await
}

pub async fn require_bound_session(
    auth_state: Extension<Arc<AuthState>>,
    client: ClientContext,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer(&request) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    let path = request.uri().path().to_string();
    let (principal, session) = match strict_tier(&auth_state, token, &path, &client).await {
        Ok(found) => found,
        Err(err) => return err.into_response(),
    };

    auth_state.touch_activity(principal.user_id()).await;
    request.extensions_mut().insert(principal);
    request.extensions_mut().insert(session);
    next.run(request).await
}

fn bearer(request: &Request) -> Result<String, AuthError> {
    extract_bearer_token(request.headers())
        .map(ToString::to_string)
        .ok_or(AuthError::MissingCredentials)
}

async fn basic_tier(
    state: &AuthState,
    token: String,
    path: &str,
) -> Result<AuthenticatedPrincipal, AuthError> {
    let claims = state.tokens().decode(&token, TokenType::Access)?;
    state.active_principal(claims.user_id).await?;
    let scope = state.guard().check(path, &claims)?;
    Ok(AuthenticatedPrincipal {
        claims,
        token,
        scope,
    })
}

async fn strict_tier(
    state: &AuthState,
    token: String,
    path: &str,
    client: &ClientContext,
) -> Result<(AuthenticatedPrincipal, SessionRecord), AuthError> {
    // Revocation is looked up before expiry and type are validated.
    if let Some(subject) = state.tokens().subject(&token) {
        state
            .guard()
            .ensure_not_revoked(&token, subject, state.revocations())
            .await?;
    }

    let claims = state.tokens().decode(&token, TokenType::Access)?;
    state.active_principal(claims.user_id).await?;
    let session = state
        .guard()
        .check_strict(path, &token, &claims, &client.fingerprint, state.sessions())
        .await?;
    let scope = state.guard().required_portal(path)?;
    Ok((AuthenticatedPrincipal { claims, token, scope }, session))
}
