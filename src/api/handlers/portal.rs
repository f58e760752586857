//! Portal-scoped endpoints. Reachable only through the portal guards, which
//! leave the verified principal (and for the strict tier, the bound session)
//! in request extensions.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{PortalScope, error::ErrorBody, models::SessionRecord};

use super::auth::{AuthState, AuthenticatedPrincipal};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WhoAmIResponse {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub role_id: Option<i64>,
    pub portal_id: Option<i64>,
    pub portal: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub portal_id: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub login_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
}

/// Claims of the calling token, resolved against the path's portal.
#[utoipa::path(
    get,
    path = "/api/{portal}/whoami",
    params(
        ("portal" = String, Path, description = "Portal name, e.g. ems or lead")
    ),
    responses(
        (status = 200, description = "Caller identity", body = WhoAmIResponse),
        (status = 401, description = "Missing, malformed, or expired token", body = ErrorBody),
        (status = 403, description = "Token minted for another portal", body = ErrorBody)
    ),
    tag = "portal"
)]
pub async fn whoami(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
) -> impl IntoResponse {
    let portal_id = match principal.scope {
        PortalScope::Portal(id) => Some(id),
        PortalScope::Unscoped => None,
    };
    let portal = portal_id
        .and_then(|id| auth_state.config().portals().name_of(id))
        .map(ToString::to_string);

    let claims = principal.claims;
    (
        StatusCode::OK,
        Json(WhoAmIResponse {
            user_id: claims.user_id,
            full_name: claims.full_name,
            email: claims.email,
            mobile_number: claims.mobile_number,
            role_id: claims.role_id,
            portal_id,
            portal,
        }),
    )
}

/// The live session this device is bound to.
#[utoipa::path(
    get,
    path = "/api/{portal}/session",
    params(
        ("portal" = String, Path, description = "Portal name, e.g. ems or lead")
    ),
    responses(
        (status = 200, description = "Bound session", body = SessionSummary),
        (status = 401, description = "Token revoked, or not the token of this device's session", body = ErrorBody),
        (status = 403, description = "Token minted for another portal", body = ErrorBody)
    ),
    tag = "portal"
)]
pub async fn session(Extension(session): Extension<SessionRecord>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(SessionSummary {
            session_id: session.session_id,
            portal_id: session.portal_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            login_at: session.login_at,
            expiry_at: session.expiry_at,
        }),
    )
}
