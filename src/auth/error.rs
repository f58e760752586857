//! Caller-facing authentication errors and their HTTP mapping.
//!
//! Every expected state (lockout, expiry, revocation, portal scoping) has its own
//! variant with a stable `code`, so clients can tell them apart from server faults.
//! Persistence failures travel as `Internal` and are logged, never echoed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    UnknownIdentifier,
    #[error("account locked after too many failed login attempts")]
    AccountLocked,
    #[error("invalid credentials")]
    BadCredentials,
    #[error("authentication credentials were not provided")]
    MissingCredentials,
    #[error("otp not found")]
    OtpNotFound,
    #[error("otp already used")]
    OtpAlreadyUsed,
    #[error("invalid otp")]
    OtpIncorrect,
    #[error("otp expired")]
    OtpExpired,
    #[error("an otp was sent recently, retry later")]
    OtpCooldown,
    #[error("malformed token")]
    MalformedToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token is not valid for this portal")]
    PortalMismatch,
    #[error("unknown portal")]
    UnknownPortal,
    #[error("invalid path")]
    InvalidPath,
    #[error("no active session for this device")]
    SessionNotBound,
    #[error("token does not belong to the active session")]
    SessionTokenMismatch,
    #[error("user not found")]
    UnknownPrincipal,
    #[error("token user not found or inactive")]
    InactivePrincipal,
    #[error("invalid portal id")]
    InvalidPortalId,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownIdentifier
            | Self::BadCredentials
            | Self::MissingCredentials
            | Self::OtpAlreadyUsed
            | Self::OtpIncorrect
            | Self::OtpExpired
            | Self::MalformedToken
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::UnknownPortal
            | Self::InvalidPath
            | Self::SessionNotBound
            | Self::InactivePrincipal => StatusCode::UNAUTHORIZED,
            Self::AccountLocked | Self::PortalMismatch | Self::SessionTokenMismatch => {
                StatusCode::FORBIDDEN
            }
            Self::OtpNotFound | Self::UnknownPrincipal => StatusCode::NOT_FOUND,
            Self::InvalidPortalId | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::OtpCooldown => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code. Unknown identifiers and wrong secrets share
    /// one code so responses never reveal whether an account exists.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownIdentifier | Self::BadCredentials => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::MissingCredentials => "missing_credentials",
            Self::OtpNotFound => "otp_not_found",
            Self::OtpAlreadyUsed => "otp_already_used",
            Self::OtpIncorrect => "otp_incorrect",
            Self::OtpExpired => "otp_expired",
            Self::OtpCooldown => "otp_cooldown",
            Self::MalformedToken => "malformed_token",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::PortalMismatch => "portal_mismatch",
            Self::UnknownPortal => "unknown_portal",
            Self::InvalidPath => "invalid_path",
            Self::SessionNotBound => "session_not_bound",
            Self::SessionTokenMismatch => "session_token_mismatch",
            Self::UnknownPrincipal => "unknown_principal",
            Self::InactivePrincipal => "user_not_found",
            Self::InvalidPortalId => "invalid_portal_id",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// JSON body returned for every auth failure.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub status: String,
    pub status_code: u16,
    pub code: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                error!("auth internal error: {err:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            status: "error".to_string(),
            status_code: status.as_u16(),
            code: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn lockout_and_credentials_have_distinct_statuses() {
        assert_eq!(AuthError::AccountLocked.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::BadCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::UnknownIdentifier.code(),
            AuthError::BadCredentials.code()
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = AuthError::Internal(anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn vanished_token_user_is_unauthorized() {
        assert_eq!(AuthError::InactivePrincipal.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::UnknownPrincipal.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn expected_states_are_not_server_errors() {
        for err in [
            AuthError::AccountLocked,
            AuthError::OtpExpired,
            AuthError::TokenRevoked,
            AuthError::PortalMismatch,
            AuthError::SessionNotBound,
            AuthError::InactivePrincipal,
        ] {
            assert!(err.status().is_client_error(), "{err} should be a client error");
        }
    }
}
