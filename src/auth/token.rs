//! Access and refresh token minting.
//!
//! Both tokens are HS256 JWTs carrying the same identity and portal claims.
//! Issuance is pure: no I/O, so it can run before anything is persisted.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{config::AuthConfig, error::AuthError, models::PrincipalRecord};

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub mobile_number: String,
    pub email: String,
    pub full_name: String,
    pub role_id: Option<i64>,
    /// Kept loose so a missing or non-numeric claim is reported by the portal
    /// guard instead of failing the whole decode.
    #[serde(default)]
    pub portal_id: Value,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// Integer portal claim. Accepts a JSON number or a numeric string.
    ///
    /// # Errors
    /// Returns `MalformedToken` if the claim is missing or not an integer.
    pub fn portal_id(&self) -> Result<i64, AuthError> {
        match &self.portal_id {
            Value::Number(number) => number.as_i64().ok_or(AuthError::MalformedToken),
            Value::String(text) => text.trim().parse().map_err(|_| AuthError::MalformedToken),
            _ => Err(AuthError::MalformedToken),
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(config.access_token_ttl_seconds()),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_seconds()),
        }
    }

    /// Mint an access and refresh token for `principal` scoped to `portal_id`.
    ///
    /// # Errors
    /// Returns `Internal` only if JWT encoding fails.
    pub fn issue(
        &self,
        principal: &PrincipalRecord,
        portal_id: i64,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = self.claims_for(principal, portal_id, TokenType::Access, now);
        let refresh = self.claims_for(principal, portal_id, TokenType::Refresh, now);
        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Validate signature, expiry, and token type.
    ///
    /// # Errors
    /// `TokenExpired` for an expired token, `MalformedToken` for anything else
    /// that does not verify or has the wrong type.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::MalformedToken,
            }
        })?;

        if data.claims.token_type != expected {
            return Err(AuthError::MalformedToken);
        }
        Ok(data.claims)
    }

    /// Principal a correctly signed token was minted for, even once expired.
    /// `None` when the signature does not verify.
    #[must_use]
    pub fn subject(&self, token: &str) -> Option<i64> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = false;
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims.user_id)
    }

    /// Mint a new access token carrying the claims of a valid refresh token.
    /// The refresh token itself is not rotated.
    ///
    /// # Errors
    /// Returns the decode error for an invalid refresh token.
    pub fn refresh_access(&self, refresh_token: &str) -> Result<(String, TokenClaims), AuthError> {
        let refresh = self.decode(refresh_token, TokenType::Refresh)?;
        let now = Utc::now();
        let access = TokenClaims {
            token_type: TokenType::Access,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            ..refresh
        };
        let token = self.sign(&access)?;
        Ok((token, access))
    }

    fn claims_for(
        &self,
        principal: &PrincipalRecord,
        portal_id: i64,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> TokenClaims {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        TokenClaims {
            user_id: principal.id,
            mobile_number: principal.mobile_number.clone(),
            email: principal.email.clone(),
            full_name: principal.full_name.clone(),
            role_id: principal.role_id,
            portal_id: Value::from(portal_id),
            token_type,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(JWT_ALGORITHM), claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign token: {err}")))
    }
}
