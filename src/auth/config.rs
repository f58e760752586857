//! Immutable auth configuration and the static portal namespace map.

use secrecy::SecretString;
use std::collections::HashMap;

pub const DEFAULT_MAX_LOGIN_ATTEMPTS: i32 = 3;
pub const DEFAULT_PORTAL_ID: i64 = 1;
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_OTP_SHORT_TTL_SECONDS: i64 = 3 * 60;
const DEFAULT_OTP_RESEND_COOLDOWN_SECONDS: i64 = 30;
const DEFAULT_LAST_ACTIVITY_THRESHOLD_SECONDS: i64 = 30;
const DEFAULT_REVOCATION_PRUNE_SECONDS: u64 = 60 * 60;

const DEFAULT_PORTALS: [(&str, i64); 5] = [
    ("ems", 1),
    ("cms", 2),
    ("lead", 3),
    ("dedup", 4),
    ("code_of_conduct", 5),
];

const DEFAULT_EXEMPT_NAMESPACES: [&str; 5] =
    ["auth_system", "api-docs", "swagger", "redoc", "health"];

/// Portal name to portal id lookup. Names are matched case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalMap {
    by_name: HashMap<String, i64>,
}

impl PortalMap {
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let by_name = entries
            .into_iter()
            .map(|(name, id)| (name.into().to_lowercase(), id))
            .collect();
        Self { by_name }
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn contains_id(&self, portal_id: i64) -> bool {
        self.by_name.values().any(|id| *id == portal_id)
    }

    #[must_use]
    pub fn name_of(&self, portal_id: i64) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, id)| **id == portal_id)
            .map(|(name, _)| name.as_str())
    }
}

impl Default for PortalMap {
    fn default() -> Self {
        Self::new(DEFAULT_PORTALS)
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    max_login_attempts: i32,
    otp_ttl_seconds: i64,
    otp_short_ttl_seconds: i64,
    otp_resend_cooldown_seconds: i64,
    last_activity_threshold_seconds: i64,
    revocation_prune_seconds: u64,
    portals: PortalMap,
    exempt_namespaces: Vec<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_short_ttl_seconds: DEFAULT_OTP_SHORT_TTL_SECONDS,
            otp_resend_cooldown_seconds: DEFAULT_OTP_RESEND_COOLDOWN_SECONDS,
            last_activity_threshold_seconds: DEFAULT_LAST_ACTIVITY_THRESHOLD_SECONDS,
            revocation_prune_seconds: DEFAULT_REVOCATION_PRUNE_SECONDS,
            portals: PortalMap::default(),
            exempt_namespaces: DEFAULT_EXEMPT_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: i32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_short_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_short_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.otp_resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_last_activity_threshold_seconds(mut self, seconds: i64) -> Self {
        self.last_activity_threshold_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_revocation_prune_seconds(mut self, seconds: u64) -> Self {
        self.revocation_prune_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_portals(mut self, portals: PortalMap) -> Self {
        self.portals = portals;
        self
    }

    #[must_use]
    pub fn with_exempt_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.exempt_namespaces = namespaces
            .into_iter()
            .map(|namespace| namespace.to_lowercase())
            .collect();
        self
    }

    pub(crate) fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> i32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_short_ttl_seconds(&self) -> i64 {
        self.otp_short_ttl_seconds
    }

    #[must_use]
    pub fn otp_resend_cooldown_seconds(&self) -> i64 {
        self.otp_resend_cooldown_seconds
    }

    #[must_use]
    pub fn last_activity_threshold_seconds(&self) -> i64 {
        self.last_activity_threshold_seconds
    }

    #[must_use]
    pub fn revocation_prune_seconds(&self) -> u64 {
        self.revocation_prune_seconds
    }

    #[must_use]
    pub fn portals(&self) -> &PortalMap {
        &self.portals
    }

    #[must_use]
    pub fn exempt_namespaces(&self) -> &[String] {
        &self.exempt_namespaces
    }
}
