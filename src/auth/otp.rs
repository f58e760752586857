//! One-time code issuance and validation.
//!
//! A code row is persisted as `pending` before dispatch, so a failed delivery
//! still leaves a consultable challenge. Validation picks the newest row for
//! `(owner, request_id)` and consumes it with a compare-and-swap.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    config::AuthConfig,
    error::AuthError,
    models::{DeliveryStatus, NewOneTimeCode, OneTimeCode, OtpChannel, OtpDispatch, OtpPurpose},
    store::OtpLedger,
    transport::{OtpMessage, OtpTransport},
    utils::{generate_otp_code, generate_request_id},
};

#[derive(Clone, Debug)]
pub struct OtpRequest {
    /// `None` for flows without an authenticated owner.
    pub owner: Option<i64>,
    pub purpose: OtpPurpose,
    pub channel: OtpChannel,
    pub destination: String,
    /// Appended to the message body, e.g. an app signature for SMS autofill.
    pub suffix: Option<String>,
}

#[derive(Clone, Debug)]
pub struct IssuedOtp {
    pub request_id: String,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
}

pub struct OtpService {
    ledger: Arc<dyn OtpLedger>,
    transport: Arc<dyn OtpTransport>,
    ttl: Duration,
    short_ttl: Duration,
    resend_cooldown: Duration,
}

impl OtpService {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn OtpLedger>,
        transport: Arc<dyn OtpTransport>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            ledger,
            transport,
            ttl: Duration::seconds(config.otp_ttl_seconds()),
            short_ttl: Duration::seconds(config.otp_short_ttl_seconds()),
            resend_cooldown: Duration::seconds(config.otp_resend_cooldown_seconds()),
        }
    }

    /// Email lead verification uses the short window; everything else the default.
    #[must_use]
    pub fn ttl_for(&self, purpose: OtpPurpose, channel: OtpChannel) -> Duration {
        match (purpose, channel) {
            (OtpPurpose::LeadVerification, OtpChannel::Email) => self.short_ttl,
            _ => self.ttl,
        }
    }

    /// Mint, persist, and dispatch a new code.
    ///
    /// # Errors
    /// Returns `Internal` if the code row cannot be persisted. Transport
    /// failures are recorded and logged but do not fail issuance.
    pub async fn issue(&self, request: &OtpRequest) -> Result<IssuedOtp, AuthError> {
        let now = Utc::now();
        let ttl = self.ttl_for(request.purpose, request.channel);
        let code = self
            .ledger
            .insert_code(&NewOneTimeCode {
                principal_id: request.owner,
                purpose: request.purpose,
                code: generate_otp_code(),
                request_id: generate_request_id(),
                created_at: now,
                expires_at: now + ttl,
            })
            .await?;

        let message = OtpMessage {
            channel: request.channel,
            destination: request.destination.clone(),
            body: message_body(&code.code, ttl, request.suffix.as_deref()),
            request_id: code.request_id.clone(),
        };

        let outcome = self.transport.deliver(&message).await;
        let (status, response) = match &outcome {
            Ok(()) => (DeliveryStatus::Delivered, None),
            Err(err) => {
                warn!(
                    request_id = %code.request_id,
                    channel = request.channel.as_str(),
                    "otp dispatch failed: {err:#}"
                );
                (DeliveryStatus::Failed, Some(format!("{err:#}")))
            }
        };

        let dispatch = OtpDispatch {
            principal_id: request.owner,
            channel: request.channel,
            destination: request.destination.clone(),
            purpose: request.purpose,
            message: message.body,
            request_id: code.request_id.clone(),
            status,
            response,
        };
        if let Err(err) = self.ledger.record_dispatch(&dispatch).await {
            warn!(request_id = %code.request_id, "failed to record otp dispatch: {err:#}");
        }

        info!(
            request_id = %code.request_id,
            purpose = request.purpose.as_str(),
            delivered = outcome.is_ok(),
            "otp issued"
        );

        Ok(IssuedOtp {
            request_id: code.request_id,
            expires_at: code.expires_at,
            delivered: outcome.is_ok(),
        })
    }

    /// Re-run issuance, refusing if a code for the same owner and purpose was
    /// issued within the cooldown window.
    ///
    /// # Errors
    /// `OtpCooldown` inside the window, otherwise as [`OtpService::issue`].
    pub async fn resend(&self, request: &OtpRequest) -> Result<IssuedOtp, AuthError> {
        if self.resend_cooldown > Duration::zero() {
            let last = self
                .ledger
                .last_issued_at(request.owner, request.purpose)
                .await?;
            if let Some(last) = last {
                if Utc::now() < last + self.resend_cooldown {
                    return Err(AuthError::OtpCooldown);
                }
            }
        }
        self.issue(request).await
    }

    /// Validate and consume a code issued for `purpose`. A code issued for
    /// another purpose is treated as missing.
    ///
    /// # Errors
    /// `OtpNotFound`, `OtpAlreadyUsed`, `OtpIncorrect`, `OtpExpired` in that
    /// order of checking, or `Internal`.
    pub async fn validate(
        &self,
        owner: Option<i64>,
        request_id: &str,
        submitted: &str,
        purpose: OtpPurpose,
    ) -> Result<OneTimeCode, AuthError> {
        let Some(mut code) = self.ledger.latest_code(owner, request_id.trim()).await? else {
            return Err(AuthError::OtpNotFound);
        };
        if code.purpose != purpose {
            debug!(
                request_id = %code.request_id,
                issued_for = code.purpose.as_str(),
                presented_for = purpose.as_str(),
                "otp presented for another purpose"
            );
            return Err(AuthError::OtpNotFound);
        }

        if code.status != DeliveryStatus::Pending {
            return Err(AuthError::OtpAlreadyUsed);
        }
        if code.code.trim() != submitted.trim() {
            return Err(AuthError::OtpIncorrect);
        }

        let now = Utc::now();
        if now > code.expires_at {
            return Err(AuthError::OtpExpired);
        }

        // Losing the race to a concurrent validation counts as already used.
        if !self.ledger.mark_verified(code.id, now).await? {
            return Err(AuthError::OtpAlreadyUsed);
        }

        code.status = DeliveryStatus::Verified;
        code.verified_at = Some(now);
        info!(request_id = %code.request_id, "otp verified");
        Ok(code)
    }
}

fn message_body(code: &str, ttl: Duration, suffix: Option<&str>) -> String {
    let minutes = ttl.num_minutes().max(1);
    let body = format!("{code} is your one time password. It is valid for {minutes} minutes.");
    match suffix {
        Some(suffix) if !suffix.trim().is_empty() => format!("{body} {}", suffix.trim()),
        _ => body,
    }
}
