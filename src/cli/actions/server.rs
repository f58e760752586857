use crate::{
    api,
    auth::{AuthConfig, LogTransport, OtpTransport, SmsGatewayTransport},
    cli::{commands::otp::SmsGateway, telemetry},
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub max_login_attempts: i32,
    pub revocation_prune_seconds: u64,
    pub otp_ttl_seconds: i64,
    pub otp_short_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub sms_gateway: Option<SmsGateway>,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.jwt_secret.clone())
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)
            .with_max_login_attempts(self.max_login_attempts)
            .with_otp_ttl_seconds(self.otp_ttl_seconds)
            .with_otp_short_ttl_seconds(self.otp_short_ttl_seconds)
            .with_otp_resend_cooldown_seconds(self.otp_resend_cooldown_seconds)
            .with_revocation_prune_seconds(self.revocation_prune_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the OTP transport cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = args.auth_config();
    let transport: Arc<dyn OtpTransport> = match args.sms_gateway {
        Some(gateway) => Arc::new(SmsGatewayTransport::new(
            gateway.url,
            gateway.api_key,
            gateway.sender,
        )?),
        None => Arc::new(LogTransport),
    };

    let result = api::new(args.port, args.dsn, auth_config, transport).await;
    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("access_token_ttl", format!("{}s", args.access_token_ttl_seconds)),
        ("refresh_token_ttl", format!("{}s", args.refresh_token_ttl_seconds)),
        ("max_login_attempts", args.max_login_attempts.to_string()),
        ("otp_ttl", format!("{}s", args.otp_ttl_seconds)),
        ("otp_short_ttl", format!("{}s", args.otp_short_ttl_seconds)),
        (
            "otp_resend_cooldown",
            format!("{}s", args.otp_resend_cooldown_seconds),
        ),
        (
            "otp_transport",
            args.sms_gateway
                .as_ref()
                .map_or_else(|| "log".to_string(), |g| format!("sms:{}", g.url)),
        ),
        (
            "revocation_prune",
            format!("{}s", args.revocation_prune_seconds),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "lendgate {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.chars().take(7).collect()
}
