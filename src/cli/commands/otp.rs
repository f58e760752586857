//! OTP lifetimes and the SMS gateway used to deliver codes.

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_OTP_TTL: &str = "otp-ttl-seconds";
pub const ARG_OTP_SHORT_TTL: &str = "otp-short-ttl-seconds";
pub const ARG_OTP_RESEND_COOLDOWN: &str = "otp-resend-cooldown-seconds";
pub const ARG_SMS_GATEWAY_URL: &str = "sms-gateway-url";
pub const ARG_SMS_GATEWAY_API_KEY: &str = "sms-gateway-api-key";
pub const ARG_SMS_SENDER: &str = "sms-sender";

#[derive(Debug)]
pub struct SmsGateway {
    pub url: Url,
    pub api_key: SecretString,
    pub sender: String,
}

#[derive(Debug)]
pub struct Options {
    pub ttl_seconds: i64,
    pub short_ttl_seconds: i64,
    pub resend_cooldown_seconds: i64,
    /// `None` means codes are only logged.
    pub gateway: Option<SmsGateway>,
}

impl Options {
    /// Parse OTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the gateway URL is invalid or set without an API key.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let gateway = match matches
            .get_one::<String>(ARG_SMS_GATEWAY_URL)
            .filter(|v| !v.trim().is_empty())
        {
            Some(raw) => {
                let url = Url::parse(raw.trim())
                    .map_err(|e| anyhow::anyhow!("invalid --{ARG_SMS_GATEWAY_URL}: {e}"))?;
                let api_key = matches
                    .get_one::<String>(ARG_SMS_GATEWAY_API_KEY)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| SecretString::from(v.clone()))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "missing required argument: --{ARG_SMS_GATEWAY_API_KEY} (required with --{ARG_SMS_GATEWAY_URL})"
                        )
                    })?;
                let sender = matches
                    .get_one::<String>(ARG_SMS_SENDER)
                    .cloned()
                    .unwrap_or_else(|| "LENDGT".to_string());
                Some(SmsGateway {
                    url,
                    api_key,
                    sender,
                })
            }
            None => None,
        };

        Ok(Self {
            ttl_seconds: matches.get_one::<i64>(ARG_OTP_TTL).copied().unwrap_or(300),
            short_ttl_seconds: matches
                .get_one::<i64>(ARG_OTP_SHORT_TTL)
                .copied()
                .unwrap_or(180),
            resend_cooldown_seconds: matches
                .get_one::<i64>(ARG_OTP_RESEND_COOLDOWN)
                .copied()
                .unwrap_or(30),
            gateway,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("Validity of SMS one-time codes in seconds")
                .env("LENDGATE_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OTP_SHORT_TTL)
                .long(ARG_OTP_SHORT_TTL)
                .help("Validity of email one-time codes in seconds")
                .env("LENDGATE_OTP_SHORT_TTL_SECONDS")
                .default_value("180")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OTP_RESEND_COOLDOWN)
                .long(ARG_OTP_RESEND_COOLDOWN)
                .help("Minimum seconds between two resends for the same principal")
                .env("LENDGATE_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_SMS_GATEWAY_URL)
                .long(ARG_SMS_GATEWAY_URL)
                .help("SMS gateway endpoint; codes are only logged when unset")
                .env("LENDGATE_SMS_GATEWAY_URL"),
        )
        .arg(
            Arg::new(ARG_SMS_GATEWAY_API_KEY)
                .long(ARG_SMS_GATEWAY_API_KEY)
                .help("SMS gateway API key")
                .env("LENDGATE_SMS_GATEWAY_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMS_SENDER)
                .long(ARG_SMS_SENDER)
                .help("Sender id shown on delivered SMS")
                .env("LENDGATE_SMS_SENDER")
                .default_value("LENDGT"),
        )
}
