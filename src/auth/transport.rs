//! OTP delivery abstractions.
//!
//! `LogTransport` is the default for local and sandbox delivery: it logs the
//! dispatch and reports success. `SmsGatewayTransport` posts to an HTTP SMS
//! gateway. Delivery outcome is recorded by the caller, never retried here.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::models::OtpChannel;

const SMS_COUNTRY_PREFIX: &str = "91";

#[derive(Clone, Debug)]
pub struct OtpMessage {
    pub channel: OtpChannel,
    pub destination: String,
    pub body: String,
    pub request_id: String,
}

#[async_trait]
pub trait OtpTransport: Send + Sync {
    /// Deliver a message or return an error to record the dispatch as failed.
    async fn deliver(&self, message: &OtpMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogTransport;

#[async_trait]
impl OtpTransport for LogTransport {
    async fn deliver(&self, message: &OtpMessage) -> Result<()> {
        info!(
            channel = message.channel.as_str(),
            destination = %message.destination,
            request_id = %message.request_id,
            "otp dispatch stub"
        );
        debug!(body = %message.body, "otp dispatch stub body");
        Ok(())
    }
}

#[derive(Deserialize)]
struct GatewayResponse {
    status: String,
}

pub struct SmsGatewayTransport {
    client: Client,
    url: Url,
    api_key: SecretString,
    sender: String,
}

impl SmsGatewayTransport {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, api_key: SecretString, sender: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build sms gateway client")?;
        Ok(Self {
            client,
            url,
            api_key,
            sender,
        })
    }
}

#[async_trait]
impl OtpTransport for SmsGatewayTransport {
    async fn deliver(&self, message: &OtpMessage) -> Result<()> {
        if message.channel != OtpChannel::Sms {
            return Err(anyhow!(
                "sms gateway cannot deliver {} messages",
                message.channel.as_str()
            ));
        }

        let payload = json!({
            "sender": self.sender,
            "messagetype": "TXT",
            "message": [{
                "number": format!("{SMS_COUNTRY_PREFIX}{}", message.destination),
                "text": message.body,
            }],
        });

        let response = self
            .client
            .post(self.url.clone())
            .header("apikey", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("sms gateway request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("sms gateway returned HTTP {status}"));
        }

        let body: GatewayResponse = response
            .json()
            .await
            .context("sms gateway returned an unreadable body")?;
        if body.status.eq_ignore_ascii_case("success") {
            Ok(())
        } else {
            Err(anyhow!("sms gateway rejected message: {}", body.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: OtpChannel) -> OtpMessage {
        OtpMessage {
            channel,
            destination: "9876543210".to_string(),
            body: "123456 is your login code".to_string(),
            request_id: "ABCDEF123456".to_string(),
        }
    }

    #[tokio::test]
    async fn log_transport_always_succeeds() {
        assert!(LogTransport.deliver(&message(OtpChannel::Sms)).await.is_ok());
        assert!(LogTransport.deliver(&message(OtpChannel::Email)).await.is_ok());
    }

    #[tokio::test]
    async fn sms_gateway_refuses_email() -> Result<()> {
        let transport = SmsGatewayTransport::new(
            Url::parse("http://127.0.0.1:9/send")?,
            SecretString::from("key"),
            "LENDGT".to_string(),
        )?;
        let result = transport.deliver(&message(OtpChannel::Email)).await;
        assert!(result.is_err());
        Ok(())
    }
}
