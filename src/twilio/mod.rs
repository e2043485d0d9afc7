use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::config::TwilioConfig;

/// Thin client for the Twilio Messages API.
///
/// Construction can fail (HTTP client build); callers treat that as "SMS
/// not configured" rather than a startup error.
#[derive(Clone)]
pub struct TwilioClient {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig, base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build Twilio HTTP client")?;
        Ok(Self {
            http,
            base_url,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        })
    }

    /// Submit one outbound message. Any non-success response is an error;
    /// the caller owns retries.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        debug!(to, "Submitting SMS");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", &self.from_number), ("Body", body)])
            .send()
            .await
            .context("Twilio message submit failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Twilio returned status {status}");
        }
        Ok(())
    }
}
