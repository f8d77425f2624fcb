//! Notifier that posts to a messaging gateway over HTTP.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::Notifier;
use crate::error::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    chat_id: &'a str,
    message: &'a str,
}

/// Sends text messages through `POST {api_url}/send`, authenticated with
/// an `x-api-key` header.
pub struct HttpNotifier {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
}

impl HttpNotifier {
    pub fn new(http: reqwest::Client, api_url: String, api_key: SecretString) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/send", self.api_url))
            .header("x-api-key", self.api_key.expose_secret())
            .json(&SendRequest {
                chat_id: channel,
                message: text,
            })
            .send()
            .await
            .map_err(|e| Error::Notify(format!("send to {channel} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("gateway returned {status}: {body}")));
        }

        debug!(channel, "message delivered to gateway");
        Ok(())
    }
}
