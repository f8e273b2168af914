use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use bridge_core::{InboundMessage, MailboxPort};

/// Bearer-token client for the remote mailbox API. A slow or sleeping
/// server must never wedge the poll loop, hence the request timeout.
pub struct MailboxClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    data: Option<MessagesData>,
}

#[derive(Deserialize)]
struct MessagesData {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

impl MailboxClient {
    pub fn new(base: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building mailbox http client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base, endpoint)
    }
}

#[async_trait]
impl MailboxPort for MailboxClient {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>> {
        let response: MessagesResponse = self
            .http
            .get(self.url("owner-msgs"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("fetching unread messages")?
            .error_for_status()?
            .json()
            .await
            .context("decoding unread messages")?;
        Ok(response.data.map(|d| d.messages).unwrap_or_default())
    }

    async fn ack_read(&self) -> Result<()> {
        self.http
            .post(self.url("owner-ack"))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .context("acking messages")?
            .error_for_status()?;
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.http
            .post(self.url("owner-send"))
            .bearer_auth(&self.token)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("sending outbound message")?
            .error_for_status()?;
        Ok(())
    }
}
