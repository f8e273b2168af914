use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use bridge_core::{Attachment, AttachmentPort};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Resolves opaque file references via the bot API and downloads the raw
/// bytes. Configured without a token it fails every fetch, which the
/// router degrades to transcript failure markers.
pub struct TelegramFiles {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct GetFileResponse {
    ok: bool,
    result: Option<FileInfo>,
}

#[derive(Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

impl TelegramFiles {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: Option<String>, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building attachment http client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl AttachmentPort for TelegramFiles {
    async fn fetch(&self, file_id: &str) -> Result<Attachment> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("no bot token configured"))?;

        let info: GetFileResponse = self
            .http
            .get(format!("{}/bot{}/getFile", self.api_base, token))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .context("resolving file reference")?
            .error_for_status()?
            .json()
            .await
            .context("decoding getFile response")?;

        let remote_path = match (info.ok, info.result.and_then(|r| r.file_path)) {
            (true, Some(path)) => path,
            _ => return Err(anyhow!("getFile failed for {}", file_id)),
        };

        let bytes = self
            .http
            .get(format!("{}/file/bot{}/{}", self.api_base, token, remote_path))
            .send()
            .await
            .context("downloading attachment")?
            .error_for_status()?
            .bytes()
            .await
            .context("reading attachment body")?;

        Ok(Attachment {
            bytes: bytes.to_vec(),
            remote_path,
        })
    }
}
