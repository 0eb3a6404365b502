//! HTTP client for the sync service

use std::time::Duration;

use serde::Deserialize;

use super::protocol::{SyncBatch, SyncResponse};
use super::transport::{FolderDirectory, SyncTransport};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::models::{Folder, UserId};
use crate::util::compact_text;

/// `reqwest`-based transport and folder directory
#[derive(Clone)]
pub struct HttpSyncClient {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSyncClient")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FolderListResponse {
    Bare(Vec<Folder>),
    Wrapped { folders: Vec<Folder> },
}

impl HttpSyncClient {
    pub fn new(base_url: &str, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url).map_err(Error::Config)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    /// Client for the configured API, `None` when sync is not configured
    pub fn from_settings(settings: &SyncSettings) -> Result<Option<Self>> {
        settings
            .api_url
            .as_deref()
            .map(|url| Self::new(url, settings.access_token.clone(), settings.http_timeout))
            .transpose()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Network(format!(
            "{action} failed with HTTP {status}: {}",
            compact_text(&body)
        )))
    }
}

impl SyncTransport for HttpSyncClient {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<SyncResponse> {
        let url = format!("{}/v1/sync", self.base_url);
        let response = self
            .authorize(self.client.post(url))
            .header("Accept", "application/json")
            .json(batch)
            .send()
            .await
            .map_err(|error| Error::Network(format!("Sync request failed: {error}")))?;
        let response = Self::check_status(response, "Sync request").await?;

        let body = response
            .text()
            .await
            .map_err(|error| Error::Network(format!("Failed to read sync response: {error}")))?;
        serde_json::from_str(&body).map_err(|error| {
            Error::Protocol(format!(
                "Failed to parse sync response: {error} ({})",
                compact_text(&body)
            ))
        })
    }
}

impl FolderDirectory for HttpSyncClient {
    async fn list_folders(&self, user_id: &UserId) -> Result<Vec<Folder>> {
        let url = format!(
            "{}/v1/folders?user_id={}",
            self.base_url,
            urlencoding::encode(user_id.as_str())
        );
        let response = self
            .authorize(self.client.get(url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| Error::Network(format!("Folder request failed: {error}")))?;
        let response = Self::check_status(response, "Folder request").await?;

        let body = response
            .text()
            .await
            .map_err(|error| Error::Network(format!("Failed to read folder list: {error}")))?;
        parse_folder_list(&body)
    }
}

fn parse_folder_list(body: &str) -> Result<Vec<Folder>> {
    match serde_json::from_str::<FolderListResponse>(body) {
        Ok(FolderListResponse::Bare(folders) | FolderListResponse::Wrapped { folders }) => {
            Ok(folders)
        }
        Err(error) => Err(Error::Protocol(format!(
            "Failed to parse folder list: {error}"
        ))),
    }
}

fn normalize_base_url(raw: &str) -> std::result::Result<String, String> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err("API base URL must not be empty".to_string());
    }
    if !crate::util::is_http_url(&base) {
        return Err("API base URL must include http:// or https://".to_string());
    }
    Ok(base)
}
