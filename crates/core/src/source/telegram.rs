//! Telegram Bot API client.
//!
//! Uses three endpoints:
//! - `getStickerSet` to resolve a set's members
//! - `getFile` to resolve a sticker's download path
//! - `/file/bot<token>/<path>` to stream the bytes

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{CollectionDescriptor, FormatTag, MediaItem};
use super::{ItemStream, SourceError, StickerSource};

/// Telegram Bot API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// Base URL (default: https://api.telegram.org).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Telegram Bot API backed sticker source.
pub struct TelegramSource {
    client: Client,
    api_url: String,
    file_url: String,
}

impl TelegramSource {
    /// Create a new Telegram client.
    pub fn new(config: TelegramConfig) -> Result<Self, SourceError> {
        if config.bot_token.trim().is_empty() {
            return Err(SourceError::NotConfigured("bot token is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base = config.api_base_url.trim_end_matches('/');
        Ok(Self {
            client,
            api_url: format!("{}/bot{}", base, config.bot_token),
            file_url: format!("{}/file/bot{}", base, config.bot_token),
        })
    }

    /// Calls a Bot API method and unwraps the `result` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.api_url, method);
        debug!("Telegram API call: method={}", method);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: TgResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                SourceError::ParseError(format!("Failed to parse {} response: {}", method, e))
            } else {
                SourceError::api(status.as_u16(), body.clone())
            }
        })?;

        envelope.into_result(method)
    }

    /// Resolves the remote file path of a sticker.
    async fn file_path(&self, item: &MediaItem) -> Result<String, SourceError> {
        let file: TgFile = self
            .call("getFile", &[("file_id", item.remote_id.as_str())])
            .await?;
        file.file_path
            .ok_or_else(|| SourceError::NotFound(format!("file path for {}", item.remote_id)))
    }

    fn check_download(response: Response, path: &str) -> Result<Response, SourceError> {
        let status = response.status();
        if status == 404 {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::api(
                status.as_u16(),
                format!("download of {} failed", path),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl StickerSource for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn resolve_collection(&self, name: &str) -> Result<CollectionDescriptor, SourceError> {
        let set: TgStickerSet = self.call("getStickerSet", &[("name", name)]).await?;
        let descriptor = set.into_descriptor();
        debug!(
            "Resolved sticker set '{}' ({} stickers)",
            descriptor.name,
            descriptor.len()
        );
        Ok(descriptor)
    }

    async fn open_item(&self, item: &MediaItem) -> Result<ItemStream, SourceError> {
        let path = self.file_path(item).await?;

        if let Some(ext) = path.rsplit_once('.').map(|(_, ext)| ext) {
            if FormatTag::from_extension(ext) != Some(item.format) {
                warn!(
                    "Remote file {} does not match declared format {:?}",
                    path, item.format
                );
            }
        }

        let url = format!("{}/{}", self.file_url, path);
        let response = self.client.get(&url).send().await?;
        let response = Self::check_download(response, &path)?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SourceError::from))
            .boxed())
    }

    async fn validate(&self) -> Result<(), SourceError> {
        let me: TgUser = self.call("getMe", &[]).await?;
        if !me.is_bot {
            return Err(SourceError::NotConfigured(
                "token does not belong to a bot".to_string(),
            ));
        }
        debug!("Telegram token belongs to @{}", me.username.unwrap_or_default());
        Ok(())
    }
}

// ============================================================================
// Telegram API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

impl<T> TgResponse<T> {
    fn into_result(self, method: &str) -> Result<T, SourceError> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| SourceError::ParseError(format!("{} returned no result", method)));
        }

        let message = self
            .description
            .unwrap_or_else(|| format!("{} failed", method));
        match self.error_code {
            Some(400) if message.contains("STICKERSET_INVALID") => {
                Err(SourceError::NotFound(message))
            }
            Some(404) => Err(SourceError::NotFound(message)),
            Some(code) => Err(SourceError::api(code, message)),
            None => Err(SourceError::api(0, message)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TgStickerSet {
    name: String,
    title: String,
    stickers: Vec<TgSticker>,
}

#[derive(Debug, Deserialize)]
struct TgSticker {
    file_id: String,
    file_unique_id: String,
    #[serde(default)]
    is_animated: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    is_bot: bool,
    username: Option<String>,
}

impl TgStickerSet {
    fn into_descriptor(self) -> CollectionDescriptor {
        let title = self.title;
        let items = self
            .stickers
            .into_iter()
            .enumerate()
            .map(|(i, s)| MediaItem {
                label: format!("{} #{}", title, i + 1),
                remote_id: s.file_id,
                unique_id: s.file_unique_id,
                association_key: s.emoji.unwrap_or_default(),
                format: FormatTag::from_kind(s.is_animated, s.is_video),
            })
            .collect();

        CollectionDescriptor {
            name: self.name.to_lowercase(),
            title,
            items,
        }
    }
}
