//! Remote sticker set source.
//!
//! The [`StickerSource`] trait covers the two requests the pipeline makes of
//! the remote service: resolve a set's membership by name, and open a byte
//! stream for one item. [`TelegramSource`] implements it over the Telegram
//! Bot API.

mod link;
mod telegram;
mod types;

pub use link::{is_set_link, parse_set_name};
pub use telegram::{TelegramConfig, TelegramSource};
pub use types::{CollectionDescriptor, FormatTag, MediaItem};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Byte stream of one remote item.
pub type ItemStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// Errors that can occur when talking to the remote source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed. The request URL is stripped from the error.
    #[error("HTTP request failed: {0}")]
    HttpError(#[source] reqwest::Error),

    /// The set or file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Source is not usable (bad token, missing settings).
    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Creates an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(error: reqwest::Error) -> Self {
        // Bot API URLs embed the bot token.
        Self::HttpError(error.without_url())
    }
}

/// A remote collection source.
#[async_trait]
pub trait StickerSource: Send + Sync {
    /// Returns the name of this source implementation.
    fn name(&self) -> &str;

    /// Resolves a set's metadata and member list with a single request.
    async fn resolve_collection(&self, name: &str) -> Result<CollectionDescriptor, SourceError>;

    /// Resolves a download location for `item` and opens its byte stream.
    async fn open_item(&self, item: &MediaItem) -> Result<ItemStream, SourceError>;

    /// Validates that the source is reachable and authorized.
    async fn validate(&self) -> Result<(), SourceError> {
        Ok(())
    }
}
