use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::archive::DEFAULT_SIZE_LIMIT;
use crate::converter::ConverterConfig;
use crate::source::TelegramConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Where and how fast sticker sets are downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root under which one directory per set is created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Maximum parallel downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Upper bound on the uncompressed bytes packed into one archive.
    #[serde(default = "default_size_limit")]
    pub size_limit_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            size_limit_bytes: default_size_limit(),
        }
    }
}

fn default_size_limit() -> u64 {
    DEFAULT_SIZE_LIMIT
}

/// Sanitized config for logging (bot token redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub telegram: SanitizedTelegramConfig,
    pub download: DownloadConfig,
    pub converter: ConverterConfig,
    pub archive: ArchiveConfig,
}

/// Telegram config without the token
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTelegramConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub bot_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            telegram: SanitizedTelegramConfig {
                api_base_url: config.telegram.api_base_url.clone(),
                timeout_secs: config.telegram.timeout_secs,
                bot_token_configured: !config.telegram.bot_token.trim().is_empty(),
            },
            download: config.download.clone(),
            converter: config.converter.clone(),
            archive: config.archive.clone(),
        }
    }
}
