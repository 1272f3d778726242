//! Strongly typed sticker set model.

use serde::{Deserialize, Serialize};

/// Media kind of a sticker, which also decides its file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Static WebP image.
    Static,
    /// Lottie animation (gzipped JSON, `.tgs`).
    Animated,
    /// WebM video.
    Video,
}

impl FormatTag {
    /// Infers the tag from the kind flags a sticker set listing declares.
    pub fn from_kind(is_animated: bool, is_video: bool) -> Self {
        if is_video {
            Self::Video
        } else if is_animated {
            Self::Animated
        } else {
            Self::Static
        }
    }

    /// Infers the tag from a remote file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "webp" => Some(Self::Static),
            "tgs" => Some(Self::Animated),
            "webm" => Some(Self::Video),
            _ => None,
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Static => "webp",
            Self::Animated => "tgs",
            Self::Video => "webm",
        }
    }
}

/// One sticker of a resolved set. Immutable after resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    /// Identifier used to request the file from the remote source.
    pub remote_id: String,
    /// Stable identifier of the underlying file.
    pub unique_id: String,
    /// Human readable label.
    pub label: String,
    /// Emoji associated with the sticker, used for naming.
    pub association_key: String,
    pub format: FormatTag,
}

/// A resolved sticker set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionDescriptor {
    /// Canonical set name (lower-cased).
    pub name: String,
    pub title: String,
    /// Items in the order the source listed them.
    pub items: Vec<MediaItem>,
}

impl CollectionDescriptor {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct formats present in the set, in first-seen order.
    pub fn formats(&self) -> Vec<FormatTag> {
        let mut formats = Vec::new();
        for item in &self.items {
            if !formats.contains(&item.format) {
                formats.push(item.format);
            }
        }
        formats
    }
}
