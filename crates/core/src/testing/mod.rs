//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the two external collaborators of the pipeline, the
//! remote sticker source and the encoder process, so every stage can be
//! exercised without network access or ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use stickerpipe_core::testing::{fixtures, MockCommandRunner, MockStickerSource};
//!
//! let source = MockStickerSource::new();
//! source.add_collection(fixtures::scenario_collection()).await;
//! source.fail_on_open("2").await;
//!
//! let runner = MockCommandRunner::new();
//! runner.fail_when_input_contains("sticker_3", 1, "Invalid data").await;
//! ```

mod mock_runner;
mod mock_source;

pub use mock_runner::{MockCommandRunner, MOCK_GIF_BYTES};
pub use mock_source::MockStickerSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::source::{CollectionDescriptor, FormatTag, MediaItem};

    /// Create a sticker with reasonable defaults.
    pub fn media_item(remote_id: &str, emoji: &str, format: FormatTag) -> MediaItem {
        MediaItem {
            remote_id: remote_id.to_string(),
            unique_id: format!("uniq-{}", remote_id),
            label: format!("Sticker {}", remote_id),
            association_key: emoji.to_string(),
            format,
        }
    }

    /// Create a set of `count` static stickers with ids `<name>-1`, `<name>-2`, ...
    pub fn collection(name: &str, count: usize) -> CollectionDescriptor {
        const EMOJI: [&str; 4] = ["😀", "🎉", "🐱", "👍"];
        CollectionDescriptor {
            name: name.to_lowercase(),
            title: format!("{} stickers", name),
            items: (1..=count)
                .map(|i| {
                    media_item(
                        &format!("{}-{}", name, i),
                        EMOJI[(i - 1) % EMOJI.len()],
                        FormatTag::Static,
                    )
                })
                .collect(),
        }
    }

    /// Set "foo": two static 😀 stickers and one animated 🎉 sticker.
    pub fn scenario_collection() -> CollectionDescriptor {
        CollectionDescriptor {
            name: "foo".to_string(),
            title: "Foo".to_string(),
            items: vec![
                media_item("1", "😀", FormatTag::Static),
                media_item("2", "😀", FormatTag::Static),
                media_item("3", "🎉", FormatTag::Animated),
            ],
        }
    }

    /// Default bytes served for an item without an explicit payload.
    pub fn payload(remote_id: &str) -> Vec<u8> {
        format!("RIFF-payload-of-{}", remote_id).into_bytes()
    }
}
