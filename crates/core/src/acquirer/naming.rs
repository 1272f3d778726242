//! Deterministic destination names for downloaded stickers.

use crate::source::MediaItem;

/// Fallback used when a sticker carries no emoji.
const UNKNOWN_KEY: &str = "unknown";

/// Makes an association key safe to embed in a file name.
///
/// Path separators and control characters become `_`; an empty key becomes
/// `unknown`. Everything else, emoji included, is kept as is.
pub fn sanitize_association_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        UNKNOWN_KEY.to_string()
    } else {
        cleaned
    }
}

/// `sticker_{index}_{key}.{ext}` with a 1-based index.
pub fn sticker_file_name(index: usize, item: &MediaItem) -> String {
    format!(
        "sticker_{}_{}.{}",
        index,
        sanitize_association_key(&item.association_key),
        item.format.extension()
    )
}
