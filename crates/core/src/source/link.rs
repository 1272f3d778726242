//! Parsing of sticker set links.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SET_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://t\.me/addstickers/([A-Za-z0-9_]+)/?$").expect("valid set link regex")
});

static SET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid set name regex"));

/// Returns true for `https://t.me/addstickers/<name>` links.
pub fn is_set_link(input: &str) -> bool {
    SET_LINK.is_match(input.trim())
}

/// Extracts a set name from either an add-stickers link or a bare name.
pub fn parse_set_name(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(caps) = SET_LINK.captures(input) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    if SET_NAME.is_match(input) {
        return Some(input.to_string());
    }
    None
}
