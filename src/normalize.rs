//! Text cleaning for user-entered fields
//!
//! Two layers: `normalize` produces a display form (NFC, trimmed, printable),
//! `fold` produces a lookup/cache key (lower-cased, diacritics removed,
//! whitespace collapsed). Both are pure and total.

use encoding_rs::WINDOWS_1252;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Clean a display value: NFC composition, trim, drop non-printable characters.
///
/// Whitespace other than a plain space becomes a space so that words joined by
/// a tab or a non-breaking space stay separated.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .nfc()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() || is_invisible_format(c) {
                None
            } else {
                Some(c)
            }
        })
        .collect();

    cleaned.trim().to_string()
}

/// Decode raw bytes permissively and normalize the result.
///
/// Valid UTF-8 is taken as is; anything else is read as Windows-1252, where
/// every byte maps to a character, so decoding never fails.
pub fn normalize_bytes(bytes: &[u8]) -> String {
    normalize(&decode_lossless(bytes))
}

/// Decode bytes as UTF-8, falling back to Windows-1252 (a superset of
/// Latin-1 for the printable range).
pub fn decode_lossless(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => WINDOWS_1252
            .decode_without_bom_handling(bytes)
            .0
            .into_owned(),
    }
}

/// Fold text into a comparison key.
///
/// `fold("Árgéntina") == fold(" ARGENTINA ") == "argentina"`.
pub fn fold(text: &str) -> String {
    let display = normalize(text);
    if display.is_empty() {
        return display;
    }

    let stripped: String = display
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the text contains at least one alphabetic character.
pub fn has_alphabetic(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// True when every character is alphabetic or a space (and there is at least one letter).
pub fn is_alphabetic_words(text: &str) -> bool {
    has_alphabetic(text) && text.chars().all(|c| c.is_alphabetic() || c == ' ')
}

fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}
