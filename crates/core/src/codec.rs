//! Base64 handling for inline media and text normalization helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decoding failure for an inline media payload.
#[derive(Debug, thiserror::Error)]
#[error("invalid base64 payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Decodes an inline media payload into raw bytes.
///
/// The server may emit either the standard or the URL-safe base64 alphabet,
/// with or without trailing padding. `-`/`_` are mapped to `+`/`/` and the
/// payload is re-padded to a multiple of four before decoding.
pub fn decode_inline_data(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let mut normalized: String = encoded
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    Ok(STANDARD.decode(normalized)?)
}

/// Estimates the decoded size of a base64 payload without decoding it.
pub fn encoded_byte_estimate(encoded: &str) -> usize {
    let trimmed = encoded.trim_end_matches('=');
    trimmed.len() * 3 / 4
}

/// Collapses spaces between CJK/fullwidth characters.
///
/// Transcripts for languages written without word spacing arrive with
/// spurious inter-character spaces. A space is dropped only when the
/// characters on both sides are CJK or fullwidth script code points;
/// spacing in Latin text is untouched.
pub fn collapse_cjk_spaces(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' '
            && i > 0
            && is_cjk(chars[i - 1])
            && chars.get(i + 1).copied().is_some_and(is_cjk)
        {
            continue;
        }
        out.push(c);
    }
    out
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'     // Hangul Jamo
        | '\u{2E80}'..='\u{2FDF}'   // CJK radicals, Kangxi radicals
        | '\u{3001}'..='\u{303F}'   // CJK symbols and punctuation (not U+3000)
        | '\u{3040}'..='\u{30FF}'   // Hiragana, Katakana
        | '\u{3130}'..='\u{318F}'   // Hangul compatibility Jamo
        | '\u{3400}'..='\u{4DBF}'   // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        | '\u{AC00}'..='\u{D7A3}'   // Hangul syllables
        | '\u{F900}'..='\u{FAFF}'   // CJK compatibility ideographs
        | '\u{FE30}'..='\u{FE4F}'   // CJK compatibility forms
        | '\u{FF00}'..='\u{FFEF}'   // Halfwidth and fullwidth forms
        | '\u{20000}'..='\u{2FA1F}' // CJK extensions B..F
    )
}
