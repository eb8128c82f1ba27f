//! One-line event summaries for the session log.
//!
//! Summaries are purely diagnostic: long text is truncated to a preview and
//! inline media is reported by its estimated decoded size, computed from the
//! encoded length without decoding the payload.

use crate::codec;
use crate::event::ServerEvent;

const PREVIEW_CHARS: usize = 48;

/// Summarizes a raw inbound frame, structured or not.
pub fn summarize_raw(raw: &str) -> String {
    match ServerEvent::parse(raw) {
        Ok(event) => summarize(&event),
        Err(_) => format!("unparseable frame {}", preview(raw)),
    }
}

/// Renders a one-line human-readable description of an event.
pub fn summarize(event: &ServerEvent) -> String {
    let body = describe(event);
    match &event.author {
        Some(author) => format!("[{author}] {body}"),
        None => body,
    }
}

fn describe(event: &ServerEvent) -> String {
    if event.turn_complete == Some(true) {
        return "turn complete".into();
    }
    if event.interrupted == Some(true) {
        return "interrupted".into();
    }
    if let Some(fragment) = &event.input_transcription {
        return format!(
            "input transcript {} ({})",
            preview(fragment.text.as_deref().unwrap_or("")),
            finality(fragment.finished)
        );
    }
    if let Some(fragment) = &event.output_transcription {
        return format!(
            "output transcript {} ({})",
            preview(fragment.text.as_deref().unwrap_or("")),
            finality(fragment.finished)
        );
    }
    if let Some(content) = &event.content {
        let parts: Vec<String> = content
            .parts
            .iter()
            .map(|part| {
                if let Some(inline) = &part.inline_data {
                    format!(
                        "{} ~{} bytes inline",
                        inline.mime_type,
                        codec::encoded_byte_estimate(&inline.data)
                    )
                } else if let Some(text) = &part.text {
                    format!("text {}", preview(text))
                } else {
                    "empty part".into()
                }
            })
            .collect();
        return format!("content: {}", parts.join(", "));
    }
    "empty event".into()
}

fn finality(finished: Option<bool>) -> &'static str {
    if finished == Some(true) { "final" } else { "partial" }
}

/// Quotes `text` for a log line, truncating long content to a short preview.
pub fn preview(text: &str) -> String {
    let mut shown: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        shown.push('…');
    }
    format!("{shown:?}")
}
