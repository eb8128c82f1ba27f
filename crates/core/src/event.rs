//! Wire-format types for the duplex chat channel.
//!
//! Inbound frames are UTF-8 JSON objects where the interesting fields are all
//! optional; which fields are present decides how the frame is classified (see
//! [`crate::reassembly`]). Outbound text and image frames carry a `type` tag;
//! outbound audio travels as raw binary frames and never appears here.

use serde::{Deserialize, Serialize};

/// One decoded event received from the server.
///
/// Events carry no sequence number; the wire is assumed reliable and
/// in-order, so classification depends purely on field presence.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub author: Option<String>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub content: Option<Content>,
}

impl ServerEvent {
    /// Parses a raw text frame into a structured event.
    ///
    /// Frames that are not valid JSON objects of this shape are transport
    /// artifacts, not protocol errors; callers drop them with a log line.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A partial or final speech transcript, for either direction.
#[derive(Deserialize, Debug, Clone)]
pub struct Transcription {
    pub text: Option<String>,
    pub finished: Option<bool>,
}

/// Content payload of a model turn.
#[derive(Deserialize, Debug, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a content payload: streamed text, inline media, or both.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

/// Binary media embedded directly in an event, base64-encoded.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Outbound JSON text frames sent by the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// A typed user message.
    Text { text: String },
    /// A captured still image, base64-encoded.
    #[serde(rename_all = "camelCase")]
    Image { data: String, mime_type: String },
}
