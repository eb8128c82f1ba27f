//! The event-reassembly engine.
//!
//! The server streams an assistant turn as many small fragments: text parts,
//! partial transcripts for both directions, inline audio chunks, and bare
//! turn-boundary markers. This module folds that stream into stable message
//! updates addressed by handle, so the display layer never has to guess
//! "which message was that for" from list positions.
//!
//! The engine is strictly event-driven: one [`Reassembler::ingest`] call per
//! inbound frame, processed to completion before the next. It holds at most
//! one open buffer per text stream (assistant content, input transcript,
//! output transcript), each with the lifecycle
//! `Closed -> Open (first fragment) -> Closed (own finished flag, turn
//! complete, or interruption)`.

use tracing::debug;

use crate::codec;
use crate::event::{Part, ServerEvent};

/// Stable identifier for one message, issued when its buffer opens.
///
/// Every subsequent update for the same message carries the same handle, so
/// in-place edits do not depend on the display list's length or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(u64);

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// An instruction for the display layer. The engine only ever opens new
/// messages or addresses existing ones by handle; it never rewrites history.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    /// A new partial message has started.
    Opened {
        handle: MessageHandle,
        speaker: Speaker,
        text: String,
    },
    /// The full concatenated text of an open message changed.
    Updated { handle: MessageHandle, text: String },
    /// The message is final. `truncated` is set when the assistant was cut
    /// short by an interruption; the text emitted so far stands.
    Closed {
        handle: MessageHandle,
        truncated: bool,
    },
}

/// One decoded inbound PCM chunk, ready for the playback pipeline.
pub type AudioFrame = Vec<u8>;

/// Everything one inbound frame produced.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub updates: Vec<MessageUpdate>,
    pub audio: Vec<AudioFrame>,
}

#[derive(Debug)]
struct OpenBuffer {
    handle: MessageHandle,
    text: String,
}

/// Per-session reassembly state. All cursors live here as explicit fields;
/// a fresh session starts from a fresh `Reassembler`.
#[derive(Debug, Default)]
pub struct Reassembler {
    next_handle: u64,
    assistant_text: Option<OpenBuffer>,
    input_transcript: Option<OpenBuffer>,
    output_transcript: Option<OpenBuffer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one raw inbound text frame into the session state.
    ///
    /// A frame that does not parse as a structured event is a transport
    /// artifact: it is dropped here with a debug log and produces nothing.
    pub fn ingest(&mut self, raw: &str) -> IngestOutcome {
        let mut out = IngestOutcome::default();
        match ServerEvent::parse(raw) {
            Ok(event) => self.fold(&event, &mut out),
            Err(err) => debug!(%err, "ignoring frame that is not a structured event"),
        }
        out
    }

    /// Folds an already-parsed event. Classification is by field presence,
    /// in priority order: turn completion, interruption, input transcript,
    /// output transcript, content parts.
    pub fn fold(&mut self, event: &ServerEvent, out: &mut IngestOutcome) {
        if event.turn_complete == Some(true) {
            self.close_turn(false, out);
        } else if event.interrupted == Some(true) {
            self.close_turn(true, out);
        } else if let Some(fragment) = &event.input_transcription {
            fold_fragment(
                &mut self.input_transcript,
                &mut self.next_handle,
                Speaker::User,
                fragment.text.as_deref().unwrap_or(""),
                fragment.finished.unwrap_or(false),
                out,
            );
        } else if let Some(fragment) = &event.output_transcription {
            fold_fragment(
                &mut self.output_transcript,
                &mut self.next_handle,
                Speaker::Assistant,
                fragment.text.as_deref().unwrap_or(""),
                fragment.finished.unwrap_or(false),
                out,
            );
        } else if let Some(content) = &event.content {
            for part in &content.parts {
                self.fold_part(part, out);
            }
        }
    }

    fn fold_part(&mut self, part: &Part, out: &mut IngestOutcome) {
        if let Some(inline) = &part.inline_data {
            if inline.mime_type.starts_with("audio") {
                match codec::decode_inline_data(&inline.data) {
                    Ok(pcm) => out.audio.push(pcm),
                    Err(err) => debug!(%err, "dropping undecodable inline audio"),
                }
            } else {
                debug!(mime_type = %inline.mime_type, "ignoring non-audio inline data");
            }
        }
        if let Some(text) = &part.text {
            // A text part is a fragment of a still-growing sentence; the
            // buffer closes only on a turn boundary, never per part.
            fold_fragment(
                &mut self.assistant_text,
                &mut self.next_handle,
                Speaker::Assistant,
                text,
                false,
                out,
            );
        }
    }

    /// Closes the assistant-voiced buffers at a turn boundary. The input
    /// transcript is left alone: the user may still be mid-utterance.
    fn close_turn(&mut self, truncated: bool, out: &mut IngestOutcome) {
        for slot in [&mut self.assistant_text, &mut self.output_transcript] {
            if let Some(buffer) = slot.take() {
                out.updates.push(MessageUpdate::Closed {
                    handle: buffer.handle,
                    truncated,
                });
            }
        }
    }
}

fn fold_fragment(
    slot: &mut Option<OpenBuffer>,
    next_handle: &mut u64,
    speaker: Speaker,
    text: &str,
    finished: bool,
    out: &mut IngestOutcome,
) {
    match slot {
        Some(buffer) => {
            buffer.text.push_str(text);
            out.updates.push(MessageUpdate::Updated {
                handle: buffer.handle,
                text: codec::collapse_cjk_spaces(&buffer.text),
            });
        }
        None => {
            let handle = MessageHandle(*next_handle);
            *next_handle += 1;
            *slot = Some(OpenBuffer {
                handle,
                text: text.to_owned(),
            });
            out.updates.push(MessageUpdate::Opened {
                handle,
                speaker,
                text: codec::collapse_cjk_spaces(text),
            });
        }
    }
    if finished {
        // Further fragments of this kind start a new buffer.
        if let Some(buffer) = slot.take() {
            out.updates.push(MessageUpdate::Closed {
                handle: buffer.handle,
                truncated: false,
            });
        }
    }
}
