//! The display-side message store.
//!
//! A [`Transcript`] applies [`MessageUpdate`]s from the reassembly engine to
//! an append-only list of rendered messages. Updates address messages by
//! handle; the engine never reaches back into history, and a handle it has
//! stopped using simply stops receiving updates.

use std::collections::HashMap;

use tracing::debug;

use crate::reassembly::{MessageHandle, MessageUpdate, Speaker};

/// One rendered chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub speaker: Speaker,
    /// Still being appended to.
    pub partial: bool,
    /// Finalized early because the assistant was interrupted.
    pub truncated: bool,
}

/// Ordered message history for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    by_handle: HashMap<MessageHandle, usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Looks up the message a handle currently addresses.
    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        self.by_handle.get(&handle).map(|&i| &self.messages[i])
    }

    pub fn apply(&mut self, update: &MessageUpdate) {
        match update {
            MessageUpdate::Opened {
                handle,
                speaker,
                text,
            } => {
                self.by_handle.insert(*handle, self.messages.len());
                self.messages.push(Message {
                    text: text.clone(),
                    speaker: *speaker,
                    partial: true,
                    truncated: false,
                });
            }
            MessageUpdate::Updated { handle, text } => match self.by_handle.get(handle) {
                Some(&index) => self.messages[index].text = text.clone(),
                None => debug!(?handle, "update for an unknown message handle"),
            },
            MessageUpdate::Closed { handle, truncated } => match self.by_handle.get(handle) {
                Some(&index) => {
                    let message = &mut self.messages[index];
                    message.partial = false;
                    message.truncated = *truncated;
                }
                None => debug!(?handle, "close for an unknown message handle"),
            },
        }
    }

    /// Appends a locally-originated message (typed text, a sent image echo).
    /// Local messages are final immediately; no server acknowledgment is
    /// awaited.
    pub fn push_local(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.messages.push(Message {
            text: text.into(),
            speaker,
            partial: false,
            truncated: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembly::Reassembler;

    fn drive(transcript: &mut Transcript, engine: &mut Reassembler, raw: &str) {
        for update in engine.ingest(raw).updates {
            transcript.apply(&update);
        }
    }

    #[test]
    fn partial_then_final_is_one_message() {
        let mut transcript = Transcript::new();
        let mut engine = Reassembler::new();
        drive(
            &mut transcript,
            &mut engine,
            r#"{"inputTranscription": {"text": "half", "finished": false}}"#,
        );
        assert_eq!(transcript.messages().len(), 1);
        assert!(transcript.messages()[0].partial);

        drive(
            &mut transcript,
            &mut engine,
            r#"{"inputTranscription": {"text": " done", "finished": true}}"#,
        );
        assert_eq!(transcript.messages().len(), 1);
        let message = &transcript.messages()[0];
        assert_eq!(message.text, "half done");
        assert!(!message.partial);
        assert_eq!(message.speaker, Speaker::User);
    }

    #[test]
    fn interleaved_streams_keep_their_own_messages() {
        let mut transcript = Transcript::new();
        let mut engine = Reassembler::new();
        drive(
            &mut transcript,
            &mut engine,
            r#"{"inputTranscription": {"text": "que", "finished": false}}"#,
        );
        drive(
            &mut transcript,
            &mut engine,
            r#"{"content": {"parts": [{"text": "ans"}]}}"#,
        );
        drive(
            &mut transcript,
            &mut engine,
            r#"{"inputTranscription": {"text": "stion", "finished": true}}"#,
        );
        drive(
            &mut transcript,
            &mut engine,
            r#"{"content": {"parts": [{"text": "wer"}]}}"#,
        );
        drive(&mut transcript, &mut engine, r#"{"turnComplete": true}"#);

        let texts: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["question", "answer"]);
        assert!(transcript.messages().iter().all(|m| !m.partial));
    }

    #[test]
    fn truncated_close_is_visible_on_the_message() {
        let mut transcript = Transcript::new();
        let mut engine = Reassembler::new();
        drive(
            &mut transcript,
            &mut engine,
            r#"{"content": {"parts": [{"text": "cut off"}]}}"#,
        );
        drive(&mut transcript, &mut engine, r#"{"interrupted": true}"#);
        let message = &transcript.messages()[0];
        assert!(message.truncated);
        assert!(!message.partial);
        assert_eq!(message.text, "cut off");
    }

    #[test]
    fn unknown_handles_are_ignored() {
        let mut transcript = Transcript::new();
        let mut engine = Reassembler::new();
        // Build an update against a different transcript, then replay the
        // close against an empty one.
        let out = engine.ingest(r#"{"outputTranscription": {"text": "x", "finished": true}}"#);
        transcript.apply(&out.updates[1]);
        assert!(transcript.messages().is_empty());
    }

    #[test]
    fn local_messages_are_final() {
        let mut transcript = Transcript::new();
        transcript.push_local(Speaker::User, "hello there");
        assert_eq!(transcript.messages().len(), 1);
        assert!(!transcript.messages()[0].partial);
    }
}
