//! Folds incoming frames into the chat message list.
use std::collections::VecDeque;
use std::str::FromStr;

use tracing::debug;

use crate::errors::ClientError;
use crate::frame::Frame;
use crate::message::{Message, Sender};

/// Text shown when the server reports an error without a usable detail.
pub const ERROR_FALLBACK_TEXT: &str =
    "Sorry, something went wrong while fetching the answer. Please try again.";

/// How streamed frames turn into messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReassemblyPolicy {
    /// Chunks append to the trailing bot message (or start one). A `final`
    /// frame pushes a separate message and does not merge with the streamed
    /// one.
    IncrementalAppend,
    /// Chunks are ignored; each `final` pushes one message with the full
    /// structured payload.
    #[default]
    ReplaceOnFinal,
}

impl FromStr for ReassemblyPolicy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" | "incremental" | "incremental_append" => Ok(Self::IncrementalAppend),
            "replace" | "final" | "replace_on_final" => Ok(Self::ReplaceOnFinal),
            other => Err(ClientError::Config(format!(
                "unknown reassembly policy `{other}` (expected `append` or `replace`)"
            ))),
        }
    }
}

/// Effect a single frame had on the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Text was appended to the trailing bot message.
    Appended,
    /// A new bot message was pushed.
    Pushed,
    /// The list is unchanged.
    Ignored,
}

/// In-memory chat history for one session.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    policy: ReassemblyPolicy,
    messages: VecDeque<Message>,
    limit: Option<usize>,
}

impl MessageLog {
    pub fn new(policy: ReassemblyPolicy) -> Self {
        Self {
            policy,
            messages: VecDeque::new(),
            limit: None,
        }
    }

    /// Caps the history; the oldest messages are evicted first.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|l| *l > 0);
        self.enforce_limit();
        self
    }

    pub fn policy(&self) -> ReassemblyPolicy {
        self.policy
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Message::user(text));
    }

    /// Folds one frame into the list.
    pub fn apply(&mut self, frame: &Frame) -> FoldOutcome {
        let outcome = match (self.policy, frame) {
            (ReassemblyPolicy::IncrementalAppend, Frame::Chunk { content }) => {
                if content.is_empty() {
                    FoldOutcome::Ignored
                } else if let Some(last) = self.messages.back_mut().filter(|m| m.is_bot()) {
                    last.text.push_str(content);
                    FoldOutcome::Appended
                } else {
                    self.push(Message::bot(content.clone()));
                    FoldOutcome::Pushed
                }
            }
            (ReassemblyPolicy::ReplaceOnFinal, Frame::Chunk { .. }) => FoldOutcome::Ignored,
            (_, Frame::Final(answer)) => {
                self.push(Message::from_final(answer));
                FoldOutcome::Pushed
            }
            (_, Frame::Error { detail }) => {
                let text = detail
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or(ERROR_FALLBACK_TEXT);
                self.push(Message::bot(text));
                FoldOutcome::Pushed
            }
            (_, Frame::Unknown { .. }) => FoldOutcome::Ignored,
        };
        debug!(kind = frame.kind(), ?outcome, len = self.messages.len(), "folded frame");
        outcome
    }

    pub fn messages(&self) -> impl ExactSizeIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    /// Snapshot of the list in display order.
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Trailing bot message, if the most recent entry is one.
    pub fn last_bot(&self) -> Option<&Message> {
        self.last().filter(|m| m.sender == Sender::Bot)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        if let Some(limit) = self.limit {
            while self.messages.len() > limit {
                self.messages.pop_front();
            }
        }
    }
}

/// Pure fold of `frames` over an existing list.
pub fn fold_frames<'a>(
    policy: ReassemblyPolicy,
    messages: Vec<Message>,
    frames: impl IntoIterator<Item = &'a Frame>,
) -> Vec<Message> {
    let mut log = MessageLog {
        policy,
        messages: messages.into(),
        limit: None,
    };
    for frame in frames {
        log.apply(frame);
    }
    log.messages.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FinalAnswer, Source, decode_frame};

    fn chunk(text: &str) -> Frame {
        Frame::Chunk {
            content: text.into(),
        }
    }

    fn final_frame(text: &str) -> Frame {
        Frame::Final(FinalAnswer {
            text: text.into(),
            ..FinalAnswer::default()
        })
    }

    #[test]
    fn append_policy_accumulates_chunks_into_one_message() {
        let messages = fold_frames(
            ReassemblyPolicy::IncrementalAppend,
            Vec::new(),
            &[chunk("Hel"), chunk("lo")],
        );
        assert_eq!(messages, vec![Message::bot("Hello")]);
    }

    #[test]
    fn append_policy_starts_new_message_after_user_turn() {
        let mut log = MessageLog::new(ReassemblyPolicy::IncrementalAppend);
        log.push_user("hi");
        assert_eq!(log.apply(&chunk("Hey")), FoldOutcome::Pushed);
        assert_eq!(log.apply(&chunk(" there")), FoldOutcome::Appended);
        assert_eq!(log.apply(&chunk("")), FoldOutcome::Ignored);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_bot().map(|m| m.text.as_str()), Some("Hey there"));
    }

    #[test]
    fn append_policy_pushes_final_separately() {
        let messages = fold_frames(
            ReassemblyPolicy::IncrementalAppend,
            Vec::new(),
            &[chunk("Do"), chunk("ne"), final_frame("Done")],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "Done");
        assert_eq!(messages[1].text, "Done");
    }

    #[test]
    fn replace_policy_pushes_final_after_user_message() {
        let mut log = MessageLog::new(ReassemblyPolicy::ReplaceOnFinal);
        log.push_user("status?");
        let outcome = log.apply(&decode_frame(r#"{"type":"final","answer":"Done","sources":[]}"#));
        assert_eq!(outcome, FoldOutcome::Pushed);
        assert_eq!(log.len(), 2);
        let last = log.last().expect("last message");
        assert_eq!(last.sender, Sender::Bot);
        assert_eq!(last.text, "Done");
        assert!(last.sources.is_empty());
    }

    #[test]
    fn replace_policy_ignores_chunks() {
        let mut log = MessageLog::new(ReassemblyPolicy::ReplaceOnFinal);
        assert_eq!(log.apply(&chunk("partial")), FoldOutcome::Ignored);
        assert!(log.is_empty());
    }

    #[test]
    fn error_without_detail_uses_fallback_text() {
        for policy in [
            ReassemblyPolicy::IncrementalAppend,
            ReassemblyPolicy::ReplaceOnFinal,
        ] {
            let mut log = MessageLog::new(policy);
            log.apply(&decode_frame(r#"{"type":"error"}"#));
            log.apply(&Frame::Error {
                detail: Some("   ".into()),
            });
            assert_eq!(log.len(), 2);
            assert!(log.messages().all(|m| m.text == ERROR_FALLBACK_TEXT));
        }
    }

    #[test]
    fn error_with_detail_shows_detail() {
        let mut log = MessageLog::default();
        log.apply(&decode_frame(r#"{"type":"error","detail":"Query not provided."}"#));
        assert_eq!(log.last().map(|m| m.text.as_str()), Some("Query not provided."));
    }

    #[test]
    fn unknown_frame_leaves_list_unchanged() {
        let mut log = MessageLog::new(ReassemblyPolicy::IncrementalAppend);
        log.push_user("hi");
        assert_eq!(log.apply(&decode_frame(r#"{"type":"ping"}"#)), FoldOutcome::Ignored);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn final_carries_sources_and_defaults_other_parts() {
        let mut log = MessageLog::default();
        log.apply(&Frame::Final(FinalAnswer {
            text: "See report".into(),
            sources: vec![Source::named("doc", "report.pdf")],
            ..FinalAnswer::default()
        }));
        let last = log.last().expect("message");
        assert_eq!(last.source_labels(), vec!["report.pdf"]);
        assert!(last.charts.is_empty());
        assert!(last.calculations.is_empty());
    }

    #[test]
    fn limit_evicts_oldest_messages() {
        let mut log = MessageLog::new(ReassemblyPolicy::ReplaceOnFinal).with_limit(Some(2));
        log.push_user("one");
        log.push_user("two");
        log.push_user("three");
        let texts: Vec<_> = log.messages().map(|m| m.text.clone()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "append".parse::<ReassemblyPolicy>().expect("parse"),
            ReassemblyPolicy::IncrementalAppend
        );
        assert_eq!(
            " Replace ".parse::<ReassemblyPolicy>().expect("parse"),
            ReassemblyPolicy::ReplaceOnFinal
        );
        assert!("stream".parse::<ReassemblyPolicy>().is_err());
    }
}
