use std::collections::BTreeMap;

use crate::frame::{Chart, FinalAnswer, Source};

/// Who authored a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A displayable chat message.
///
/// Optional payloads are always present as (possibly empty) collections so a
/// renderer never has to special-case a missing field.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub calculations: BTreeMap<String, Option<f64>>,
}

impl Message {
    /// Message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Sender::User, text)
    }

    /// Bot message with text only.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::plain(Sender::Bot, text)
    }

    /// Bot message carrying every part of a completed answer.
    pub fn from_final(answer: &FinalAnswer) -> Self {
        Self {
            sender: Sender::Bot,
            text: answer.text.clone(),
            sources: answer.sources.clone(),
            charts: answer.charts.clone(),
            calculations: answer.calculations.clone(),
        }
    }

    fn plain(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            sources: Vec::new(),
            charts: Vec::new(),
            calculations: BTreeMap::new(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }

    /// Source labels in citation order.
    pub fn source_labels(&self) -> Vec<&str> {
        self.sources.iter().map(Source::label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_final_copies_all_parts() {
        let answer = FinalAnswer {
            text: "Done".into(),
            sources: vec![Source::named("doc", "policy.pdf")],
            ..FinalAnswer::default()
        };
        let message = Message::from_final(&answer);
        assert!(message.is_bot());
        assert_eq!(message.text, "Done");
        assert_eq!(message.source_labels(), vec!["policy.pdf"]);
        assert!(message.charts.is_empty());
    }

    #[test]
    fn sender_serializes_lowercase() {
        let json = serde_json::to_value(Message::user("hi")).expect("serialize");
        assert_eq!(json["sender"], "user");
    }
}
