//! Conversation store: the ordered record of technician/assistant turns.
//!
//! The whole transcript is replayed to the model on every request, so
//! insertion order is the only thing that matters here. There is no cap and
//! no editing of individual turns; [`Transcript::clear`] is the one way back
//! to an empty conversation.

use crate::pipeline::encode::ImageAttachment;
use serde::Serialize;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when the turn is replayed inside a prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            Role::User => "TECHNICIAN (User)",
            Role::Assistant => "SENIOR ENGINEER (You)",
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl Turn {
    pub fn user(text: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image: None,
        }
    }
}

/// Append-only, insertion-ordered list of turns.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Read-only snapshot in creation order.
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// A successful round trip with the model.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub reply: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}
