//! UI-agnostic session state types
//!
//! The transcript and the pending draft are shared by any display layer (TUI,
//! desktop shell, tests) and don't depend on a specific UI framework.

use serde::{Deserialize, Serialize};

use crate::attachment::Base64Blob;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the conversation. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Base64Blob>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, image: Option<Base64Blob>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            image,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.role == ChatRole::User
    }
}

/// Append-only transcript, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the appended message.
    pub fn append(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Draft input plus the single in-flight slot.
#[derive(Debug, Clone, Default)]
pub struct PendingRequest {
    pub draft_text: String,
    pub draft_image: Option<Base64Blob>,
    pub in_flight: bool,
}

impl PendingRequest {
    /// Nothing worth sending: blank text and no image.
    pub fn is_blank(&self) -> bool {
        self.draft_text.trim().is_empty() && self.draft_image.is_none()
    }

    pub fn clear_draft(&mut self) {
        self.draft_text.clear();
        self.draft_image = None;
    }
}
