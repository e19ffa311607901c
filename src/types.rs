//! Common types used throughout the bot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation.
///
/// Maps to the completion API message roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the human user
    User,
    /// Message from the AI assistant
    Assistant,
    /// System prompt or instructions
    System,
}

impl MessageRole {
    /// Role of the history turn at `index`; turns alternate starting with the user.
    #[must_use]
    pub fn for_turn(index: usize) -> Self {
        if index % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        }
    }
}

/// Opaque identifier of one ongoing conversation.
///
/// A room participant's GXS id for room chat, or the peer's destination id
/// for private chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The bot's own identity as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// Display name, also used to detect mentions
    pub name: String,
    /// GXS id, used to recognize echoes of our own room messages
    pub gxs_id: String,
}
