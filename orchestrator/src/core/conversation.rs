//! Chat history sent to the orchestrator model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Append-only conversation whose first turn is the system instruction.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system: impl Into<String>, first_user: impl Into<String>) -> Self {
        Self {
            messages: vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, first_user),
            ],
        }
    }

    /// Replace the system turn; the rest of the history is untouched.
    pub fn set_system(&mut self, system: impl Into<String>) {
        self.messages[0] = ChatMessage::new(Role::System, system);
    }

    pub fn push_exchange(&mut self, assistant: impl Into<String>, user: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Assistant, assistant));
        self.messages.push(ChatMessage::new(Role::User, user));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Assistant, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}
