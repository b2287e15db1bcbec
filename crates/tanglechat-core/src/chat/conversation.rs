//! Conversation history for one contact
//!
//! A [`Conversation`] keeps messages in the order they were appended, which
//! is ledger arrival order, and ignores envelopes it has already seen.

use std::collections::HashSet;

use super::message::ChatMessage;
use crate::types::Address;

/// Message history with a specific contact.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Contact's public key address
    pub contact_address: Address,
    /// Contact's display name
    pub contact_name: String,
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new(contact_address: Address, contact_name: impl Into<String>) -> Self {
        Self {
            contact_address,
            contact_name: contact_name.into(),
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Append a message unless one with the same id was already added.
    ///
    /// Returns true if the message was new.
    pub fn add_message(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Texts of the last `n` messages, oldest first.
    pub fn recent_texts(&self, n: usize) -> Vec<&str> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages[skip..].iter().map(|m| m.text.as_str()).collect()
    }

    /// Get the number of messages in the conversation.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the most recent message, if any.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Last message text truncated to `max_len` characters.
    pub fn preview(&self, max_len: usize) -> Option<String> {
        self.last_message().map(|m| {
            if m.text.chars().count() > max_len {
                let cut: String = m.text.chars().take(max_len).collect();
                format!("{}...", cut)
            } else {
                m.text.clone()
            }
        })
    }

    /// Get the display name for this conversation.
    pub fn display_name(&self) -> String {
        if self.contact_name.is_empty() {
            self.contact_address.short()
        } else {
            self.contact_name.clone()
        }
    }
}
