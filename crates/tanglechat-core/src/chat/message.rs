//! Chat message types for display
//!
//! This module provides the [`ChatMessage`] struct which represents
//! a decrypted, display-ready chat message extracted from an envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// A decrypted chat message ready for display.
///
/// The `id` is the hash of the envelope's wire form, so fetching the same
/// ledger payload twice yields the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Envelope identity (blake3 of the encoded envelope, hex)
    pub id: String,
    /// Sender prefix carried by the envelope
    pub sender_prefix: String,
    /// Sender's display name (if known from contacts)
    pub sender_name: Option<String>,
    /// Message text (decrypted)
    pub text: String,
    /// Timestamp text as written by the sender
    pub timestamp: String,
    /// Whether this message was sent by us
    pub is_mine: bool,
}

impl ChatMessage {
    /// Build a message from a decrypted envelope.
    pub fn from_envelope(
        envelope: &Envelope,
        text: String,
        sender_name: Option<String>,
        is_mine: bool,
    ) -> Self {
        Self {
            id: envelope_id(envelope),
            sender_prefix: envelope.sender_prefix().to_string(),
            sender_name,
            text,
            timestamp: envelope.timestamp().to_string(),
            is_mine,
        }
    }

    /// Get the display name for the sender.
    ///
    /// Returns the sender_name if available, otherwise truncates the prefix.
    pub fn display_sender(&self) -> String {
        if self.is_mine {
            return "You".to_string();
        }
        match self.sender_name {
            Some(ref name) if !name.is_empty() => name.clone(),
            _ => {
                if self.sender_prefix.chars().count() > 9 {
                    let short: String = self.sender_prefix.chars().take(9).collect();
                    format!("{}...", short)
                } else {
                    self.sender_prefix.clone()
                }
            }
        }
    }

    /// Parsed send time, if the sender wrote a valid RFC 3339 timestamp.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Stable identity of an envelope
pub fn envelope_id(envelope: &Envelope) -> String {
    blake3::hash(envelope.encode().as_bytes()).to_hex().to_string()
}
