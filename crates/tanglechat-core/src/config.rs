//! Protocol configuration
//!
//! Every limit the handshake, codec, deriver and session depend on lives in
//! [`ChatConfig`], which is passed explicitly into use cases and sessions.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// Tunable protocol constants.
///
/// Both parties of a conversation must agree on `messages_per_address`,
/// `address_length` and the `rotation_*` values, otherwise their derived
/// chat addresses diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum plaintext length of one chat message, in characters
    pub character_limit: usize,
    /// Messages exchanged on one chat address before it rotates
    pub messages_per_address: usize,
    /// Fixed ledger address size
    pub address_length: usize,
    /// Leading characters of the sender address carried in each envelope
    pub signature_prefix_length: usize,
    /// Leading characters of the chat address incremented on rotation
    pub rotation_prefix_length: usize,
    /// Maximum length of the derived part of a rotated address
    pub rotation_max_length: usize,
    /// Number of most recent messages mixed into a rotated address
    pub rotation_window: usize,
    /// Delay between two polls of a chat session
    pub poll_interval_ms: u64,
    /// Minimum payload count passed to the messenger on fetch
    pub fetch_min_count: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            character_limit: 240,
            messages_per_address: 6,
            address_length: crate::types::ADDRESS_LENGTH,
            signature_prefix_length: 30,
            rotation_prefix_length: 15,
            rotation_max_length: 70,
            rotation_window: 3,
            poll_interval_ms: 5_000,
            fetch_min_count: 0,
        }
    }
}

impl ChatConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject values that would break address derivation or polling.
    pub fn validate(&self) -> ChatResult<()> {
        if self.address_length != crate::types::ADDRESS_LENGTH {
            return Err(ChatError::Config(format!(
                "address_length must be {}, got {}",
                crate::types::ADDRESS_LENGTH,
                self.address_length
            )));
        }
        if self.rotation_prefix_length == 0 || self.rotation_prefix_length > self.rotation_max_length
        {
            return Err(ChatError::Config(format!(
                "rotation_prefix_length must be in 1..={}, got {}",
                self.rotation_max_length, self.rotation_prefix_length
            )));
        }
        if self.rotation_max_length > self.address_length {
            return Err(ChatError::Config(format!(
                "rotation_max_length {} exceeds address_length {}",
                self.rotation_max_length, self.address_length
            )));
        }
        if self.signature_prefix_length == 0 || self.signature_prefix_length > self.address_length {
            return Err(ChatError::Config(format!(
                "signature_prefix_length must be in 1..={}, got {}",
                self.address_length, self.signature_prefix_length
            )));
        }
        if self.messages_per_address == 0 {
            return Err(ChatError::Config(
                "messages_per_address must be at least 1".to_string(),
            ));
        }
        if self.character_limit == 0 {
            return Err(ChatError::Config(
                "character_limit must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ChatError::Config(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a JSON config file, falling back to defaults when it is absent.
    ///
    /// Missing keys take their default value.
    pub fn load(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| ChatError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = ChatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address_length, 81);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = ChatConfig {
            messages_per_address: 0,
            ..ChatConfig::default()
        };
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_rejects_prefix_longer_than_max() {
        let config = ChatConfig {
            rotation_prefix_length: 71,
            ..ChatConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ChatConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "messages_per_address": 10, "poll_interval_ms": 250 }"#).unwrap();

        let config = ChatConfig::load(&path).unwrap();
        assert_eq!(config.messages_per_address, 10);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.character_limit, 240);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ChatConfig::load(&path), Err(ChatError::Config(_))));
    }
}
