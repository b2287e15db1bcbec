//! Application payloads carried on the ledger
//!
//! | Payload                | Published on                  | Encrypted |
//! |------------------------|-------------------------------|-----------|
//! | [`ContactInformation`] | owner's public key address    | no        |
//! | [`ContactAnnouncement`]| counterpart's contact address | envelope  |
//! | [`ContactAcceptance`]  | contact's chat key address    | envelope  |
//! | [`ChatPayload`]        | contact's chat address        | envelope  |
//!
//! All payloads are JSON. Encrypted ones travel as the plaintext of an
//! [`Envelope`](crate::envelope::Envelope).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Serialize a payload to JSON bytes.
pub fn to_json<T: Serialize>(value: &T) -> ChatResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ChatError::Serialization(e.to_string()))
}

/// Parse a payload from JSON bytes.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> ChatResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ChatError::Serialization(e.to_string()))
}

/// Public identity record, published in clear at the owner's public key address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInformation {
    /// Public key address the record is published under
    pub address: Address,
    /// Inbox for contact requests
    pub contact_address: Address,
    /// Encryption key
    pub public_key: PublicKey,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Avatar reference
    #[serde(default)]
    pub image_hash: Option<String>,
}

impl ContactInformation {
    /// True if the published key is the one the address was derived from.
    pub fn is_authentic(&self) -> bool {
        self.public_key.matches_address(&self.address)
    }
}

/// Contact request sent by the initiator to the counterpart's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAnnouncement {
    /// Requester's public key address
    pub public_key_address: Address,
    /// Requester's inbox
    pub contact_address: Address,
    /// Requester's encryption key
    pub public_key: PublicKey,
    /// Requester's display name
    pub name: String,
    /// Requester's avatar reference
    pub image_hash: Option<String>,
    /// Shared chat address chosen by the requester
    pub chat_address: Address,
    /// Address the counterpart answers on
    pub chat_key_address: Address,
}

impl ContactAnnouncement {
    /// True if the announced key is the one the announced address was derived from.
    pub fn is_authentic(&self) -> bool {
        self.public_key.matches_address(&self.public_key_address)
    }
}

/// Answer to an announcement, published on the chat key address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAcceptance {
    /// Accepting party's public key address
    pub public_key_address: Address,
    /// Accepting party's encryption key
    pub public_key: PublicKey,
}

/// Plaintext of one chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Message text
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;

    #[test]
    fn test_contact_information_authenticity() {
        let identity = Identity::generate().unwrap();
        let other = Identity::generate().unwrap();

        let mut info = ContactInformation {
            address: identity.public_key_address(),
            contact_address: identity.contact_address(),
            public_key: identity.public_key(),
            name: "Alice".to_string(),
            image_hash: None,
        };
        assert!(info.is_authentic());

        info.public_key = other.public_key();
        assert!(!info.is_authentic());
    }

    #[test]
    fn test_contact_information_json_defaults() {
        let identity = Identity::generate().unwrap();
        let json = format!(
            r#"{{"address":"{}","contact_address":"{}","public_key":"{}"}}"#,
            identity.public_key_address(),
            identity.contact_address(),
            identity.public_key().to_hex()
        );
        let info: ContactInformation = from_json(json.as_bytes()).unwrap();
        assert!(info.name.is_empty());
        assert!(info.image_hash.is_none());
        assert!(info.is_authentic());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result: ChatResult<ChatPayload> = from_json(b"{\"nope\":1}");
        assert!(matches!(result, Err(ChatError::Serialization(_))));
    }
}
