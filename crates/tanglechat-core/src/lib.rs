//! Tanglechat Core Library
//!
//! Contact handshake and end-to-end encrypted chat over an append-only,
//! address-keyed public ledger.
//!
//! ## Overview
//!
//! Two parties who know only each other's public key addresses:
//!
//! 1. establish each other's public keys from published contact information,
//! 2. agree on a private chat address through an encrypted announcement,
//! 3. exchange dual-encrypted envelopes on that address, and
//! 4. rotate the address deterministically from the conversation itself, so
//!    an observer of the ledger cannot follow the conversation.
//!
//! The ledger offers no acknowledgements, no deletion and no ordering beyond
//! arrival order at one address. Anyone may write to any address, so every
//! reader skips payloads it cannot parse or decrypt.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tanglechat_core::*;
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let identity = Arc::new(Identity::generate()?);
//! let contacts = Arc::new(MemoryContactRepository::new());
//!
//! PublishContactInformation::new(identity.clone(), ledger.clone())
//!     .execute("Alice", None)
//!     .await;
//!
//! let add = AddContact::new(
//!     identity.clone(),
//!     contacts.clone(),
//!     Arc::new(LedgerContactInformationRepository::new(ledger.clone())),
//!     ledger.clone(),
//!     Arc::new(SealedBoxCipher),
//!     ChatConfig::default(),
//! );
//! let response = add.execute(request).await;
//! println!("{}", response.code.prompt());
//! ```

pub mod chat;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod repository;
pub mod rotation;
pub mod storage;
pub mod types;
pub mod usecases;

// Re-exports
pub use chat::{ChatMessage, ChatSession, Conversation, PollOutcome, SessionState};
pub use config::ChatConfig;
pub use crypto::{Cipher, Identity, PublicKey, SealedBoxCipher};
pub use envelope::Envelope;
pub use error::{ChatError, ChatResult, ErrorKind};
pub use ledger::{LedgerMessenger, LedgerStore, MemoryLedger};
pub use protocol::{ChatPayload, ContactAcceptance, ContactAnnouncement, ContactInformation};
pub use repository::{
    ContactInformationRepository, ContactRepository, LedgerContactInformationRepository,
    MemoryContactRepository,
};
pub use rotation::AddressDeriver;
pub use storage::{LocalProfile, Storage};
pub use types::*;
pub use usecases::{
    AcceptContact, AcceptContactResponse, AddContact, AddContactRequest, AddContactResponse,
    ConfirmContacts, ConfirmContactsResponse, DeclineContact, DeclineContactResponse, GetContacts,
    GetContactsCode, GetContactsResponse, PublishContactInformation, PublishResponse,
    ReceiveContactRequests, ReceiveContactRequestsResponse, ResponseCode,
};
