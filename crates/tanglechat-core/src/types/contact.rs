//! Contact types
//!
//! A [`Contact`] is one counterpart relationship owned by exactly one local
//! identity. It carries the shared chat addresses agreed during the
//! handshake and a lifecycle [`ContactState`] that only changes through
//! [`Contact::transition`].

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Lifecycle state of a contact, with the time it was entered.
///
/// ```text
/// Requested ──┬──> Accepted
///             └──> Rejected
/// Received  ──┬──> Accepted
///             └──> Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactState {
    /// I sent the request, waiting for the counterpart
    Requested { requested_at: i64 },
    /// The counterpart sent me a request, waiting for my decision
    Received { received_at: i64 },
    /// Handshake completed
    Accepted { accepted_at: i64 },
    /// Counterpart is unusable (e.g. invalid public key) or was declined
    Rejected { rejected_at: i64 },
}

impl ContactState {
    /// Unix timestamp at which this state was entered
    pub fn since(&self) -> i64 {
        match *self {
            Self::Requested { requested_at } => requested_at,
            Self::Received { received_at } => received_at,
            Self::Accepted { accepted_at } => accepted_at,
            Self::Rejected { rejected_at } => rejected_at,
        }
    }

    /// Apply a transition, returning the new state.
    fn apply(self, transition: ContactTransition, at: i64) -> ChatResult<Self> {
        match (self, transition) {
            (Self::Requested { .. } | Self::Received { .. }, ContactTransition::Accept) => {
                Ok(Self::Accepted { accepted_at: at })
            }
            (Self::Requested { .. } | Self::Received { .. }, ContactTransition::Reject) => {
                Ok(Self::Rejected { rejected_at: at })
            }
            (from, transition) => Err(ChatError::InvalidTransition(format!(
                "cannot {} a contact that is {}",
                transition, from
            ))),
        }
    }
}

impl std::fmt::Display for ContactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested { .. } => write!(f, "Requested"),
            Self::Received { .. } => write!(f, "Received"),
            Self::Accepted { .. } => write!(f, "Accepted"),
            Self::Rejected { .. } => write!(f, "Rejected"),
        }
    }
}

/// A requested lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactTransition {
    /// Complete the handshake
    Accept,
    /// Give up on the counterpart
    Reject,
}

impl std::fmt::Display for ContactTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Contact record in a user's contact list
///
/// Uniquely identified by `(owner, public_key_address)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Public key address of the local identity owning this record
    pub owner: Address,
    /// Counterpart's long-lived identity address
    pub public_key_address: Address,
    /// Counterpart's request inbox
    pub contact_address: Option<Address>,
    /// Current shared chat address (rotates)
    chat_address: Address,
    /// Address the handshake completion is published on
    pub chat_key_address: Address,
    /// Counterpart's public key, cached once resolved
    pub public_key: Option<PublicKey>,
    /// Display name
    pub name: String,
    /// Avatar reference, opaque to the protocol
    pub image_hash: Option<String>,
    state: ContactState,
    /// Unix timestamp when the record was created
    pub created_at: i64,
}

impl Contact {
    /// A contact I am requesting, with fresh chat addresses.
    #[allow(clippy::too_many_arguments)]
    pub fn requested(
        owner: Address,
        public_key_address: Address,
        chat_address: Address,
        chat_key_address: Address,
        public_key: Option<PublicKey>,
        name: String,
        image_hash: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            owner,
            public_key_address,
            contact_address: None,
            chat_address,
            chat_key_address,
            public_key,
            name,
            image_hash,
            state: ContactState::Requested { requested_at: now },
            created_at: now,
        }
    }

    /// A contact whose request I received, sharing the requester's chat addresses.
    #[allow(clippy::too_many_arguments)]
    pub fn received(
        owner: Address,
        public_key_address: Address,
        chat_address: Address,
        chat_key_address: Address,
        public_key: PublicKey,
        name: String,
        image_hash: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            owner,
            public_key_address,
            contact_address: None,
            chat_address,
            chat_key_address,
            public_key: Some(public_key),
            name,
            image_hash,
            state: ContactState::Received { received_at: now },
            created_at: now,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContactState {
        self.state
    }

    /// Current shared chat address
    pub fn chat_address(&self) -> &Address {
        &self.chat_address
    }

    /// I initiated this contact and it is still open
    pub fn is_requested(&self) -> bool {
        matches!(self.state, ContactState::Requested { .. })
    }

    /// Handshake completed
    pub fn is_accepted(&self) -> bool {
        matches!(self.state, ContactState::Accepted { .. })
    }

    /// Counterpart determined unusable
    pub fn is_rejected(&self) -> bool {
        matches!(self.state, ContactState::Rejected { .. })
    }

    /// The only way to change a contact's lifecycle state.
    ///
    /// Accepted and rejected are terminal.
    pub fn transition(&mut self, transition: ContactTransition) -> ChatResult<()> {
        self.state = self
            .state
            .apply(transition, chrono::Utc::now().timestamp())?;
        Ok(())
    }

    /// Replace the chat address after a rotation.
    pub fn rotate_chat_address(&mut self, next: Address) {
        self.chat_address = next;
    }

    /// Human readable one-liner for listings
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.public_key_address.short()
        } else {
            self.name.clone()
        }
    }
}
