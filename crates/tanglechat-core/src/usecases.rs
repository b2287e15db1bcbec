//! Use cases at the application boundary
//!
//! Every use case takes its collaborators as trait objects at construction
//! and reports its outcome as a closed response code. No [`ChatError`]
//! escapes `execute`: each failure is logged and mapped according to the
//! stage it happened in.
//!
//! | Use case                     | Side                   |
//! |------------------------------|------------------------|
//! | [`PublishContactInformation`]| everyone, once         |
//! | [`AddContact`]               | initiator              |
//! | [`ReceiveContactRequests`]   | counterpart            |
//! | [`AcceptContact`]            | counterpart            |
//! | [`DeclineContact`]           | counterpart            |
//! | [`ConfirmContacts`]          | initiator              |
//! | [`GetContacts`]              | either                 |

mod accept_contact;
mod add_contact;
mod confirm_contacts;
mod decline_contact;
mod get_contacts;
mod publish;
mod receive_requests;

pub use accept_contact::{AcceptContact, AcceptContactResponse};
pub use add_contact::{AddContact, AddContactRequest, AddContactResponse};
pub use confirm_contacts::{ConfirmContacts, ConfirmContactsResponse};
pub use decline_contact::{DeclineContact, DeclineContactResponse};
pub use get_contacts::{GetContacts, GetContactsCode, GetContactsResponse};
pub use publish::{PublishContactInformation, PublishResponse};
pub use receive_requests::{ReceiveContactRequests, ReceiveContactRequestsResponse};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::crypto::{Cipher, Identity};
use crate::envelope::Envelope;
use crate::error::{ChatError, ErrorKind};
use crate::protocol;

/// Outcome of a handshake use case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Everything went through
    Success,
    /// The contact store refused the write
    CannotAddContact,
    /// The ledger refused a send or fetch
    MessengerException,
    /// Nothing usable is published for the counterpart
    NoContactInformationPresent,
    /// Any other failure
    UnknownException,
}

impl ResponseCode {
    /// True for [`ResponseCode::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// User-facing prompt for this outcome.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Success => "Done.",
            Self::CannotAddContact => "The contact could not be saved.",
            Self::MessengerException => "The ledger could not be reached. Try again later.",
            Self::NoContactInformationPresent => {
                "No contact information is published at that address."
            }
            Self::UnknownException => "Something went wrong.",
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Where in a use case a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Resolving the counterpart's published information
    Resolve,
    /// Sending to or fetching from the ledger
    Messenger,
    /// Reading or writing the contact store
    Persist,
    /// Anything else (sealing, serialization, transitions)
    Other,
}

/// Map a failure to the response code for the stage it happened in.
pub(crate) fn failure_code(stage: Stage, error: &ChatError) -> ResponseCode {
    match (stage, error.kind()) {
        (Stage::Resolve, ErrorKind::NotFound) => ResponseCode::NoContactInformationPresent,
        (Stage::Messenger, _) | (_, ErrorKind::DeliveryFailure) => {
            ResponseCode::MessengerException
        }
        (Stage::Persist, _) => ResponseCode::CannotAddContact,
        _ => ResponseCode::UnknownException,
    }
}

/// Decrypt and parse every envelope in `payloads` addressed to `identity`.
///
/// The identity's own copies, noise, and payloads that are not a `T` are
/// skipped.
pub(crate) fn open_payloads<T: DeserializeOwned>(
    payloads: &[String],
    cipher: &dyn Cipher,
    identity: &Identity,
) -> Vec<(Envelope, T)> {
    let own_address = identity.public_key_address();
    let mut out = Vec::new();

    for payload in payloads {
        for decoded in Envelope::decode_all(payload) {
            let envelope = match decoded {
                Ok(envelope) if !envelope.is_from(&own_address) => envelope,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "Skipping malformed payload");
                    continue;
                }
            };
            let parsed = envelope
                .open(cipher, identity)
                .and_then(|plaintext| protocol::from_json::<T>(&plaintext));
            match parsed {
                Ok(value) => out.push((envelope, value)),
                Err(e) => debug!(error = %e, "Skipping unreadable envelope"),
            }
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Collaborator fakes shared by the use-case tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::crypto::Identity;
    use crate::error::{ChatError, ChatResult};
    use crate::ledger::{LedgerMessenger, MemoryLedger};
    use crate::protocol::ContactInformation;
    use crate::repository::{
        ContactInformationRepository, ContactRepository, LedgerContactInformationRepository,
        MemoryContactRepository,
    };
    use crate::types::{Address, Contact};

    /// Ledger that counts sends and can be switched to fail them
    #[derive(Default)]
    pub struct CountingLedger {
        pub inner: MemoryLedger,
        pub sends: AtomicUsize,
        pub fail_sends: bool,
        pub fail_fetches: bool,
    }

    impl CountingLedger {
        pub fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::default()
            }
        }

        pub fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerMessenger for CountingLedger {
        async fn send(&self, address: &Address, payload: &str) -> ChatResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail_sends {
                return Err(ChatError::Delivery("node unreachable".into()));
            }
            self.inner.send(address, payload).await
        }

        async fn fetch_all(&self, address: &Address, min_count: usize) -> ChatResult<Vec<String>> {
            if self.fail_fetches {
                return Err(ChatError::Delivery("node unreachable".into()));
            }
            self.inner.fetch_all(address, min_count).await
        }
    }

    /// Repository whose writes always fail
    #[derive(Default)]
    pub struct FailingRepository {
        pub fail_reads: bool,
    }

    impl ContactRepository for FailingRepository {
        fn insert(&self, _contact: &Contact) -> ChatResult<()> {
            Err(ChatError::Persistence("disk full".into()))
        }

        fn load_by_owner(&self, _owner: &Address) -> ChatResult<Vec<Contact>> {
            if self.fail_reads {
                return Err(ChatError::Persistence("database locked".into()));
            }
            Ok(Vec::new())
        }

        fn update(&self, _contact: &Contact) -> ChatResult<()> {
            Err(ChatError::Persistence("disk full".into()))
        }
    }

    /// Information repository returning a fixed record
    pub struct FixedInformation(pub Option<ContactInformation>);

    #[async_trait]
    impl ContactInformationRepository for FixedInformation {
        async fn load_by_address(&self, address: &Address) -> ChatResult<ContactInformation> {
            self.0
                .clone()
                .ok_or_else(|| ChatError::ContactInformationNotFound(address.to_string()))
        }
    }

    pub fn information(identity: &Identity, name: &str) -> ContactInformation {
        ContactInformation {
            address: identity.public_key_address(),
            contact_address: identity.contact_address(),
            public_key: identity.public_key(),
            name: name.to_string(),
            image_hash: None,
        }
    }

    /// One user with a local store, sharing a ledger with others
    pub struct User {
        pub identity: Arc<Identity>,
        pub contacts: Arc<MemoryContactRepository>,
    }

    impl User {
        pub async fn published(ledger: &Arc<MemoryLedger>, name: &str) -> Self {
            let identity = Arc::new(Identity::generate().unwrap());
            LedgerContactInformationRepository::new(ledger.clone())
                .publish(&information(&identity, name))
                .await
                .unwrap();
            Self {
                identity,
                contacts: Arc::new(MemoryContactRepository::new()),
            }
        }

        pub fn address(&self) -> Address {
            self.identity.public_key_address()
        }

        pub fn stored(&self) -> Vec<Contact> {
            self.contacts.load_by_owner(&self.address()).unwrap()
        }
    }
}
