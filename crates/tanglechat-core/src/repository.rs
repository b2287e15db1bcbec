//! Contact repositories
//!
//! - [`ContactRepository`]: durable store of [`Contact`] records keyed by
//!   owner, implemented by [`Storage`](crate::storage::Storage) and
//!   [`MemoryContactRepository`].
//! - [`ContactInformationRepository`]: resolves a request address to the
//!   counterpart's published [`ContactInformation`], implemented over the
//!   ledger by [`LedgerContactInformationRepository`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::ledger::LedgerMessenger;
use crate::protocol::{self, ContactInformation};
use crate::types::{Address, Contact};

/// Durable store of contacts.
///
/// Records are unique per `(owner, public_key_address)` and are returned in
/// insertion order.
pub trait ContactRepository: Send + Sync {
    /// Insert a new contact; fails if one already exists for the same key.
    fn insert(&self, contact: &Contact) -> ChatResult<()>;

    /// Every contact owned by `owner`, oldest first.
    fn load_by_owner(&self, owner: &Address) -> ChatResult<Vec<Contact>>;

    /// Replace an existing contact, keeping its position.
    fn update(&self, contact: &Contact) -> ChatResult<()>;
}

/// Resolves published contact information.
#[async_trait]
pub trait ContactInformationRepository: Send + Sync {
    /// Load the information published at `request_address`.
    ///
    /// Fails with [`ChatError::ContactInformationNotFound`] when nothing
    /// usable is published there.
    async fn load_by_address(&self, request_address: &Address) -> ChatResult<ContactInformation>;
}

/// In-memory contact repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryContactRepository {
    contacts: Arc<RwLock<Vec<Contact>>>,
}

impl MemoryContactRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored contacts across owners
    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }
}

impl ContactRepository for MemoryContactRepository {
    fn insert(&self, contact: &Contact) -> ChatResult<()> {
        let mut contacts = self.contacts.write();
        if contacts.iter().any(|c| same_key(c, contact)) {
            return Err(ChatError::Persistence(format!(
                "contact {} already exists",
                contact.public_key_address.short()
            )));
        }
        contacts.push(contact.clone());
        Ok(())
    }

    fn load_by_owner(&self, owner: &Address) -> ChatResult<Vec<Contact>> {
        Ok(self
            .contacts
            .read()
            .iter()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect())
    }

    fn update(&self, contact: &Contact) -> ChatResult<()> {
        let mut contacts = self.contacts.write();
        let slot = contacts
            .iter_mut()
            .find(|c| same_key(c, contact))
            .ok_or_else(|| ChatError::ContactNotFound(contact.public_key_address.to_string()))?;
        *slot = contact.clone();
        Ok(())
    }
}

fn same_key(a: &Contact, b: &Contact) -> bool {
    a.owner == b.owner && a.public_key_address == b.public_key_address
}

/// Resolves contact information published in clear on the ledger.
pub struct LedgerContactInformationRepository {
    messenger: Arc<dyn LedgerMessenger>,
    min_count: usize,
}

impl LedgerContactInformationRepository {
    /// Resolve over `messenger`.
    pub fn new(messenger: Arc<dyn LedgerMessenger>) -> Self {
        Self {
            messenger,
            min_count: 0,
        }
    }

    /// Publish `info` at its own address.
    pub async fn publish(&self, info: &ContactInformation) -> ChatResult<()> {
        if !info.is_authentic() {
            return Err(ChatError::InvalidKey(
                "public key does not match the publishing address".to_string(),
            ));
        }
        let payload = String::from_utf8(protocol::to_json(info)?)
            .map_err(|e| ChatError::Serialization(e.to_string()))?;
        self.messenger.send(&info.address, &payload).await?;
        info!(address = %info.address.short(), "Published contact information");
        Ok(())
    }
}

#[async_trait]
impl ContactInformationRepository for LedgerContactInformationRepository {
    async fn load_by_address(&self, request_address: &Address) -> ChatResult<ContactInformation> {
        let payloads = self
            .messenger
            .fetch_all(request_address, self.min_count)
            .await?;

        // Latest authentic record wins; anything else at the address is noise
        let found = payloads.iter().rev().find_map(|payload| {
            match protocol::from_json::<ContactInformation>(payload.as_bytes()) {
                Ok(info) if &info.address == request_address && info.is_authentic() => Some(info),
                Ok(_) => {
                    debug!(address = %request_address.short(), "Ignoring unauthentic contact information");
                    None
                }
                Err(_) => None,
            }
        });

        found.ok_or_else(|| ChatError::ContactInformationNotFound(request_address.to_string()))
    }
}
