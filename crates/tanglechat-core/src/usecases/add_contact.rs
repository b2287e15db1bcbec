//! AddContact: the initiator's half of the handshake
//!
//! 1. Resolve the counterpart's published information
//! 2. Build a `Requested` contact with fresh chat and chat key addresses
//! 3. Dual-send the announcement to the counterpart's inbox
//! 4. Persist the contact
//!
//! Nothing is written before the announcement went out, and nothing is
//! retried.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use super::{failure_code, ResponseCode, Stage};
use crate::config::ChatConfig;
use crate::crypto::{Cipher, Identity};
use crate::envelope::Envelope;
use crate::error::{ChatError, ChatResult};
use crate::ledger::{self, LedgerMessenger};
use crate::protocol::{self, ContactAnnouncement};
use crate::repository::{ContactInformationRepository, ContactRepository};
use crate::types::{Address, Contact};

/// Input of [`AddContact::execute`]
#[derive(Debug, Clone)]
pub struct AddContactRequest {
    /// Counterpart's request inbox; the announcement is sent here
    pub contact_address: Address,
    /// Counterpart's public key address, where its information is published
    pub request_address: Address,
    /// The local user's own public key address
    pub public_key_address: Address,
    /// The local user's display name, carried in the announcement
    pub name: String,
    /// The local user's avatar reference
    pub image_hash: Option<String>,
}

/// Output of [`AddContact::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddContactResponse {
    /// Outcome
    pub code: ResponseCode,
}

/// Initiates a contact handshake.
pub struct AddContact {
    identity: Arc<Identity>,
    contacts: Arc<dyn ContactRepository>,
    information: Arc<dyn ContactInformationRepository>,
    messenger: Arc<dyn LedgerMessenger>,
    cipher: Arc<dyn Cipher>,
    config: ChatConfig,
}

impl AddContact {
    /// Wire the use case to its collaborators.
    pub fn new(
        identity: Arc<Identity>,
        contacts: Arc<dyn ContactRepository>,
        information: Arc<dyn ContactInformationRepository>,
        messenger: Arc<dyn LedgerMessenger>,
        cipher: Arc<dyn Cipher>,
        config: ChatConfig,
    ) -> Self {
        Self {
            identity,
            contacts,
            information,
            messenger,
            cipher,
            config,
        }
    }

    /// Run the handshake. Never fails; the outcome is in the response code.
    pub async fn execute(&self, request: AddContactRequest) -> AddContactResponse {
        let code = match self.run(&request).await {
            Ok(contact) => {
                info!(
                    contact = %contact.display_name(),
                    address = %contact.public_key_address.short(),
                    "Contact request sent"
                );
                ResponseCode::Success
            }
            Err((stage, e)) => {
                warn!(
                    request = %request.request_address.short(),
                    stage = ?stage,
                    error = %e,
                    "Add contact failed"
                );
                failure_code(stage, &e)
            }
        };
        AddContactResponse { code }
    }

    async fn run(&self, request: &AddContactRequest) -> Result<Contact, (Stage, ChatError)> {
        if request.public_key_address != self.identity.public_key_address() {
            return Err((
                Stage::Other,
                ChatError::InvalidAddress("request is not for the local identity".to_string()),
            ));
        }

        let info = self
            .information
            .load_by_address(&request.request_address)
            .await
            .map_err(|e| (Stage::Resolve, e))?;
        if !info.is_authentic() {
            return Err((
                Stage::Resolve,
                ChatError::ContactInformationNotFound(format!(
                    "{} publishes a foreign key",
                    request.request_address
                )),
            ));
        }

        let owner = request.public_key_address.clone();
        let existing = self
            .contacts
            .load_by_owner(&owner)
            .map_err(|e| (Stage::Persist, e))?;
        if existing
            .iter()
            .any(|c| c.public_key_address == info.address)
        {
            return Err((
                Stage::Persist,
                ChatError::Persistence(format!("{} is already a contact", info.address.short())),
            ));
        }

        let (chat_address, chat_key_address) =
            fresh_addresses(&existing).map_err(|e| (Stage::Other, e))?;

        let mut contact = Contact::requested(
            owner,
            info.address.clone(),
            chat_address.clone(),
            chat_key_address.clone(),
            Some(info.public_key),
            info.name.clone(),
            info.image_hash.clone(),
        );
        contact.contact_address = Some(request.contact_address.clone());

        let announcement = ContactAnnouncement {
            public_key_address: self.identity.public_key_address(),
            contact_address: self.identity.contact_address(),
            public_key: self.identity.public_key(),
            name: request.name.clone(),
            image_hash: request.image_hash.clone(),
            chat_address,
            chat_key_address,
        };
        let (theirs, mine) = protocol::to_json(&announcement)
            .and_then(|plaintext| {
                Envelope::seal_pair(
                    self.cipher.as_ref(),
                    &info.public_key,
                    &self.identity,
                    &plaintext,
                    self.config.signature_prefix_length,
                )
            })
            .map_err(|e| (Stage::Other, e))?;

        ledger::send_pair(
            self.messenger.as_ref(),
            &request.contact_address,
            &theirs,
            &mine,
        )
        .await
        .map_err(|e| (Stage::Messenger, e))?;

        self.contacts
            .insert(&contact)
            .map_err(|e| (Stage::Persist, e))?;

        Ok(contact)
    }
}

/// Random chat and chat key addresses not used by any existing contact.
fn fresh_addresses(existing: &[Contact]) -> ChatResult<(Address, Address)> {
    let taken: HashSet<&Address> = existing
        .iter()
        .flat_map(|c| [c.chat_address(), &c.chat_key_address])
        .collect();

    let chat_address = fresh_address(&taken)?;
    let chat_key_address = loop {
        let candidate = fresh_address(&taken)?;
        if candidate != chat_address {
            break candidate;
        }
    };
    Ok((chat_address, chat_key_address))
}

fn fresh_address(taken: &HashSet<&Address>) -> ChatResult<Address> {
    loop {
        let candidate = Address::random()?;
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }
}
