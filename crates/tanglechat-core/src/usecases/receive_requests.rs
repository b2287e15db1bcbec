//! ReceiveContactRequests: collect announcements from the local inbox

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{failure_code, open_payloads, ResponseCode, Stage};
use crate::config::ChatConfig;
use crate::crypto::{Cipher, Identity};
use crate::error::ChatError;
use crate::ledger::LedgerMessenger;
use crate::protocol::ContactAnnouncement;
use crate::repository::ContactRepository;
use crate::types::{Address, Contact};

/// Output of [`ReceiveContactRequests::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveContactRequestsResponse {
    /// Outcome
    pub code: ResponseCode,
    /// Contacts created in `Received` state by this call
    pub received: Vec<Contact>,
}

/// Turns announcements in the local inbox into `Received` contacts.
///
/// Idempotent: a counterpart already in the contact list is ignored, so the
/// whole inbox can be re-read on every call.
pub struct ReceiveContactRequests {
    identity: Arc<Identity>,
    contacts: Arc<dyn ContactRepository>,
    messenger: Arc<dyn LedgerMessenger>,
    cipher: Arc<dyn Cipher>,
    config: ChatConfig,
}

impl ReceiveContactRequests {
    /// Wire the use case to its collaborators.
    pub fn new(
        identity: Arc<Identity>,
        contacts: Arc<dyn ContactRepository>,
        messenger: Arc<dyn LedgerMessenger>,
        cipher: Arc<dyn Cipher>,
        config: ChatConfig,
    ) -> Self {
        Self {
            identity,
            contacts,
            messenger,
            cipher,
            config,
        }
    }

    /// Read the inbox and store new requests.
    pub async fn execute(&self) -> ReceiveContactRequestsResponse {
        let mut received = Vec::new();
        let code = match self.run(&mut received).await {
            Ok(()) => ResponseCode::Success,
            Err((stage, e)) => {
                warn!(stage = ?stage, error = %e, "Receiving contact requests failed");
                failure_code(stage, &e)
            }
        };
        ReceiveContactRequestsResponse { code, received }
    }

    async fn run(&self, received: &mut Vec<Contact>) -> Result<(), (Stage, ChatError)> {
        let owner = self.identity.public_key_address();
        let inbox = self.identity.contact_address();

        let payloads = self
            .messenger
            .fetch_all(&inbox, self.config.fetch_min_count)
            .await
            .map_err(|e| (Stage::Messenger, e))?;

        let mut known: HashSet<Address> = self
            .contacts
            .load_by_owner(&owner)
            .map_err(|e| (Stage::Persist, e))?
            .into_iter()
            .map(|c| c.public_key_address)
            .collect();
        known.insert(owner.clone());

        let announcements =
            open_payloads::<ContactAnnouncement>(&payloads, self.cipher.as_ref(), &self.identity);

        for (_, announcement) in announcements {
            if !announcement.is_authentic() {
                warn!(
                    address = %announcement.public_key_address.short(),
                    "Ignoring contact request with a foreign key"
                );
                continue;
            }
            if !known.insert(announcement.public_key_address.clone()) {
                debug!(
                    address = %announcement.public_key_address.short(),
                    "Contact request already known"
                );
                continue;
            }

            let mut contact = Contact::received(
                owner.clone(),
                announcement.public_key_address,
                announcement.chat_address,
                announcement.chat_key_address,
                announcement.public_key,
                announcement.name,
                announcement.image_hash,
            );
            contact.contact_address = Some(announcement.contact_address);

            self.contacts
                .insert(&contact)
                .map_err(|e| (Stage::Persist, e))?;
            info!(
                contact = %contact.display_name(),
                address = %contact.public_key_address.short(),
                "Contact request received"
            );
            received.push(contact);
        }

        Ok(())
    }
}
