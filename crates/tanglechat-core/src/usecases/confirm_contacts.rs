//! ConfirmContacts: the initiator picks up acceptances

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{failure_code, open_payloads, ResponseCode, Stage};
use crate::config::ChatConfig;
use crate::crypto::{Cipher, Identity};
use crate::error::ChatError;
use crate::ledger::LedgerMessenger;
use crate::protocol::ContactAcceptance;
use crate::repository::ContactRepository;
use crate::types::{Contact, ContactTransition};

/// Output of [`ConfirmContacts::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmContactsResponse {
    /// Outcome
    pub code: ResponseCode,
    /// Contacts moved to `Accepted` by this call
    pub accepted: Vec<Contact>,
    /// Contacts moved to `Rejected` by this call
    pub rejected: Vec<Contact>,
}

/// Checks every `Requested` contact's chat key address for an acceptance.
///
/// An acceptance carrying the key resolved during AddContact accepts the
/// contact. One carrying any other key, or a key that does not match its
/// own address, rejects it.
pub struct ConfirmContacts {
    identity: Arc<Identity>,
    contacts: Arc<dyn ContactRepository>,
    messenger: Arc<dyn LedgerMessenger>,
    cipher: Arc<dyn Cipher>,
    config: ChatConfig,
}

impl ConfirmContacts {
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

    /// Resolve every open request that has been answered.
    pub async fn execute(&self) -> ConfirmContactsResponse {
        let mut response = ConfirmContactsResponse {
            code: ResponseCode::Success,
            accepted: Vec::new(),
            rejected: Vec::new(),
        };
        if let Err((stage, e)) = self.run(&mut response).await {
            warn!(stage = ?stage, error = %e, "Confirming contacts failed");
            response.code = failure_code(stage, &e);
        }
        response
    }

    async fn run(&self, response: &mut ConfirmContactsResponse) -> Result<(), (Stage, ChatError)> {
        let owner = self.identity.public_key_address();
        let open: Vec<Contact> = self
            .contacts
            .load_by_owner(&owner)
            .map_err(|e| (Stage::Persist, e))?
            .into_iter()
            .filter(Contact::is_requested)
            .collect();

        for mut contact in open {
            let payloads = self
                .messenger
                .fetch_all(&contact.chat_key_address, self.config.fetch_min_count)
                .await
                .map_err(|e| (Stage::Messenger, e))?;

            let answer = open_payloads::<ContactAcceptance>(
                &payloads,
                self.cipher.as_ref(),
                &self.identity,
            )
            .into_iter()
            .map(|(_, acceptance)| acceptance)
            .find(|a| a.public_key_address == contact.public_key_address);

            let Some(acceptance) = answer else {
                debug!(contact = %contact.display_name(), "No answer yet");
                continue;
            };

            let genuine = acceptance.public_key.matches_address(&acceptance.public_key_address)
                && contact.public_key == Some(acceptance.public_key);
            let transition = if genuine {
                ContactTransition::Accept
            } else {
                warn!(
                    contact = %contact.display_name(),
                    "Acceptance carries an unexpected key, rejecting contact"
                );
                ContactTransition::Reject
            };

            contact
                .transition(transition)
                .map_err(|e| (Stage::Other, e))?;
            self.contacts
                .update(&contact)
                .map_err(|e| (Stage::Persist, e))?;

            info!(contact = %contact.display_name(), state = %contact.state(), "Contact confirmed");
            match transition {
                ContactTransition::Accept => response.accepted.push(contact),
                ContactTransition::Reject => response.rejected.push(contact),
            }
        }

        Ok(())
    }
}
