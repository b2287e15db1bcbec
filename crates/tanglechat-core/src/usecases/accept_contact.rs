//! AcceptContact: the counterpart completes the handshake

use std::sync::Arc;

use tracing::{info, warn};

use super::{failure_code, ResponseCode, Stage};
use crate::config::ChatConfig;
use crate::crypto::{Cipher, Identity};
use crate::envelope::Envelope;
use crate::error::ChatError;
use crate::ledger::{self, LedgerMessenger};
use crate::protocol::{self, ContactAcceptance};
use crate::repository::ContactRepository;
use crate::types::{Address, Contact, ContactState, ContactTransition};

/// Output of [`AcceptContact::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptContactResponse {
    /// Outcome
    pub code: ResponseCode,
}

/// Accepts a received contact request.
///
/// The acceptance is dual-sent to the contact's chat key address before
/// the `Received → Accepted` transition is persisted.
pub struct AcceptContact {
    identity: Arc<Identity>,
    contacts: Arc<dyn ContactRepository>,
    messenger: Arc<dyn LedgerMessenger>,
    cipher: Arc<dyn Cipher>,
    config: ChatConfig,
}

impl AcceptContact {
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

    /// Accept the request from `public_key_address`.
    pub async fn execute(&self, public_key_address: &Address) -> AcceptContactResponse {
        let code = match self.run(public_key_address).await {
            Ok(contact) => {
                info!(contact = %contact.display_name(), "Contact accepted");
                ResponseCode::Success
            }
            Err((stage, e)) => {
                warn!(
                    address = %public_key_address.short(),
                    stage = ?stage,
                    error = %e,
                    "Accept contact failed"
                );
                failure_code(stage, &e)
            }
        };
        AcceptContactResponse { code }
    }

    async fn run(&self, public_key_address: &Address) -> Result<Contact, (Stage, ChatError)> {
        let owner = self.identity.public_key_address();
        let mut contact = self
            .contacts
            .load_by_owner(&owner)
            .map_err(|e| (Stage::Persist, e))?
            .into_iter()
            .find(|c| &c.public_key_address == public_key_address)
            .ok_or_else(|| {
                (
                    Stage::Resolve,
                    ChatError::ContactNotFound(public_key_address.to_string()),
                )
            })?;

        if !matches!(contact.state(), ContactState::Received { .. }) {
            return Err((
                Stage::Other,
                ChatError::InvalidTransition(format!(
                    "only received requests can be accepted, contact is {}",
                    contact.state()
                )),
            ));
        }
        let counterpart = contact.public_key.ok_or_else(|| {
            (
                Stage::Other,
                ChatError::InvalidKey("received contact has no public key".to_string()),
            )
        })?;
        contact
            .transition(ContactTransition::Accept)
            .map_err(|e| (Stage::Other, e))?;

        let acceptance = ContactAcceptance {
            public_key_address: owner,
            public_key: self.identity.public_key(),
        };
        let (theirs, mine) = protocol::to_json(&acceptance)
            .and_then(|plaintext| {
                Envelope::seal_pair(
                    self.cipher.as_ref(),
                    &counterpart,
                    &self.identity,
                    &plaintext,
                    self.config.signature_prefix_length,
                )
            })
            .map_err(|e| (Stage::Other, e))?;

        ledger::send_pair(
            self.messenger.as_ref(),
            &contact.chat_key_address,
            &theirs,
            &mine,
        )
        .await
        .map_err(|e| (Stage::Messenger, e))?;

        self.contacts
            .update(&contact)
            .map_err(|e| (Stage::Persist, e))?;

        Ok(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::{CountingLedger, User};
    use super::super::{AddContact, AddContactRequest, ReceiveContactRequests};
    use super::*;
    use crate::crypto::SealedBoxCipher;
    use crate::ledger::MemoryLedger;
    use crate::repository::LedgerContactInformationRepository;

    /// Alice requests Bob, Bob reads his inbox
    async fn handshake_until_received(ledger: &Arc<MemoryLedger>) -> (User, User) {
        let alice = User::published(ledger, "Alice").await;
        let bob = User::published(ledger, "Bob").await;

        let add = AddContact::new(
            alice.identity.clone(),
            alice.contacts.clone(),
            Arc::new(LedgerContactInformationRepository::new(ledger.clone())),
            ledger.clone(),
            Arc::new(SealedBoxCipher),
            ChatConfig::default(),
        );
        let code = add
            .execute(AddContactRequest {
                contact_address: bob.identity.contact_address(),
                request_address: bob.address(),
                public_key_address: alice.address(),
                name: "Alice".to_string(),
                image_hash: None,
            })
            .await
            .code;
        assert_eq!(code, ResponseCode::Success);

        let received = ReceiveContactRequests::new(
            bob.identity.clone(),
            bob.contacts.clone(),
            ledger.clone(),
            Arc::new(SealedBoxCipher),
            ChatConfig::default(),
        )
        .execute()
        .await;
        assert_eq!(received.received.len(), 1);

        (alice, bob)
    }

    fn acceptor(user: &User, ledger: Arc<dyn LedgerMessenger>) -> AcceptContact {
        AcceptContact::new(
            user.identity.clone(),
            user.contacts.clone(),
            ledger,
            Arc::new(SealedBoxCipher),
            ChatConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_accept_sends_acceptance_and_persists() {
        let ledger = Arc::new(MemoryLedger::new());
        let (alice, bob) = handshake_until_received(&ledger).await;

        let response = acceptor(&bob, ledger.clone()).execute(&alice.address()).await;
        assert_eq!(response.code, ResponseCode::Success);

        let contact = &bob.stored()[0];
        assert!(contact.is_accepted());
        assert_eq!(ledger.count(&contact.chat_key_address), 2);
    }

    #[tokio::test]
    async fn test_accept_twice_is_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let (alice, bob) = handshake_until_received(&ledger).await;
        let use_case = acceptor(&bob, ledger.clone());

        assert!(use_case.execute(&alice.address()).await.code.is_success());
        assert_eq!(
            use_case.execute(&alice.address()).await.code,
            ResponseCode::UnknownException
        );
    }

    #[tokio::test]
    async fn test_accept_unknown_contact() {
        let ledger = Arc::new(MemoryLedger::new());
        let (_alice, bob) = handshake_until_received(&ledger).await;
        let stranger = Address::random().unwrap();

        let response = acceptor(&bob, ledger.clone()).execute(&stranger).await;
        assert_eq!(response.code, ResponseCode::NoContactInformationPresent);
    }

    #[tokio::test]
    async fn test_initiator_cannot_accept_own_request() {
        let ledger = Arc::new(MemoryLedger::new());
        let (alice, bob) = handshake_until_received(&ledger).await;

        let response = acceptor(&alice, ledger.clone()).execute(&bob.address()).await;
        assert_eq!(response.code, ResponseCode::UnknownException);
        assert!(alice.stored()[0].is_requested());
    }

    #[tokio::test]
    async fn test_messenger_failure_keeps_request_pending() {
        let ledger = Arc::new(MemoryLedger::new());
        let (alice, bob) = handshake_until_received(&ledger).await;

        let failing = Arc::new(CountingLedger::failing());
        let response = acceptor(&bob, failing).execute(&alice.address()).await;

        assert_eq!(response.code, ResponseCode::MessengerException);
        assert!(!bob.stored()[0].is_accepted());
    }
}
