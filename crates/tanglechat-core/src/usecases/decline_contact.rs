//! DeclineContact: the counterpart turns a request down

use std::sync::Arc;

use tracing::{info, warn};

use super::{failure_code, ResponseCode, Stage};
use crate::crypto::Identity;
use crate::error::ChatError;
use crate::repository::ContactRepository;
use crate::types::{Address, Contact, ContactState, ContactTransition};

/// Output of [`DeclineContact::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclineContactResponse {
    /// Outcome
    pub code: ResponseCode,
}

/// Declines a received contact request.
///
/// Nothing is written to the ledger: the requester's request simply stays
/// unanswered. The record is kept as `Rejected` so later reads of the
/// inbox do not bring the same request back.
pub struct DeclineContact {
    identity: Arc<Identity>,
    contacts: Arc<dyn ContactRepository>,
}

impl DeclineContact {
    /// Wire the use case to its collaborators.
    pub fn new(identity: Arc<Identity>, contacts: Arc<dyn ContactRepository>) -> Self {
        Self { identity, contacts }
    }

    /// Decline the request from `public_key_address`.
    pub fn execute(&self, public_key_address: &Address) -> DeclineContactResponse {
        let code = match self.run(public_key_address) {
            Ok(contact) => {
                info!(contact = %contact.display_name(), "Contact request declined");
                ResponseCode::Success
            }
            Err((stage, e)) => {
                warn!(
                    address = %public_key_address.short(),
                    stage = ?stage,
                    error = %e,
                    "Decline contact failed"
                );
                failure_code(stage, &e)
            }
        };
        DeclineContactResponse { code }
    }

    fn run(&self, public_key_address: &Address) -> Result<Contact, (Stage, ChatError)> {
        let mut contact = self
            .contacts
            .load_by_owner(&self.identity.public_key_address())
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
                    "only received requests can be declined, contact is {}",
                    contact.state()
                )),
            ));
        }
        contact
            .transition(ContactTransition::Reject)
            .map_err(|e| (Stage::Other, e))?;
        self.contacts
            .update(&contact)
            .map_err(|e| (Stage::Persist, e))?;

        Ok(contact)
    }
}
