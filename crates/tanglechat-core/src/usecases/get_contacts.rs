//! GetContacts: split a user's contacts into approved and pending

use std::sync::Arc;

use tracing::warn;

use crate::error::ErrorKind;
use crate::repository::ContactRepository;
use crate::types::{Address, Contact};

/// Outcome of [`GetContacts::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetContactsCode {
    /// Contacts were loaded
    Success,
    /// The contact store could not be read
    ContactsUnavailable,
    /// Any other failure
    UnknownException,
}

/// Output of [`GetContacts::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetContactsResponse {
    /// Outcome
    pub code: GetContactsCode,
    /// Accepted contacts, in insertion order
    pub approved_contacts: Vec<Contact>,
    /// Every other contact, in insertion order
    pub pending_contact_requests: Vec<Contact>,
}

/// Read-only contact listing.
pub struct GetContacts {
    contacts: Arc<dyn ContactRepository>,
}

impl GetContacts {
    /// List contacts from `contacts`.
    pub fn new(contacts: Arc<dyn ContactRepository>) -> Self {
        Self { contacts }
    }

    /// Load and partition the contacts owned by `owner`.
    pub fn execute(&self, owner: &Address) -> GetContactsResponse {
        match self.contacts.load_by_owner(owner) {
            Ok(contacts) => {
                let (approved_contacts, pending_contact_requests) =
                    contacts.into_iter().partition(Contact::is_accepted);
                GetContactsResponse {
                    code: GetContactsCode::Success,
                    approved_contacts,
                    pending_contact_requests,
                }
            }
            Err(e) => {
                warn!(owner = %owner.short(), error = %e, "Failed to load contacts");
                let code = match e.kind() {
                    ErrorKind::PersistenceFailure => GetContactsCode::ContactsUnavailable,
                    _ => GetContactsCode::UnknownException,
                };
                GetContactsResponse {
                    code,
                    approved_contacts: Vec::new(),
                    pending_contact_requests: Vec::new(),
                }
            }
        }
    }
}
