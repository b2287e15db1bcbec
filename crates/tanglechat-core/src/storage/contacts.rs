//! Contact Storage - the redb-backed [`ContactRepository`]
//!
//! Contacts are stored under `"{owner}/{sequence:012}"` so a prefix range
//! scan returns one owner's contacts in insertion order. A secondary index
//! maps `"{owner}|{public_key_address}"` to that key to enforce uniqueness
//! and to locate a record for update.

use crate::error::{ChatError, ChatResult};
use crate::repository::ContactRepository;
use crate::types::{Address, Contact};
use redb::{ReadableTable, TableDefinition};

use super::Storage;

/// Table for contacts (key: "{owner}/{sequence}", value: serialized Contact)
pub(crate) const CONTACTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("contacts");

/// Uniqueness index (key: "{owner}|{public_key_address}", value: contacts key)
pub(crate) const CONTACT_INDEX_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("contact_index");

/// Next sequence number per owner
pub(crate) const CONTACT_HEADS_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("contact_heads");

fn index_key(contact: &Contact) -> String {
    format!("{}|{}", contact.owner, contact.public_key_address)
}

fn encode(contact: &Contact) -> ChatResult<Vec<u8>> {
    postcard::to_allocvec(contact).map_err(|e| ChatError::Serialization(e.to_string()))
}

impl ContactRepository for Storage {
    fn insert(&self, contact: &Contact) -> ChatResult<()> {
        let serialized = encode(contact)?;
        let index = index_key(contact);

        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut index_table = write_txn.open_table(CONTACT_INDEX_TABLE)?;
            if index_table.get(index.as_str())?.is_some() {
                return Err(ChatError::Persistence(format!(
                    "contact {} already exists",
                    contact.public_key_address.short()
                )));
            }

            let mut heads = write_txn.open_table(CONTACT_HEADS_TABLE)?;
            let sequence = heads.get(contact.owner.as_str())?.map_or(0, |v| v.value());
            heads.insert(contact.owner.as_str(), sequence + 1)?;

            let key = format!("{}/{:012}", contact.owner, sequence);
            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            table.insert(key.as_str(), serialized.as_slice())?;
            index_table.insert(index.as_str(), key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn load_by_owner(&self, owner: &Address) -> ChatResult<Vec<Contact>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(CONTACTS_TABLE)?;

        let start = format!("{}/", owner);
        let end = format!("{}0", owner);

        let mut contacts = Vec::new();
        for entry in table.range::<&str>(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            let contact: Contact = postcard::from_bytes(value.value())
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            contacts.push(contact);
        }

        Ok(contacts)
    }

    fn update(&self, contact: &Contact) -> ChatResult<()> {
        let serialized = encode(contact)?;
        let index = index_key(contact);

        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let index_table = write_txn.open_table(CONTACT_INDEX_TABLE)?;
            let key = index_table
                .get(index.as_str())?
                .map(|v| v.value().to_string())
                .ok_or_else(|| ChatError::ContactNotFound(contact.public_key_address.to_string()))?;

            let mut table = write_txn.open_table(CONTACTS_TABLE)?;
            table.insert(key.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
