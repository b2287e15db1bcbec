//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - The local identity (secret key) and its display profile
//! - Contacts, keyed by owner and kept in insertion order

use crate::crypto::{Identity, KEY_SIZE};
use crate::error::{ChatError, ChatResult};
use parking_lot::RwLock;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

mod contacts;

use contacts::{CONTACTS_TABLE, CONTACT_HEADS_TABLE, CONTACT_INDEX_TABLE};

const IDENTITY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("identity");

/// Display metadata published alongside the local identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProfile {
    /// Display name
    pub name: String,
    /// Avatar reference
    pub image_hash: Option<String>,
}

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Identity storage key (there's only one identity per data directory)
    const IDENTITY_KEY: &'static str = "identity_secret";

    /// Profile storage key
    const PROFILE_KEY: &'static str = "identity_profile";

    /// Create a new storage instance at the given path.
    ///
    /// Creates the parent directory, the database file and every table.
    pub fn new(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITY_TABLE)?;
            let _ = write_txn.open_table(CONTACTS_TABLE)?;
            let _ = write_txn.open_table(CONTACT_INDEX_TABLE)?;
            let _ = write_txn.open_table(CONTACT_HEADS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    pub(crate) fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Identity Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save the local identity and its profile, replacing any previous one.
    pub fn save_identity(&self, identity: &Identity, profile: &LocalProfile) -> ChatResult<()> {
        let profile =
            postcard::to_allocvec(profile).map_err(|e| ChatError::Serialization(e.to_string()))?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(IDENTITY_TABLE)?;
            table.insert(Self::IDENTITY_KEY, identity.secret_bytes().as_slice())?;
            table.insert(Self::PROFILE_KEY, profile.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the local identity.
    ///
    /// Returns `None` if no identity has been created yet.
    pub fn load_identity(&self) -> ChatResult<Option<Identity>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        match table.get(Self::IDENTITY_KEY)? {
            Some(v) => {
                let bytes: [u8; KEY_SIZE] = v.value().try_into().map_err(|_| {
                    ChatError::InvalidKey(format!(
                        "stored secret has {} bytes, expected {}",
                        v.value().len(),
                        KEY_SIZE
                    ))
                })?;
                Ok(Some(Identity::from_secret_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Load the local profile, empty if none was saved.
    pub fn load_profile(&self) -> ChatResult<LocalProfile> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        match table.get(Self::PROFILE_KEY)? {
            Some(v) => postcard::from_bytes(v.value())
                .map_err(|e| ChatError::Serialization(e.to_string())),
            None => Ok(LocalProfile::default()),
        }
    }

    /// Check if an identity exists in storage.
    pub fn has_identity(&self) -> ChatResult<bool> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(IDENTITY_TABLE)?;

        Ok(table.get(Self::IDENTITY_KEY)?.is_some())
    }
}
