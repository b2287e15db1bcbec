//! File-backed ledger using redb
//!
//! Lets separate processes on one machine share a ledger file, e.g. two
//! CLI profiles talking to each other.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use super::LedgerMessenger;
use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Payloads (key: "{address}/{sequence:012}", value: payload)
const LEDGER_TABLE: TableDefinition<&str, &str> = TableDefinition::new("ledger");

/// Next sequence number per address
const LEDGER_HEADS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("ledger_heads");

fn delivery<E: std::fmt::Display>(e: E) -> ChatError {
    ChatError::Delivery(e.to_string())
}

/// Ledger persisted in a local redb file.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<RwLock<Database>>,
}

impl LedgerStore {
    /// Open or create the ledger file at `path`.
    pub fn new(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LEDGER_TABLE)?;
            let _ = write_txn.open_table(LEDGER_HEADS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    fn append(&self, address: &Address, payload: &str) -> Result<(), redb::Error> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut heads = write_txn.open_table(LEDGER_HEADS_TABLE)?;
            let sequence = heads.get(address.as_str())?.map_or(0, |v| v.value());
            heads.insert(address.as_str(), sequence + 1)?;

            let mut table = write_txn.open_table(LEDGER_TABLE)?;
            let key = format!("{}/{:012}", address, sequence);
            table.insert(key.as_str(), payload)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_all(&self, address: &Address) -> Result<Vec<String>, redb::Error> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(LEDGER_TABLE)?;

        // '/' sorts directly before '0', so this covers exactly the address' keys
        let start = format!("{}/", address);
        let end = format!("{}0", address);

        let mut payloads = Vec::new();
        for entry in table.range::<&str>(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            payloads.push(value.value().to_string());
        }
        Ok(payloads)
    }
}

#[async_trait]
impl LedgerMessenger for LedgerStore {
    async fn send(&self, address: &Address, payload: &str) -> ChatResult<()> {
        self.append(address, payload).map_err(delivery)
    }

    async fn fetch_all(&self, address: &Address, _min_count: usize) -> ChatResult<Vec<String>> {
        self.read_all(address).map_err(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_send_and_fetch() {
        let temp_dir = tempdir().unwrap();
        let ledger = LedgerStore::new(temp_dir.path().join("ledger.redb")).unwrap();
        let address = Address::random().unwrap();

        ledger.send(&address, "one").await.unwrap();
        ledger.send(&address, "two").await.unwrap();
        ledger.send(&address, "three").await.unwrap();

        let payloads = ledger.fetch_all(&address, 0).await.unwrap();
        assert_eq!(payloads, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_addresses_are_isolated() {
        let temp_dir = tempdir().unwrap();
        let ledger = LedgerStore::new(temp_dir.path().join("ledger.redb")).unwrap();
        let a = Address::random().unwrap();
        let b = Address::random().unwrap();

        ledger.send(&a, "for a").await.unwrap();
        ledger.send(&b, "for b").await.unwrap();

        assert_eq!(ledger.fetch_all(&a, 0).await.unwrap(), vec!["for a"]);
        assert_eq!(ledger.fetch_all(&b, 0).await.unwrap(), vec!["for b"]);
    }

    #[tokio::test]
    async fn test_ledger_persists_across_instances() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ledger.redb");
        let address = Address::random().unwrap();

        {
            let ledger = LedgerStore::new(&path).unwrap();
            ledger.send(&address, "kept").await.unwrap();
        }

        let ledger = LedgerStore::new(&path).unwrap();
        ledger.send(&address, "appended").await.unwrap();
        assert_eq!(
            ledger.fetch_all(&address, 0).await.unwrap(),
            vec!["kept", "appended"]
        );
    }
}
