//! In-process ledger

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::LedgerMessenger;
use crate::error::ChatResult;
use crate::types::Address;

/// Ledger held in memory, shared between clones.
///
/// Used by tests and by anything that wants several local parties to talk
/// without a node.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    addresses: Arc<RwLock<HashMap<Address, Vec<String>>>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads stored at `address`
    pub fn count(&self, address: &Address) -> usize {
        self.addresses.read().get(address).map_or(0, Vec::len)
    }

    /// Number of payloads across all addresses
    pub fn total(&self) -> usize {
        self.addresses.read().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl LedgerMessenger for MemoryLedger {
    async fn send(&self, address: &Address, payload: &str) -> ChatResult<()> {
        self.addresses
            .write()
            .entry(address.clone())
            .or_default()
            .push(payload.to_string());
        Ok(())
    }

    async fn fetch_all(&self, address: &Address, _min_count: usize) -> ChatResult<Vec<String>> {
        Ok(self
            .addresses
            .read()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
