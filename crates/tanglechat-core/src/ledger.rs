//! Ledger messenger capability
//!
//! The ledger is an append-only, address-keyed message bus. It offers no
//! acknowledgements, no deletion and no ordering beyond arrival order at a
//! single address, and anyone may write anything to any address.

mod memory;
mod store;

pub use memory::MemoryLedger;
pub use store::LedgerStore;

use async_trait::async_trait;
use tracing::warn;

use crate::envelope::Envelope;
use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Send/fetch access to the ledger.
#[async_trait]
pub trait LedgerMessenger: Send + Sync {
    /// Append a payload at `address`.
    async fn send(&self, address: &Address, payload: &str) -> ChatResult<()>;

    /// Fetch every payload at `address` in arrival order.
    ///
    /// `min_count` is a hint for implementations that page; the result may
    /// contain payloads unrelated to this protocol.
    async fn fetch_all(&self, address: &Address, min_count: usize) -> ChatResult<Vec<String>>;
}

/// Send two envelopes to the same address concurrently.
///
/// Both sends are always attempted; the call fails if either failed.
pub async fn send_pair(
    messenger: &dyn LedgerMessenger,
    address: &Address,
    first: &Envelope,
    second: &Envelope,
) -> ChatResult<()> {
    let first_payload = first.encode();
    let second_payload = second.encode();

    let (a, b) = futures::join!(
        messenger.send(address, &first_payload),
        messenger.send(address, &second_payload),
    );

    match (a, b) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => {
            warn!(address = %address.short(), error = %e, "One of two envelope sends failed");
            Err(ChatError::Delivery(format!("partial delivery: {}", e)))
        }
        (Err(e1), Err(e2)) => Err(ChatError::Delivery(format!(
            "both sends failed: {}; {}",
            e1, e2
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every second send
    struct FlakyLedger {
        inner: MemoryLedger,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerMessenger for FlakyLedger {
        async fn send(&self, address: &Address, payload: &str) -> ChatResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(ChatError::Delivery("node rejected transaction".into()));
            }
            self.inner.send(address, payload).await
        }

        async fn fetch_all(&self, address: &Address, min_count: usize) -> ChatResult<Vec<String>> {
            self.inner.fetch_all(address, min_count).await
        }
    }

    fn envelope(tag: u8) -> Envelope {
        Envelope::new(vec![tag; 8], "ABC", "2024-05-01T00:00:00.000Z").unwrap()
    }

    #[tokio::test]
    async fn test_send_pair_delivers_both() {
        let ledger = MemoryLedger::new();
        let address = Address::random().unwrap();

        send_pair(&ledger, &address, &envelope(1), &envelope(2))
            .await
            .unwrap();

        let payloads = ledger.fetch_all(&address, 0).await.unwrap();
        assert_eq!(payloads.len(), 2);
    }

    #[tokio::test]
    async fn test_send_pair_partial_failure_attempts_both() {
        let ledger = FlakyLedger {
            inner: MemoryLedger::new(),
            calls: AtomicUsize::new(0),
        };
        let address = Address::random().unwrap();

        let result = send_pair(&ledger, &address, &envelope(1), &envelope(2)).await;

        assert!(matches!(result, Err(ChatError::Delivery(_))));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.inner.fetch_all(&address, 0).await.unwrap().len(), 1);
    }
}
