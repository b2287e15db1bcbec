//! PublishContactInformation: make the local identity resolvable

use std::sync::Arc;

use tracing::warn;

use super::{failure_code, ResponseCode, Stage};
use crate::crypto::Identity;
use crate::ledger::LedgerMessenger;
use crate::protocol::ContactInformation;
use crate::repository::LedgerContactInformationRepository;

/// Output of [`PublishContactInformation::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    /// Outcome
    pub code: ResponseCode,
}

/// Publishes `{address, contact_address, public_key, name, image_hash}` at
/// the identity's public key address.
pub struct PublishContactInformation {
    identity: Arc<Identity>,
    repository: LedgerContactInformationRepository,
}

impl PublishContactInformation {
    /// Publish over `messenger`.
    pub fn new(identity: Arc<Identity>, messenger: Arc<dyn LedgerMessenger>) -> Self {
        Self {
            identity,
            repository: LedgerContactInformationRepository::new(messenger),
        }
    }

    /// Publish the current profile.
    pub async fn execute(&self, name: &str, image_hash: Option<String>) -> PublishResponse {
        let info = ContactInformation {
            address: self.identity.public_key_address(),
            contact_address: self.identity.contact_address(),
            public_key: self.identity.public_key(),
            name: name.to_string(),
            image_hash,
        };

        let code = match self.repository.publish(&info).await {
            Ok(()) => ResponseCode::Success,
            Err(e) => {
                warn!(error = %e, "Failed to publish contact information");
                failure_code(Stage::Messenger, &e)
            }
        };
        PublishResponse { code }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::CountingLedger;
    use super::*;
    use crate::repository::ContactInformationRepository;

    #[tokio::test]
    async fn test_publish_is_resolvable() {
        let ledger = Arc::new(CountingLedger::default());
        let identity = Arc::new(Identity::generate().unwrap());

        let response = PublishContactInformation::new(identity.clone(), ledger.clone())
            .execute("Alice", Some("QmAvatar".to_string()))
            .await;
        assert_eq!(response.code, ResponseCode::Success);

        let resolved = LedgerContactInformationRepository::new(ledger.clone())
            .load_by_address(&identity.public_key_address())
            .await
            .unwrap();
        assert_eq!(resolved.name, "Alice");
        assert_eq!(resolved.contact_address, identity.contact_address());
        assert_eq!(resolved.image_hash.as_deref(), Some("QmAvatar"));
    }

    #[tokio::test]
    async fn test_publish_messenger_failure() {
        let ledger = Arc::new(CountingLedger::failing());
        let identity = Arc::new(Identity::generate().unwrap());

        let response = PublishContactInformation::new(identity, ledger.clone())
            .execute("Alice", None)
            .await;
        assert_eq!(response.code, ResponseCode::MessengerException);
        assert_eq!(ledger.sends(), 1);
    }
}
