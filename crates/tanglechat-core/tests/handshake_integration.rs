//! Integration tests for the full contact flow and chat
//!
//! Two users, each with their own redb contact store, share one file-backed
//! ledger. Everything goes through the public use-case API.

use std::sync::Arc;

use tanglechat_core::{
    AcceptContact, AddContact, AddContactRequest, ChatConfig, ChatSession, ConfirmContacts,
    ContactRepository, GetContacts, GetContactsCode, Identity, LedgerContactInformationRepository,
    LedgerMessenger, LedgerStore, LocalProfile, PollOutcome, PublishContactInformation,
    ReceiveContactRequests, ResponseCode, SealedBoxCipher, Storage,
};
use tempfile::{tempdir, TempDir};

struct User {
    identity: Arc<Identity>,
    storage: Arc<Storage>,
    _dir: TempDir,
}

impl User {
    fn new(name: &str) -> Self {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("tanglechat.redb")).unwrap();
        let identity = Identity::generate().unwrap();
        storage
            .save_identity(
                &identity,
                &LocalProfile {
                    name: name.to_string(),
                    image_hash: None,
                },
            )
            .unwrap();
        Self {
            identity: Arc::new(identity),
            storage: Arc::new(storage),
            _dir: dir,
        }
    }
}

fn config() -> ChatConfig {
    ChatConfig {
        messages_per_address: 4,
        ..ChatConfig::default()
    }
}

async fn publish(ledger: &Arc<LedgerStore>, user: &User, name: &str) {
    let response = PublishContactInformation::new(user.identity.clone(), ledger.clone())
        .execute(name, None)
        .await;
    assert_eq!(response.code, ResponseCode::Success);
}

/// Runs the whole handshake between alice (initiator) and bob
async fn connect(ledger: &Arc<LedgerStore>, alice: &User, bob: &User) {
    publish(ledger, alice, "Alice").await;
    publish(ledger, bob, "Bob").await;

    let add = AddContact::new(
        alice.identity.clone(),
        alice.storage.clone(),
        Arc::new(LedgerContactInformationRepository::new(ledger.clone())),
        ledger.clone(),
        Arc::new(SealedBoxCipher),
        config(),
    );
    let response = add
        .execute(AddContactRequest {
            contact_address: bob.identity.contact_address(),
            request_address: bob.identity.public_key_address(),
            public_key_address: alice.identity.public_key_address(),
            name: "Alice".to_string(),
            image_hash: None,
        })
        .await;
    assert_eq!(response.code, ResponseCode::Success);

    let inbox = ReceiveContactRequests::new(
        bob.identity.clone(),
        bob.storage.clone(),
        ledger.clone(),
        Arc::new(SealedBoxCipher),
        config(),
    )
    .execute()
    .await;
    assert_eq!(inbox.received.len(), 1);

    let accept = AcceptContact::new(
        bob.identity.clone(),
        bob.storage.clone(),
        ledger.clone(),
        Arc::new(SealedBoxCipher),
        config(),
    )
    .execute(&alice.identity.public_key_address())
    .await;
    assert_eq!(accept.code, ResponseCode::Success);

    let confirm = ConfirmContacts::new(
        alice.identity.clone(),
        alice.storage.clone(),
        ledger.clone(),
        Arc::new(SealedBoxCipher),
        config(),
    )
    .execute()
    .await;
    assert_eq!(confirm.accepted.len(), 1);
}

fn session(ledger: &Arc<LedgerStore>, user: &User) -> ChatSession {
    let contact = user
        .storage
        .load_by_owner(&user.identity.public_key_address())
        .unwrap()
        .remove(0);
    ChatSession::new(
        user.identity.clone(),
        contact,
        ledger.clone(),
        user.storage.clone(),
        Arc::new(SealedBoxCipher),
        config(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_handshake_lists_contact_as_approved_on_both_sides() {
    let ledger_dir = tempdir().unwrap();
    let ledger = Arc::new(LedgerStore::new(ledger_dir.path().join("ledger.redb")).unwrap());
    let alice = User::new("Alice");
    let bob = User::new("Bob");

    connect(&ledger, &alice, &bob).await;

    for (user, peer, peer_name) in [(&alice, &bob, "Bob"), (&bob, &alice, "Alice")] {
        let listing =
            GetContacts::new(user.storage.clone()).execute(&user.identity.public_key_address());
        assert_eq!(listing.code, GetContactsCode::Success);
        assert!(listing.pending_contact_requests.is_empty());
        assert_eq!(listing.approved_contacts.len(), 1);

        let contact = &listing.approved_contacts[0];
        assert_eq!(
            contact.public_key_address,
            peer.identity.public_key_address()
        );
        assert_eq!(contact.public_key, Some(peer.identity.public_key()));
        assert_eq!(contact.name, peer_name);
    }
}

#[tokio::test]
async fn test_chat_rotates_in_lockstep_and_survives_restart() {
    let ledger_dir = tempdir().unwrap();
    let ledger = Arc::new(LedgerStore::new(ledger_dir.path().join("ledger.redb")).unwrap());
    let alice = User::new("Alice");
    let bob = User::new("Bob");
    connect(&ledger, &alice, &bob).await;

    let alice_chat = session(&ledger, &alice);
    let bob_chat = session(&ledger, &bob);
    let first_address = alice_chat.chat_address().await;
    assert_eq!(first_address, bob_chat.chat_address().await);

    alice_chat.send_message("Hi Bob!").await.unwrap();
    bob_chat.send_message("Hey Alice, how are you?").await.unwrap();
    alice_chat.send_message("Great, thanks.").await.unwrap();
    bob_chat.send_message("Glad to hear it").await.unwrap();

    assert_eq!(ledger.fetch_all(&first_address, 0).await.unwrap().len(), 8);

    for chat in [&alice_chat, &bob_chat] {
        assert_eq!(
            chat.poll_once().await.unwrap(),
            PollOutcome::Polled {
                appended: 4,
                rotations: 1
            }
        );
    }
    let second_address = alice_chat.chat_address().await;
    assert_ne!(second_address, first_address);
    assert_eq!(second_address, bob_chat.chat_address().await);

    // Rotated address is in the store, so a fresh session picks it up
    let restarted = session(&ledger, &bob);
    assert_eq!(restarted.chat_address().await, second_address);

    alice_chat.send_message("New address!").await.unwrap();
    assert_eq!(
        restarted.poll_once().await.unwrap(),
        PollOutcome::Polled {
            appended: 1,
            rotations: 0
        }
    );
    let convo = restarted.conversation().await;
    assert_eq!(convo.messages()[0].text, "New address!");
    assert!(!convo.messages()[0].is_mine);

    // Nothing from the conversation is readable by a stranger
    let stranger = User::new("Eve");
    let payloads = ledger.fetch_all(&second_address, 0).await.unwrap();
    for payload in payloads {
        for envelope in tanglechat_core::Envelope::decode_all(&payload) {
            let envelope = envelope.unwrap();
            assert!(envelope.open(&SealedBoxCipher, &stranger.identity).is_err());
        }
    }
}
