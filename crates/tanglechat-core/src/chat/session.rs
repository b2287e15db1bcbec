//! Polling chat session for one accepted contact
//!
//! ```text
//!          tick                     batch appended,
//!   Idle ───────> Polling ───────── counter < threshold ──────> Idle
//!                    │                                            ▲
//!                    │ counter >= threshold                       │
//!                    ▼                                            │
//!             RotatingAddress ── derive, persist, re-poll ────────┘
//! ```
//!
//! Fetch-and-append and rotation run under one async mutex. A tick that
//! finds it held is skipped rather than queued, so a slow fetch never
//! stacks up polls behind it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation::Conversation;
use super::message::ChatMessage;
use crate::config::ChatConfig;
use crate::crypto::{Cipher, Identity};
use crate::envelope::Envelope;
use crate::error::{ChatError, ChatResult};
use crate::ledger::{self, LedgerMessenger};
use crate::protocol::{self, ChatPayload};
use crate::repository::ContactRepository;
use crate::rotation::AddressDeriver;
use crate::types::{Address, Contact};

/// Where a session is in its poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next tick
    Idle,
    /// Fetching and appending at the current chat address
    Polling,
    /// Moving to the next chat address
    RotatingAddress,
}

/// Result of one [`ChatSession::poll_once`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll was still running
    Skipped,
    /// A full cycle ran
    Polled {
        /// New messages appended to the conversation
        appended: usize,
        /// Address rotations performed
        rotations: usize,
    },
}

struct SessionInner {
    contact: Contact,
    conversation: Conversation,
    /// Texts appended at the current chat address, in ledger order
    address_texts: Vec<String>,
}

/// One open conversation with an accepted contact.
pub struct ChatSession {
    identity: Arc<Identity>,
    messenger: Arc<dyn LedgerMessenger>,
    repository: Arc<dyn ContactRepository>,
    cipher: Arc<dyn Cipher>,
    config: ChatConfig,
    deriver: AddressDeriver,
    inner: tokio::sync::Mutex<SessionInner>,
    state: Mutex<SessionState>,
}

impl ChatSession {
    /// Open a session on an accepted contact.
    pub fn new(
        identity: Arc<Identity>,
        contact: Contact,
        messenger: Arc<dyn LedgerMessenger>,
        repository: Arc<dyn ContactRepository>,
        cipher: Arc<dyn Cipher>,
        config: ChatConfig,
    ) -> ChatResult<Self> {
        if !contact.is_accepted() {
            return Err(ChatError::ContactNotAccepted(format!(
                "{} is {}",
                contact.display_name(),
                contact.state()
            )));
        }
        if contact.public_key.is_none() {
            return Err(ChatError::InvalidKey(format!(
                "no public key cached for {}",
                contact.display_name()
            )));
        }

        let deriver = AddressDeriver::new(&config)?;
        let conversation = Conversation::new(
            contact.public_key_address.clone(),
            contact.name.clone(),
        );
        Ok(Self {
            identity,
            messenger,
            repository,
            cipher,
            deriver,
            config,
            inner: tokio::sync::Mutex::new(SessionInner {
                contact,
                conversation,
                address_texts: Vec::new(),
            }),
            state: Mutex::new(SessionState::Idle),
        })
    }

    /// Current poll-cycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Current chat address.
    pub async fn chat_address(&self) -> Address {
        self.inner.lock().await.contact.chat_address().clone()
    }

    /// Snapshot of the conversation so far.
    pub async fn conversation(&self) -> Conversation {
        self.inner.lock().await.conversation.clone()
    }

    /// Encrypt `text` for the contact and for ourselves and send both
    /// envelopes to the current chat address.
    ///
    /// The message shows up in the conversation on the next poll, like any
    /// other, so both parties count it the same way.
    pub async fn send_message(&self, text: &str) -> ChatResult<()> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let length = text.chars().count();
        if length > self.config.character_limit {
            return Err(ChatError::MessageTooLong {
                length,
                limit: self.config.character_limit,
            });
        }

        let (address, counterpart) = {
            let inner = self.inner.lock().await;
            let key = inner.contact.public_key.ok_or_else(|| {
                ChatError::InvalidKey("contact public key missing".to_string())
            })?;
            (inner.contact.chat_address().clone(), key)
        };

        let plaintext = protocol::to_json(&ChatPayload {
            text: text.to_string(),
        })?;
        let (theirs, mine) = Envelope::seal_pair(
            self.cipher.as_ref(),
            &counterpart,
            &self.identity,
            &plaintext,
            self.config.signature_prefix_length,
        )?;

        ledger::send_pair(self.messenger.as_ref(), &address, &theirs, &mine).await?;
        debug!(address = %address.short(), length, "Chat message sent");
        Ok(())
    }

    /// Run one poll cycle unless one is already running.
    pub async fn poll_once(&self) -> ChatResult<PollOutcome> {
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!("Poll still in flight, skipping tick");
            return Ok(PollOutcome::Skipped);
        };

        let result = self.poll_locked(&mut inner).await;
        self.set_state(SessionState::Idle);
        result
    }

    async fn poll_locked(&self, inner: &mut SessionInner) -> ChatResult<PollOutcome> {
        let threshold = self.config.messages_per_address;
        let mut appended = 0;
        let mut rotations = 0;

        loop {
            self.set_state(SessionState::Polling);
            let address = inner.contact.chat_address().clone();
            let payloads = self
                .messenger
                .fetch_all(&address, self.config.fetch_min_count)
                .await?;

            for payload in &payloads {
                for decoded in Envelope::decode_all(payload) {
                    let message = match decoded.and_then(|e| self.open(&e, &inner.contact)) {
                        Ok(message) => message,
                        Err(e) if e.is_skippable() || matches!(e, ChatError::Serialization(_)) => {
                            debug!(address = %address.short(), error = %e, "Skipping payload");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let text = message.text.clone();
                    if inner.conversation.add_message(message) {
                        inner.address_texts.push(text);
                        appended += 1;
                    }
                }
            }

            if inner.address_texts.len() < threshold {
                break;
            }

            self.set_state(SessionState::RotatingAddress);
            let next = self
                .deriver
                .next_address(&address, &inner.address_texts[..threshold])?;
            inner.contact.rotate_chat_address(next.clone());
            inner.address_texts.clear();
            rotations += 1;

            if let Err(e) = self.repository.update(&inner.contact) {
                warn!(error = %e, "Failed to persist rotated chat address");
            }
            info!(
                contact = %inner.contact.display_name(),
                from = %address.short(),
                to = %next.short(),
                "Chat address rotated"
            );
        }

        Ok(PollOutcome::Polled {
            appended,
            rotations,
        })
    }

    /// Decrypt one envelope of the conversation.
    ///
    /// Only envelopes signed with the full-length prefix of one of the two
    /// parties belong to the conversation; anything else is noise and must
    /// not count toward rotation.
    fn open(&self, envelope: &Envelope, contact: &Contact) -> ChatResult<ChatMessage> {
        if envelope.sender_prefix().chars().count() != self.config.signature_prefix_length {
            return Err(ChatError::UnknownSender(envelope.sender_prefix().to_string()));
        }
        let is_mine = envelope.is_from(&self.identity.public_key_address());
        if !is_mine && !envelope.is_from(&contact.public_key_address) {
            return Err(ChatError::UnknownSender(envelope.sender_prefix().to_string()));
        }

        let plaintext = envelope.open(self.cipher.as_ref(), &self.identity)?;
        let payload: ChatPayload = protocol::from_json(&plaintext)?;
        let sender_name = (!is_mine).then(|| contact.name.clone());
        Ok(ChatMessage::from_envelope(
            envelope,
            payload.text,
            sender_name,
            is_mine,
        ))
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Poll on a fixed interval until `token` is cancelled.
    ///
    /// Each poll runs in its own task; in-flight polls are not aborted on
    /// cancellation.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.config.poll_interval_ms, "Chat session started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let session = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.poll_once().await {
                            warn!(error = %e, "Chat poll failed");
                        }
                    });
                }
            }
        }
        info!("Chat session stopped");
    }
}
