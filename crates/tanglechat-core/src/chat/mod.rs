//! Chat over rotating ledger addresses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Chat Layer (this module)                                       │
//! │  - ChatSession: poll loop, single-flight guard, rotation        │
//! │  - Conversation: deduplicated message history with a contact    │
//! │  - ChatMessage: display-ready decrypted message                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Envelope Layer                                                 │
//! │  - Envelope: base64 ciphertext + sender prefix + timestamp      │
//! │  - Cipher: sealed box per recipient                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Ledger Layer                                                   │
//! │  - LedgerMessenger: append/fetch by address                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Message Flow
//!
//! **Sending:**
//! 1. `send_message()` serializes `{"text": ...}`
//! 2. The plaintext is sealed once for the contact and once for ourselves
//! 3. Both envelopes are sent concurrently to the current chat address
//!
//! **Receiving:**
//! 1. `poll_once()` fetches every payload at the current chat address
//! 2. Envelopes we cannot open are someone else's copy, or noise
//! 3. New messages are appended in ledger order; after
//!    `messages_per_address` of them the session rotates to the next
//!    address and polls again

mod conversation;
mod message;
mod session;

pub use conversation::Conversation;
pub use message::{envelope_id, ChatMessage};
pub use session::{ChatSession, PollOutcome, SessionState};
