//! Chat address rotation
//!
//! After every `messages_per_address` messages both parties move to a new
//! chat address computed from the current one and the plaintext of the most
//! recent messages:
//!
//! ```text
//! prefix  = increment(current[..15])            base-27 counter over 9A-Z
//! seed    = prefix ++ normalize(m[n-3] ++ m[n-2] ++ m[n-1])
//! derived = seed[..min(len, 70)]
//! next    = derived ++ current[derived.len()..]   length stays 81
//! ```
//!
//! `normalize` keeps ASCII letters only, upper-cased, so the result stays
//! inside the ledger alphabet. Anyone who has decrypted the same history
//! derives the same address; an observer of the ledger cannot.

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::address::TRYTE_ALPHABET;
use crate::types::Address;

/// Increment a tryte string as a big-endian base-27 counter.
///
/// Carries leftward; an all-`Z` input wraps to all-`9`. Characters outside
/// the alphabet are rejected.
pub fn increment_trytes(value: &str) -> ChatResult<String> {
    let mut digits = value
        .bytes()
        .map(|b| {
            TRYTE_ALPHABET
                .iter()
                .position(|&t| t == b)
                .ok_or_else(|| {
                    ChatError::InvalidAddress(format!("{:?} is not a tryte", b as char))
                })
        })
        .collect::<ChatResult<Vec<usize>>>()?;

    for digit in digits.iter_mut().rev() {
        if *digit == TRYTE_ALPHABET.len() - 1 {
            *digit = 0;
        } else {
            *digit += 1;
            break;
        }
    }

    Ok(digits
        .into_iter()
        .map(|d| TRYTE_ALPHABET[d] as char)
        .collect())
}

/// Strip everything but ASCII letters and upper-case the rest.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Derives the next chat address of a conversation.
#[derive(Debug, Clone)]
pub struct AddressDeriver {
    prefix_length: usize,
    max_length: usize,
    window: usize,
}

impl AddressDeriver {
    /// Build a deriver from the protocol configuration.
    ///
    /// Fails when the configuration does not validate.
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        Ok(Self {
            prefix_length: config.rotation_prefix_length,
            max_length: config.rotation_max_length,
            window: config.rotation_window,
        })
    }

    /// Number of most recent messages the derivation reads
    pub fn window(&self) -> usize {
        self.window
    }

    /// Compute the address following `current`.
    ///
    /// `recent` is the conversation's message texts oldest first; only the
    /// last `window` entries are used.
    pub fn next_address<S: AsRef<str>>(&self, current: &Address, recent: &[S]) -> ChatResult<Address> {
        let current = current.as_str();
        let mut seed = increment_trytes(&current[..self.prefix_length])?;

        let skip = recent.len().saturating_sub(self.window);
        for text in &recent[skip..] {
            seed.push_str(&normalize_text(text.as_ref()));
        }
        seed.truncate(self.max_length);

        let derived_len = seed.len();
        seed.push_str(&current[derived_len..]);
        Address::parse(&seed)
    }
}
