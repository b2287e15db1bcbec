//! Ledger addresses
//!
//! A ledger address is a fixed-length string over the 27-character tryte
//! alphabet `9ABCDEFGHIJKLMNOPQRSTUVWXYZ`. Addresses double as mailboxes:
//! whatever is sent to an address can be fetched by anyone who knows it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::random_bytes;
use crate::error::{ChatError, ChatResult};

/// Fixed ledger address size
pub const ADDRESS_LENGTH: usize = 81;

/// Ledger alphabet in counter order (`9` is zero)
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest multiple of 27 that fits in a byte; bytes at or above are resampled.
const SAMPLE_LIMIT: u8 = 243;

/// A syntactically valid ledger address.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address.
    pub fn parse(value: &str) -> ChatResult<Self> {
        if value.len() != ADDRESS_LENGTH {
            return Err(ChatError::InvalidAddress(format!(
                "expected {} characters, got {}",
                ADDRESS_LENGTH,
                value.len()
            )));
        }
        if let Some(bad) = value.chars().find(|c| !is_tryte(*c)) {
            return Err(ChatError::InvalidAddress(format!(
                "character {:?} is not in the ledger alphabet",
                bad
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Generate a fresh, unpredictable address.
    pub fn random() -> ChatResult<Self> {
        let mut out = String::with_capacity(ADDRESS_LENGTH);
        while out.len() < ADDRESS_LENGTH {
            let bytes = random_bytes(ADDRESS_LENGTH)?;
            push_sampled(&mut out, &bytes);
        }
        Ok(Self(out))
    }

    /// Deterministically derive an address from key material.
    ///
    /// Distinct contexts yield independent addresses for the same material.
    pub fn derive(context: &str, material: &[u8]) -> Self {
        let mut reader = blake3::Hasher::new_derive_key(context)
            .update(material)
            .finalize_xof();
        let mut out = String::with_capacity(ADDRESS_LENGTH);
        let mut block = [0u8; 64];
        while out.len() < ADDRESS_LENGTH {
            reader.fill(&mut block);
            push_sampled(&mut out, &block);
        }
        Self(out)
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading `len` characters, clamped to the address length.
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(ADDRESS_LENGTH)]
    }

    /// Short form for logs and listings.
    pub fn short(&self) -> String {
        format!("{}...", &self.0[..9])
    }
}

/// True if `c` belongs to the ledger alphabet.
pub fn is_tryte(c: char) -> bool {
    c == '9' || c.is_ascii_uppercase()
}

fn push_sampled(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        if out.len() == ADDRESS_LENGTH {
            return;
        }
        if b < SAMPLE_LIMIT {
            out.push(TRYTE_ALPHABET[(b % 27) as usize] as char);
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl FromStr for Address {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
