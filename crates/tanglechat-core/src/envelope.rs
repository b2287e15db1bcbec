//! Delimited text envelopes carried inside ledger payloads
//!
//! ## Wire Format
//!
//! ```text
//! base64(ciphertext) ~# sender-prefix ~@ timestamp ~;
//! ```
//!
//! The sender prefix is the first characters of the sender's public key
//! address; it attributes authorship without publishing the full address.
//! Several envelopes may be concatenated in one payload. The delimiter
//! tokens all start with `~`, which cannot occur in base64, in ledger
//! addresses, or in RFC 3339 timestamps; [`Envelope::new`] rejects any
//! component containing it.
//!
//! Ledger addresses are public, so payloads that fail to parse are expected
//! noise: callers skip them instead of failing the whole fetch.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::SecondsFormat;

use crate::crypto::{Cipher, Identity, PublicKey};
use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Separates ciphertext from the sender prefix
pub const FIRST_BREAK: &str = "~#";
/// Separates the sender prefix from the timestamp
pub const SECOND_BREAK: &str = "~@";
/// Terminates an envelope
pub const END: &str = "~;";

const RESERVED: char = '~';

/// One encrypted message instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    ciphertext: Vec<u8>,
    sender_prefix: String,
    timestamp: String,
}

impl Envelope {
    /// Build an envelope, validating that no component collides with the delimiters.
    pub fn new(
        ciphertext: Vec<u8>,
        sender_prefix: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> ChatResult<Self> {
        let sender_prefix = sender_prefix.into();
        let timestamp = timestamp.into();
        for (name, value) in [("sender prefix", &sender_prefix), ("timestamp", &timestamp)] {
            if value.contains(RESERVED) {
                return Err(ChatError::MalformedEnvelope(format!(
                    "{} contains reserved character {:?}",
                    name, RESERVED
                )));
            }
        }
        Ok(Self {
            ciphertext,
            sender_prefix,
            timestamp,
        })
    }

    /// Encrypt `plaintext` for `recipient` and stamp it with the sender's prefix.
    pub fn seal(
        cipher: &dyn Cipher,
        recipient: &PublicKey,
        plaintext: &[u8],
        sender: &Address,
        prefix_length: usize,
    ) -> ChatResult<Self> {
        let ciphertext = cipher.encrypt(recipient, plaintext)?;
        Self::new(ciphertext, sender.prefix(prefix_length), timestamp_now())
    }

    /// Seal `plaintext` twice: once for `counterpart`, once for `sender` itself.
    ///
    /// The sender's copy is what lets it read its own side of a conversation
    /// back from the ledger.
    pub fn seal_pair(
        cipher: &dyn Cipher,
        counterpart: &PublicKey,
        sender: &Identity,
        plaintext: &[u8],
        prefix_length: usize,
    ) -> ChatResult<(Self, Self)> {
        let address = sender.public_key_address();
        let theirs = Self::seal(cipher, counterpart, plaintext, &address, prefix_length)?;
        let mine = Self::seal(cipher, &sender.public_key(), plaintext, &address, prefix_length)?;
        Ok((theirs, mine))
    }

    /// Decrypt the ciphertext with the local identity.
    pub fn open(&self, cipher: &dyn Cipher, identity: &Identity) -> ChatResult<Vec<u8>> {
        cipher.decrypt(identity, &self.ciphertext)
    }

    /// Encode to the delimited wire form.
    pub fn encode(&self) -> String {
        let ciphertext = STANDARD.encode(&self.ciphertext);
        let mut out = String::with_capacity(
            ciphertext.len() + self.sender_prefix.len() + self.timestamp.len() + 6,
        );
        out.push_str(&ciphertext);
        out.push_str(FIRST_BREAK);
        out.push_str(&self.sender_prefix);
        out.push_str(SECOND_BREAK);
        out.push_str(&self.timestamp);
        out.push_str(END);
        out
    }

    /// Decode exactly one envelope.
    pub fn decode(payload: &str) -> ChatResult<Self> {
        let body = payload
            .strip_suffix(END)
            .ok_or_else(|| ChatError::MalformedEnvelope("missing end delimiter".to_string()))?;
        Self::decode_body(body)
    }

    /// Decode every envelope in a payload, in order.
    ///
    /// Each segment is decoded independently so one malformed segment does
    /// not hide the others.
    pub fn decode_all(payload: &str) -> Vec<ChatResult<Self>> {
        let mut out = Vec::new();
        let mut rest = payload;
        while let Some(index) = rest.find(END) {
            out.push(Self::decode_body(&rest[..index]));
            rest = &rest[index + END.len()..];
        }
        if !rest.trim().is_empty() {
            out.push(Err(ChatError::MalformedEnvelope(
                "trailing data without end delimiter".to_string(),
            )));
        }
        out
    }

    fn decode_body(body: &str) -> ChatResult<Self> {
        let (ciphertext, rest) = body
            .split_once(FIRST_BREAK)
            .ok_or_else(|| ChatError::MalformedEnvelope("missing first break".to_string()))?;
        let (sender_prefix, timestamp) = rest
            .split_once(SECOND_BREAK)
            .ok_or_else(|| ChatError::MalformedEnvelope("missing second break".to_string()))?;
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| ChatError::MalformedEnvelope(format!("ciphertext: {}", e)))?;
        Self::new(ciphertext, sender_prefix, timestamp)
    }

    /// Raw ciphertext
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Leading characters of the sender's public key address
    pub fn sender_prefix(&self) -> &str {
        &self.sender_prefix
    }

    /// Timestamp text as written by the sender
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// True if this envelope claims to come from `address`.
    pub fn is_from(&self, address: &Address) -> bool {
        !self.sender_prefix.is_empty() && address.as_str().starts_with(&self.sender_prefix)
    }
}

/// RFC 3339 timestamp used in outgoing envelopes
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SealedBoxCipher;

    fn sample() -> Envelope {
        Envelope::new(
            vec![0, 1, 2, 250, 255],
            "GUEOJUOWOWYEXYLZXNQUYMLMETF9OO",
            "2024-05-01T12:00:00.000Z",
        )
        .unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let encoded = sample().encode();
        assert_eq!(
            encoded,
            "AAEC+v8=~#GUEOJUOWOWYEXYLZXNQUYMLMETF9OO~@2024-05-01T12:00:00.000Z~;"
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let envelope = sample();
        let decoded = Envelope::decode(&envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_rejects_reserved_character() {
        let result = Envelope::new(vec![1], "ABC~#", "now");
        assert!(matches!(result, Err(ChatError::MalformedEnvelope(_))));

        let result = Envelope::new(vec![1], "ABC", "~;");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_delimiters() {
        assert!(Envelope::decode("AAEC~#ABC~@now").is_err());
        assert!(Envelope::decode("AAEC~#ABCnow~;").is_err());
        assert!(Envelope::decode("AAECABC~@now~;").is_err());
        assert!(Envelope::decode("").is_err());
    }

    #[test]
    fn test_bad_ciphertext() {
        let result = Envelope::decode("not*base64~#ABC~@now~;");
        assert!(matches!(result, Err(ChatError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_all_skips_noise() {
        let first = sample();
        let second = Envelope::new(vec![9; 40], "ABC", "later").unwrap();
        let payload = format!("{}garbage~;{}", first.encode(), second.encode());

        let results = Envelope::decode_all(&payload);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &first);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &second);
    }

    #[test]
    fn test_decode_all_trailing_data() {
        let payload = format!("{}dangling", sample().encode());
        let results = Envelope::decode_all(&payload);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let cipher = SealedBoxCipher;

        let envelope = Envelope::seal(
            &cipher,
            &bob.public_key(),
            b"hi bob",
            &alice.public_key_address(),
            30,
        )
        .unwrap();

        assert!(envelope.is_from(&alice.public_key_address()));
        assert!(!envelope.is_from(&bob.public_key_address()));
        assert_eq!(envelope.sender_prefix().len(), 30);

        let wire = envelope.encode();
        let received = Envelope::decode(&wire).unwrap();
        assert_eq!(received.open(&cipher, &bob).unwrap(), b"hi bob");
        assert!(received.open(&cipher, &alice).is_err());
    }

    #[test]
    fn test_seal_pair_each_side_opens_one() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let cipher = SealedBoxCipher;

        let (theirs, mine) =
            Envelope::seal_pair(&cipher, &bob.public_key(), &alice, b"both", 30).unwrap();

        assert_eq!(theirs.open(&cipher, &bob).unwrap(), b"both");
        assert!(theirs.open(&cipher, &alice).is_err());
        assert_eq!(mine.open(&cipher, &alice).unwrap(), b"both");
        assert!(mine.open(&cipher, &bob).is_err());
        assert!(theirs.is_from(&alice.public_key_address()));
        assert!(mine.is_from(&alice.public_key_address()));
    }
}
