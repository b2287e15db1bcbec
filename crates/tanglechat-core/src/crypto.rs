//! Identity keys and the sealed-box cipher
//!
//! Each identity owns an X25519 static key. Messages are sealed to a
//! recipient's public key with an ephemeral X25519 exchange, HKDF-SHA256 and
//! ChaCha20-Poly1305:
//!
//! ```text
//! 1. ss  = x25519(ephemeral_sk, recipient_pk)
//! 2. key = HKDF-SHA256(ss, info = "tanglechat-sealed-box-v1" || ephemeral_pk || recipient_pk)
//! 3. ct  = ChaCha20-Poly1305(key, nonce, plaintext)
//! ```
//!
//! ## Wire Format
//!
//! `[ephemeral pk (32 bytes)] + [nonce (12 bytes)] + [ciphertext + tag (16 bytes)]`
//!
//! Identity addresses are derived from the public key, so anyone holding a
//! published key can check it against the address it was published under.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::{ChatError, ChatResult};
use crate::types::Address;

/// Size of X25519 keys
pub const KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size
const TAG_SIZE: usize = 16;

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"tanglechat-sealed-box-v1";

const PUBLIC_KEY_ADDRESS_CONTEXT: &str = "tanglechat 2024-05-01 public key address";
const CONTACT_ADDRESS_CONTEXT: &str = "tanglechat 2024-05-01 contact request address";

/// Fill a fresh buffer from the operating system's CSPRNG.
pub fn random_bytes(len: usize) -> ChatResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf)
        .map_err(|e| ChatError::Crypto(format!("Failed to get random bytes: {}", e)))?;
    Ok(buf)
}

/// An X25519 public key.
///
/// Serializes as lowercase hex so it reads the same in JSON payloads and
/// binary storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded key.
    pub fn from_hex(value: &str) -> ChatResult<Self> {
        let bytes = hex::decode(value).map_err(|e| ChatError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            ChatError::InvalidKey(format!("expected {} bytes, got {}", KEY_SIZE, v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Identity address this key is published under.
    pub fn address(&self) -> Address {
        Address::derive(PUBLIC_KEY_ADDRESS_CONTEXT, &self.0)
    }

    /// Inbox address on which this key's owner receives contact requests.
    pub fn contact_address(&self) -> Address {
        Address::derive(CONTACT_ADDRESS_CONTEXT, &self.0)
    }

    /// True if this key is the one `address` was derived from.
    pub fn matches_address(&self, address: &Address) -> bool {
        &self.address() == address
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..12])
    }
}

impl TryFrom<String> for PublicKey {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

/// The local user's long-lived key pair.
pub struct Identity {
    secret: X25519StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a new identity.
    pub fn generate() -> ChatResult<Self> {
        let seed = random_bytes(KEY_SIZE)?;
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&seed);
        Ok(Self::from_secret_bytes(bytes))
    }

    /// Restore an identity from its secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = X25519StaticSecret::from(bytes);
        let public = PublicKey(*X25519PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Secret key bytes, for persistence only
    pub fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Public half of the key pair
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Long-lived identity address
    pub fn public_key_address(&self) -> Address {
        self.public.address()
    }

    /// Inbox for incoming contact requests
    pub fn contact_address(&self) -> Address {
        self.public.contact_address()
    }

    pub(crate) fn secret(&self) -> &X25519StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Asymmetric encryption capability.
///
/// Failures are reported as [`ChatError::InvalidKey`] or
/// [`ChatError::DecryptionFailed`], which pollers treat as "skip this payload".
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` so only the holder of `recipient`'s secret can read it.
    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> ChatResult<Vec<u8>>;

    /// Decrypt a ciphertext addressed to `identity`.
    fn decrypt(&self, identity: &Identity, ciphertext: &[u8]) -> ChatResult<Vec<u8>>;
}

/// X25519 + HKDF + ChaCha20-Poly1305 sealed boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedBoxCipher;

impl Cipher for SealedBoxCipher {
    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> ChatResult<Vec<u8>> {
        let ephemeral = Identity::generate()?;
        let recipient_pk = X25519PublicKey::from(*recipient.as_bytes());

        let shared = ephemeral.secret().diffie_hellman(&recipient_pk);
        if !shared.was_contributory() {
            return Err(ChatError::InvalidKey(
                "recipient key is a low-order point".to_string(),
            ));
        }
        let key = derive_key(shared.as_bytes(), ephemeral.public.as_bytes(), recipient.as_bytes())?;

        let nonce_bytes = random_bytes(NONCE_SIZE)?;
        let cipher = ChaCha20Poly1305::new((&key).into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| ChatError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(KEY_SIZE + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(ephemeral.public.as_bytes());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, identity: &Identity, ciphertext: &[u8]) -> ChatResult<Vec<u8>> {
        if ciphertext.len() < KEY_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(ChatError::DecryptionFailed(format!(
                "sealed box too short: {} bytes",
                ciphertext.len()
            )));
        }

        let mut ephemeral_bytes = [0u8; KEY_SIZE];
        ephemeral_bytes.copy_from_slice(&ciphertext[..KEY_SIZE]);
        let nonce = Nonce::from_slice(&ciphertext[KEY_SIZE..KEY_SIZE + NONCE_SIZE]);
        let sealed = &ciphertext[KEY_SIZE + NONCE_SIZE..];

        let shared = identity
            .secret()
            .diffie_hellman(&X25519PublicKey::from(ephemeral_bytes));
        if !shared.was_contributory() {
            return Err(ChatError::InvalidKey(
                "ephemeral key is a low-order point".to_string(),
            ));
        }
        let key = derive_key(shared.as_bytes(), &ephemeral_bytes, identity.public.as_bytes())?;

        let cipher = ChaCha20Poly1305::new((&key).into());
        cipher
            .decrypt(nonce, sealed)
            .map_err(|e| ChatError::DecryptionFailed(format!("{}", e)))
    }
}

/// Derive a 32-byte key from a shared secret using HKDF-SHA256.
fn derive_key(
    shared_secret: &[u8],
    ephemeral: &[u8],
    recipient: &[u8],
) -> ChatResult<[u8; KEY_SIZE]> {
    let mut info = Vec::with_capacity(HKDF_INFO.len() + 2 * KEY_SIZE);
    info.extend_from_slice(HKDF_INFO);
    info.extend_from_slice(ephemeral);
    info.extend_from_slice(recipient);

    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut output = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut output)
        .map_err(|e| ChatError::Crypto(format!("HKDF expand failed: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let bob = Identity::generate().unwrap();
        let cipher = SealedBoxCipher;

        let sealed = cipher.encrypt(&bob.public_key(), b"Hello, Bob!").unwrap();
        let opened = cipher.decrypt(&bob, &sealed).unwrap();

        assert_eq!(opened, b"Hello, Bob!");
    }

    #[test]
    fn test_wrong_identity_fails() {
        let bob = Identity::generate().unwrap();
        let eve = Identity::generate().unwrap();
        let cipher = SealedBoxCipher;

        let sealed = cipher.encrypt(&bob.public_key(), b"secret").unwrap();
        let result = cipher.decrypt(&eve, &sealed);

        assert!(matches!(result, Err(ChatError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let bob = Identity::generate().unwrap();
        let cipher = SealedBoxCipher;

        let mut sealed = cipher.encrypt(&bob.public_key(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert!(cipher.decrypt(&bob, &sealed).is_err());
    }

    #[test]
    fn test_short_ciphertext_fails() {
        let bob = Identity::generate().unwrap();
        let result = SealedBoxCipher.decrypt(&bob, &[0u8; 10]);
        assert!(matches!(result, Err(ChatError::DecryptionFailed(_))));
    }

    #[test]
    fn test_low_order_recipient_rejected() {
        let zero = PublicKey::from_bytes([0u8; KEY_SIZE]);
        let result = SealedBoxCipher.encrypt(&zero, b"x");
        assert!(matches!(result, Err(ChatError::InvalidKey(_))));
    }

    #[test]
    fn test_same_plaintext_different_ciphertexts() {
        let bob = Identity::generate().unwrap();
        let a = SealedBoxCipher.encrypt(&bob.public_key(), b"same").unwrap();
        let b = SealedBoxCipher.encrypt(&bob.public_key(), b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_restore() {
        let identity = Identity::generate().unwrap();
        let restored = Identity::from_secret_bytes(identity.secret_bytes());

        assert_eq!(identity.public_key(), restored.public_key());
        assert_eq!(identity.public_key_address(), restored.public_key_address());
    }

    #[test]
    fn test_addresses_bound_to_key() {
        let identity = Identity::generate().unwrap();
        let other = Identity::generate().unwrap();

        assert!(identity
            .public_key()
            .matches_address(&identity.public_key_address()));
        assert!(!other
            .public_key()
            .matches_address(&identity.public_key_address()));
        assert_ne!(identity.public_key_address(), identity.contact_address());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = Identity::generate().unwrap().public_key();
        assert_eq!(PublicKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(matches!(
            PublicKey::from_hex("abcd"),
            Err(ChatError::InvalidKey(_))
        ));
        assert!(PublicKey::from_hex("zz").is_err());
    }
}
