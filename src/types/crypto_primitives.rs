/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate, used to fingerprint public keys for logging.
//! 2. **Digital Signature Keys**: provided by the [`ed25519_dalek`] crate.
//! 3. **Secret handling**: randomness from the operating system and zeroize-on-drop containers for private
//!    key material and passphrases.

use std::fmt;

use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};

/// A facade around [`SigningKey`] exposing the raw encodings the shared configuration stores.
#[derive(Clone)]
pub struct Keypair(pub(crate) SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Generate a fresh `Keypair` using the operating system's randomness.
    pub fn generate() -> Keypair {
        Keypair(SigningKey::generate(&mut OsRng))
    }

    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Keypair {
        Keypair(SigningKey::from_bytes(seed))
    }

    /// Rebuild a `Keypair` from its raw 32-byte private key. Returns `None` if `bytes` has the wrong length.
    pub fn from_private_bytes(bytes: &[u8]) -> Option<Keypair> {
        let seed: [u8; SECRET_KEY_LENGTH] = bytes.try_into().ok()?;
        Some(Keypair(SigningKey::from_bytes(&seed)))
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Lowercase hex encoding of the public key.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public().to_bytes())
    }

    /// Raw private key bytes. The returned buffer is zeroed when dropped.
    pub fn private_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Lowercase hex encoding of the raw private key. The returned string is zeroed when dropped.
    pub fn private_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.private_bytes().as_slice()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.public_hex()).finish()
    }
}

/// An operator-supplied passphrase used to seal private artifacts at rest.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Fill an array with bytes from the operating system's CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// SHA-256 digest of `bytes`, used to refer to public keys in logs without printing them.
pub fn fingerprint(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Decode a hex string holding exactly `N` bytes.
pub fn decode_hex_array<const N: usize>(hex_str: &str) -> Option<[u8; N]> {
    let bytes = hex::decode(hex_str.trim()).ok()?;
    bytes.try_into().ok()
}
