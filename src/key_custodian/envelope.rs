/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Passphrase-derived envelope for private artifacts at rest.
//!
//! A sealed artifact is the magic bytes `MPCE` followed by the borsh encoding of [`SealedSecret`]. The key is
//! derived from the passphrase with Argon2id; the secret is sealed with XChaCha20-Poly1305, authenticating the
//! header fields as associated data.

use argon2::{Algorithm, Argon2, Params, Version};
use borsh::{BorshDeserialize, BorshSerialize};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use crate::types::crypto_primitives::{random_bytes, Passphrase};

const MAGIC: [u8; 4] = *b"MPCE";
const VERSION: u8 = 1;
const KEY_LEN: usize = 32;

/// Upper bounds on the cost parameters of an envelope, so that a crafted envelope cannot demand an arbitrary
/// amount of memory or time before the passphrase is checked. `MAX_M_COST` is in KiB (1 GiB).
pub const MAX_M_COST: u32 = 1 << 20;
pub const MAX_T_COST: u32 = 16;
pub const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    /// Fail if any parameter is zero or above its bound.
    pub fn check(&self) -> Result<(), EnvelopeError> {
        let in_range = (1..=MAX_M_COST).contains(&self.m_cost)
            && (1..=MAX_T_COST).contains(&self.t_cost)
            && (1..=MAX_P_COST).contains(&self.p_cost);
        if in_range {
            Ok(())
        } else {
            Err(EnvelopeError::KdfParamsOutOfRange(*self))
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SealedSecret {
    version: u8,
    kdf_params: KdfParams,
    salt: [u8; 32],
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("not a sealed artifact")]
    BadMagic,
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("key derivation parameters out of range: {0:?}")]
    KdfParamsOutOfRange(KdfParams),
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("decryption failed (wrong passphrase?)")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
}

impl SealedSecret {
    pub fn seal(
        secret: &[u8],
        passphrase: &Passphrase,
        kdf_params: KdfParams,
    ) -> Result<SealedSecret, EnvelopeError> {
        kdf_params.check()?;
        let mut sealed = SealedSecret {
            version: VERSION,
            kdf_params,
            salt: random_bytes(),
            nonce: random_bytes(),
            ciphertext: Vec::new(),
        };
        let key = derive_key(passphrase, &sealed.salt, &sealed.kdf_params)?;
        let aad = sealed.aad()?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        sealed.ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&sealed.nonce),
                Payload {
                    msg: secret,
                    aad: &aad,
                },
            )
            .map_err(|_| EnvelopeError::Encrypt)?;
        Ok(sealed)
    }

    pub fn open(&self, passphrase: &Passphrase) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        if self.version != VERSION {
            return Err(EnvelopeError::UnsupportedVersion(self.version));
        }
        self.kdf_params.check()?;
        let key = derive_key(passphrase, &self.salt, &self.kdf_params)?;
        let aad = self.aad()?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        cipher
            .decrypt(
                XNonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: &aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| EnvelopeError::Decrypt)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let body = self
            .try_to_vec()
            .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + body.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SealedSecret, EnvelopeError> {
        let body = bytes.strip_prefix(&MAGIC).ok_or(EnvelopeError::BadMagic)?;
        let sealed = SealedSecret::try_from_slice(body)
            .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
        if sealed.version != VERSION {
            return Err(EnvelopeError::UnsupportedVersion(sealed.version));
        }
        sealed.kdf_params.check()?;
        Ok(sealed)
    }

    /// Everything but the ciphertext, so that tampering with the header fails decryption.
    fn aad(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut aad = MAGIC.to_vec();
        (self.version, self.kdf_params, self.salt, self.nonce)
            .serialize(&mut aad)
            .map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
        Ok(aad)
    }
}

fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, EnvelopeError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|err| EnvelopeError::Kdf(err.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|err| EnvelopeError::Kdf(err.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams {
            m_cost: 1024,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn sealed_secret_opens_with_the_same_passphrase() {
        let passphrase = Passphrase::new("correct horse battery staple");
        let sealed = SealedSecret::seal(b"initiator secret", &passphrase, cheap()).unwrap();
        let reread = SealedSecret::from_bytes(&sealed.to_bytes().unwrap()).unwrap();
        assert_eq!(reread.open(&passphrase).unwrap().as_slice(), b"initiator secret");
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let sealed = SealedSecret::seal(b"secret", &Passphrase::new("one"), cheap()).unwrap();
        assert!(matches!(
            sealed.open(&Passphrase::new("two")),
            Err(EnvelopeError::Decrypt)
        ));
    }

    #[test]
    fn tampered_header_is_rejected() {
        let passphrase = Passphrase::new("pass");
        let mut sealed = SealedSecret::seal(b"secret", &passphrase, cheap()).unwrap();
        sealed.salt[0] ^= 0xff;
        assert!(sealed.open(&passphrase).is_err());
    }

    #[test]
    fn oversized_kdf_params_are_rejected() {
        let passphrase = Passphrase::new("pass");
        let mut sealed = SealedSecret::seal(b"secret", &passphrase, cheap()).unwrap();
        sealed.kdf_params.m_cost = u32::MAX;
        let bytes = sealed.to_bytes().unwrap();

        assert!(matches!(
            SealedSecret::from_bytes(&bytes),
            Err(EnvelopeError::KdfParamsOutOfRange(_))
        ));
        assert!(matches!(
            sealed.open(&passphrase),
            Err(EnvelopeError::KdfParamsOutOfRange(_))
        ));
        assert!(SealedSecret::seal(
            b"secret",
            &passphrase,
            KdfParams {
                p_cost: MAX_P_COST + 1,
                ..cheap()
            }
        )
        .is_err());
        assert!(KdfParams::default().check().is_ok());
    }

    #[test]
    fn raw_hex_is_not_mistaken_for_an_envelope() {
        assert!(matches!(
            SealedSecret::from_bytes(b"deadbeef"),
            Err(EnvelopeError::BadMagic)
        ));
    }
}
