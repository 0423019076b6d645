/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Custody of the integrity-signer seed: 32 random bytes, stored as exactly 64 hex characters in
//! `integrity_signer.key` and embedded verbatim under `integrity.signer.ed25519.private_key`.
//!
//! A seed file that is not 64 hex characters, or that differs from the recorded seed, is a violation. A missing
//! seed file is regenerated, even if the shared configuration still records the old seed.

use std::fs;
use std::io;

use zeroize::Zeroizing;

use super::{KeyCustodian, KeyState};
use crate::cluster_config::ClusterConfig;
use crate::config::Layout;
use crate::errors::ProvisionError;
use crate::persist::{write_atomic, PRIVATE_MODE};
use crate::types::basic::KeyKind;
use crate::types::crypto_primitives::{decode_hex_array, random_bytes, Keypair, VerifyingKey};

/// Length of a well-formed seed file, in hex characters.
pub const SEED_HEX_LEN: usize = 64;

/// A hex-encoded 32-byte ed25519 seed. Zeroed when dropped.
#[derive(Clone)]
pub struct IntegrityKey(Zeroizing<String>);

impl IntegrityKey {
    /// Accept `seed_hex` if it is exactly 64 hex characters.
    pub fn from_hex(seed_hex: &str) -> Option<IntegrityKey> {
        let seed_hex = seed_hex.trim();
        if seed_hex.len() != SEED_HEX_LEN {
            return None;
        }
        decode_hex_array::<32>(seed_hex)?;
        Some(IntegrityKey(Zeroizing::new(seed_hex.to_string())))
    }

    fn generate() -> IntegrityKey {
        IntegrityKey(Zeroizing::new(hex::encode(random_bytes::<32>())))
    }

    pub fn seed_hex(&self) -> &str {
        &self.0
    }

    pub fn public(&self) -> VerifyingKey {
        // Always 32 bytes: checked by `from_hex`, or produced by `generate`.
        let seed = decode_hex_array::<32>(&self.0).unwrap_or_default();
        Keypair::from_seed(&seed).public()
    }
}

impl std::fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IntegrityKey(<redacted>)")
    }
}

pub struct IntegritySignerCustodian {
    layout: Layout,
}

impl IntegritySignerCustodian {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    fn load_seed(&self) -> Result<Option<IntegrityKey>, ProvisionError> {
        let path = self.layout.integrity_seed();
        let text = match fs::read_to_string(&path) {
            Ok(text) => Zeroizing::new(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ProvisionError::io(&path, err)),
        };
        IntegrityKey::from_hex(&text).map(Some).ok_or_else(|| {
            violation(format!(
                "{} holds {} characters, expected {} hex characters",
                path.display(),
                text.trim().len(),
                SEED_HEX_LEN
            ))
        })
    }
}

impl KeyCustodian for IntegritySignerCustodian {
    type Key = IntegrityKey;

    const KIND: KeyKind = KeyKind::IntegritySigner;

    fn inspect(&self) -> KeyState {
        if self.layout.integrity_seed().exists() {
            KeyState::Present
        } else {
            KeyState::Absent
        }
    }

    fn check(&self, prior: Option<&ClusterConfig>) -> Result<KeyState, ProvisionError> {
        match self.load_seed()? {
            Some(key) => {
                verify(&key, prior)?;
                Ok(KeyState::Present)
            }
            None => Ok(KeyState::Absent),
        }
    }

    fn load_or_generate(
        &self,
        prior: Option<&ClusterConfig>,
    ) -> Result<(IntegrityKey, KeyState), ProvisionError> {
        let recorded = prior.and_then(ClusterConfig::recorded_integrity_key);

        if let Some(key) = self.load_seed()? {
            verify(&key, prior)?;
            if recorded.is_some() {
                log::debug!("reusing the integrity-signer seed");
            } else {
                log::warn!(
                    "the shared configuration records no integrity-signer seed; re-embedding the persisted one"
                );
            }
            return Ok((key, KeyState::Verified));
        }

        if recorded.is_some() {
            log::warn!(
                "{} is missing; generating a new integrity-signer seed in place of the recorded one",
                self.layout.integrity_seed().display()
            );
        }
        let key = IntegrityKey::generate();
        write_atomic(
            &self.layout.integrity_seed(),
            key.seed_hex().as_bytes(),
            Some(PRIVATE_MODE),
        )?;
        Ok((key, KeyState::Generated))
    }

    fn embed(&self, key: &IntegrityKey, config: &mut ClusterConfig) {
        config.set_integrity_key(key.seed_hex());
    }

    fn public_key(key: &IntegrityKey) -> VerifyingKey {
        key.public()
    }
}

/// Check a persisted seed against the seed recorded in `prior`, if it records one.
fn verify(key: &IntegrityKey, prior: Option<&ClusterConfig>) -> Result<(), ProvisionError> {
    match prior.and_then(ClusterConfig::recorded_integrity_key) {
        Some(recorded) if !recorded.eq_ignore_ascii_case(key.seed_hex()) => Err(violation(
            "the seed file differs from integrity.signer.ed25519.private_key".to_string(),
        )),
        _ => Ok(()),
    }
}

fn violation(reason: String) -> ProvisionError {
    ProvisionError::inconsistent(KeyKind::IntegritySigner, reason)
}
