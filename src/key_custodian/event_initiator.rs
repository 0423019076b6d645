/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Custody of the event-initiator key pair.
//!
//! The private half lives in `event_initiator.key` (raw hex) or, when encryption at rest is enabled,
//! `event_initiator.key.enc` (a [sealed envelope](super::envelope)). The shared configuration records the same
//! key twice: the public key in `event_initiator_pubkey` and the raw private key in `event_initiator.pk_raw`.
//!
//! | Private artifact | Recorded in prior config | Outcome |
//! |---|---|---|
//! | absent | absent | generate through the issuer, `Generated` |
//! | present | equal | reuse, `Verified` |
//! | present | different | `KeyConsistencyViolation` |
//! | present | absent | reuse and re-embed with a warning, `Verified` |
//! | absent | present | `KeyConsistencyViolation` |

use std::fs;
use std::io;
use std::path::Path;

use zeroize::Zeroizing;

use super::envelope::{EnvelopeError, SealedSecret};
use super::{KeyCustodian, KeyState};
use crate::cluster_config::{ClusterConfig, RecordedInitiator};
use crate::config::{Layout, ProvisionConfig};
use crate::errors::ProvisionError;
use crate::issuer::{IdentityDocument, Issuer};
use crate::persist::{write_atomic, PRIVATE_MODE};
use crate::types::basic::KeyKind;
use crate::types::crypto_primitives::{
    decode_hex_array, Keypair, Passphrase, VerifyingKey, SECRET_KEY_LENGTH,
};

/// `node_name` of the event initiator's identity document.
pub const INITIATOR_NAME: &str = "event_initiator";

/// The event-initiator key pair together with its public identity document.
#[derive(Clone, Debug)]
pub struct InitiatorKey {
    pub keypair: Keypair,
    pub identity: IdentityDocument,
}

pub struct EventInitiatorCustodian<'a, I: Issuer + ?Sized> {
    issuer: &'a I,
    config: &'a ProvisionConfig,
    layout: Layout,
}

impl<'a, I: Issuer + ?Sized> EventInitiatorCustodian<'a, I> {
    pub fn new(issuer: &'a I, config: &'a ProvisionConfig) -> Self {
        Self {
            issuer,
            config,
            layout: config.layout(),
        }
    }

    fn passphrase(&self) -> Result<&Passphrase, ProvisionError> {
        self.config
            .passphrase
            .as_ref()
            .filter(|passphrase| !passphrase.is_empty())
            .ok_or_else(|| {
                ProvisionError::ValidationFailure(
                    "a passphrase is required to seal or open the event-initiator key".to_string(),
                )
            })
    }

    /// Read the persisted private artifact, if there is one.
    fn load_artifact(&self) -> Result<Option<Keypair>, ProvisionError> {
        let plain = self.layout.initiator_key();
        let sealed = self.layout.sealed_initiator_key();

        match (plain.exists(), sealed.exists()) {
            (false, false) => Ok(None),
            (true, true) => Err(violation(format!(
                "both {} and {} exist",
                plain.display(),
                sealed.display()
            ))),
            (true, false) => {
                if self.config.encrypt {
                    log::warn!(
                        "{} is stored unencrypted; leaving it as is",
                        plain.display()
                    );
                }
                let text = read_secret_text(&plain)?;
                let seed: [u8; SECRET_KEY_LENGTH] = decode_hex_array(&text).ok_or_else(|| {
                    violation(format!(
                        "{} does not hold a {}-byte hex-encoded private key",
                        plain.display(),
                        SECRET_KEY_LENGTH
                    ))
                })?;
                Ok(Some(Keypair::from_seed(&seed)))
            }
            (false, true) => {
                let bytes = fs::read(&sealed).map_err(|err| ProvisionError::io(&sealed, err))?;
                let envelope = SealedSecret::from_bytes(&bytes)
                    .map_err(|err| violation(format!("{}: {}", sealed.display(), err)))?;
                let secret = envelope.open(self.passphrase()?).map_err(|err| match err {
                    EnvelopeError::Decrypt => ProvisionError::ValidationFailure(format!(
                        "the passphrase does not open {}",
                        sealed.display()
                    )),
                    err => violation(format!("{}: {}", sealed.display(), err)),
                })?;
                let keypair = Keypair::from_private_bytes(&secret).ok_or_else(|| {
                    violation(format!(
                        "{} does not seal a {}-byte private key",
                        sealed.display(),
                        SECRET_KEY_LENGTH
                    ))
                })?;
                Ok(Some(keypair))
            }
        }
    }

    /// Check a persisted key pair against the key recorded in the previous shared configuration.
    fn verify(&self, keypair: &Keypair, recorded: RecordedInitiator<'_>) -> Result<(), ProvisionError> {
        if !recorded.pk_raw.is_empty() {
            let recorded_private = hex::decode(recorded.pk_raw)
                .map_err(|err| violation(format!("event_initiator.pk_raw is not hex: {}", err)))?;
            if recorded_private.as_slice() != keypair.private_bytes().as_slice() {
                return Err(violation(
                    "the private artifact differs from event_initiator.pk_raw".to_string(),
                ));
            }
        }
        if !recorded.public_key.is_empty()
            && !recorded.public_key.eq_ignore_ascii_case(&keypair.public_hex())
        {
            return Err(violation(
                "the private artifact does not match event_initiator_pubkey".to_string(),
            ));
        }
        Ok(())
    }

    /// The identity document of a persisted key pair, if there is one, checked against the key.
    fn stored_identity(&self, keypair: &Keypair) -> Result<Option<IdentityDocument>, ProvisionError> {
        let path = self.layout.initiator_identity();
        if !path.exists() {
            return Ok(None);
        }
        let identity =
            IdentityDocument::load(&path, INITIATOR_NAME).map_err(|err| violation(err.to_string()))?;
        if identity.public_key_bytes() != Some(keypair.public().to_bytes()) {
            return Err(violation(format!(
                "{} does not describe the persisted private key",
                path.display()
            )));
        }
        Ok(Some(identity))
    }

    /// The identity document of a reused key pair, rewritten if it is missing.
    fn reused_identity(&self, keypair: &Keypair) -> Result<IdentityDocument, ProvisionError> {
        if let Some(identity) = self.stored_identity(keypair)? {
            return Ok(identity);
        }

        let path = self.layout.initiator_identity();
        log::warn!("{} is missing; rewriting it", path.display());
        let identity = IdentityDocument::new(INITIATOR_NAME, keypair.public_hex());
        store_identity(&path, &identity)?;
        Ok(identity)
    }

    fn missing_artifact(&self) -> ProvisionError {
        violation(format!(
            "the shared configuration records a key but there is no private artifact in {}",
            self.layout.root().display()
        ))
    }

    /// Have the issuer generate a fresh key pair in a scratch directory, then persist it.
    fn generate(&self) -> Result<InitiatorKey, ProvisionError> {
        let workdir = self.layout.initiator_workdir();
        remove_dir_if_exists(&workdir)?;
        fs::create_dir_all(&workdir).map_err(|err| ProvisionError::io(&workdir, err))?;

        let artifacts = self
            .issuer
            .generate_initiator(&workdir)
            .map_err(|err| ProvisionError::generation("event-initiator key", err))?;

        let text = read_secret_text(&artifacts.private_key)?;
        let seed: [u8; SECRET_KEY_LENGTH] = decode_hex_array(&text).ok_or_else(|| {
            ProvisionError::generation(
                "event-initiator key",
                format!(
                    "{} does not hold a hex-encoded private key",
                    artifacts.private_key.display()
                ),
            )
        })?;
        let keypair = Keypair::from_seed(&seed);

        let identity = IdentityDocument::load(&artifacts.identity_document, INITIATOR_NAME)?;
        if identity.public_key_bytes() != Some(keypair.public().to_bytes()) {
            return Err(ProvisionError::generation(
                "event-initiator key",
                "the identity document does not match the private key",
            ));
        }

        if self.config.encrypt {
            let sealed = SealedSecret::seal(
                &keypair.private_bytes(),
                self.passphrase()?,
                self.config.kdf_params,
            )
            .and_then(|sealed| sealed.to_bytes())
            .map_err(|err| ProvisionError::generation("event-initiator key", err))?;
            write_atomic(&self.layout.sealed_initiator_key(), &sealed, Some(PRIVATE_MODE))?;
        } else {
            write_atomic(
                &self.layout.initiator_key(),
                keypair.private_hex().as_bytes(),
                Some(PRIVATE_MODE),
            )?;
        }
        store_identity(&self.layout.initiator_identity(), &identity)?;
        remove_dir_if_exists(&workdir)?;

        Ok(InitiatorKey { keypair, identity })
    }
}

impl<'a, I: Issuer + ?Sized> KeyCustodian for EventInitiatorCustodian<'a, I> {
    type Key = InitiatorKey;

    const KIND: KeyKind = KeyKind::EventInitiator;

    fn inspect(&self) -> KeyState {
        if self.layout.initiator_key().exists() || self.layout.sealed_initiator_key().exists() {
            KeyState::Present
        } else {
            KeyState::Absent
        }
    }

    fn check(&self, prior: Option<&ClusterConfig>) -> Result<KeyState, ProvisionError> {
        let recorded = prior.and_then(ClusterConfig::recorded_initiator);

        match (self.load_artifact()?, recorded) {
            (Some(keypair), recorded) => {
                if let Some(recorded) = recorded {
                    self.verify(&keypair, recorded)?;
                }
                self.stored_identity(&keypair)?;
                Ok(KeyState::Present)
            }
            (None, Some(_)) => Err(self.missing_artifact()),
            (None, None) => Ok(KeyState::Absent),
        }
    }

    fn load_or_generate(
        &self,
        prior: Option<&ClusterConfig>,
    ) -> Result<(InitiatorKey, KeyState), ProvisionError> {
        let recorded = prior.and_then(ClusterConfig::recorded_initiator);

        match (self.load_artifact()?, recorded) {
            (Some(keypair), Some(recorded)) => {
                self.verify(&keypair, recorded)?;
                let identity = self.reused_identity(&keypair)?;
                log::debug!("reusing the event-initiator key");
                Ok((InitiatorKey { keypair, identity }, KeyState::Verified))
            }
            (Some(keypair), None) => {
                log::warn!(
                    "the shared configuration records no event-initiator key; re-embedding the persisted one"
                );
                let identity = self.reused_identity(&keypair)?;
                Ok((InitiatorKey { keypair, identity }, KeyState::Verified))
            }
            (None, Some(_)) => Err(self.missing_artifact()),
            (None, None) => Ok((self.generate()?, KeyState::Generated)),
        }
    }

    fn embed(&self, key: &InitiatorKey, config: &mut ClusterConfig) {
        config.set_initiator(&key.keypair.public_hex(), &key.keypair.private_hex());
    }

    fn public_key(key: &InitiatorKey) -> VerifyingKey {
        key.keypair.public()
    }
}

fn violation(reason: String) -> ProvisionError {
    ProvisionError::inconsistent(KeyKind::EventInitiator, reason)
}

fn read_secret_text(path: &Path) -> Result<Zeroizing<String>, ProvisionError> {
    fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|err| ProvisionError::io(path, err))
}

fn store_identity(path: &Path, identity: &IdentityDocument) -> Result<(), ProvisionError> {
    let json = serde_json::to_vec_pretty(identity)
        .map_err(|err| ProvisionError::generation("event-initiator identity document", err))?;
    write_atomic(path, &json, None)
}

fn remove_dir_if_exists(path: &Path) -> Result<(), ProvisionError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ProvisionError::io(path, err)),
    }
}
