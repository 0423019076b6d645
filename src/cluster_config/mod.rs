/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The shared cluster configuration (`config.yaml`), consumed by every node and by peer registration.
//!
//! ## Typed read-modify-write
//!
//! The configuration is only ever changed by deserializing it into a [`ClusterConfig`], setting specific
//! fields, and serializing it again (see [`ClusterConfig::update`]). Top-level keys that this crate does not
//! know about are kept in [`ClusterConfig::extra`] and written back unchanged.
//!
//! ## Lifecycle within a run
//!
//! 1. The configuration left by a previous run, if any, is loaded so that the
//!    [key custodian](crate::key_custodian) can check persisted keys against it.
//! 2. [`ClusterConfig::assemble`] builds the new configuration from the run's [`ProvisionConfig`] and a freshly
//!    generated storage password. Key fields start out as empty placeholders.
//! 3. The key custodians embed the event-initiator and integrity-signer keys.
//! 4. [`ClusterConfig::store`] writes the result, which is then copied into every node bundle.

pub mod password;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Endpoints, OperationalTunables, ProvisionConfig};
use crate::errors::ProvisionError;
use crate::persist::write_atomic;

pub use password::{generate_storage_password, is_well_formed_storage_password, STORAGE_PASSWORD_LEN};

/// Signature algorithm recorded for the event-initiator key.
pub const EVENT_INITIATOR_ALGORITHM: &str = "ed25519";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub nats: NatsSection,
    pub consul: ConsulSection,
    pub mpc_threshold: u32,
    pub environment: String,
    pub badger_password: String,
    /// Hex-encoded public key of the event initiator. Empty until resolved.
    pub event_initiator_pubkey: String,
    pub event_initiator: EventInitiatorSection,
    pub integrity: IntegritySection,
    pub db_path: String,
    pub backups_dir: String,
    pub backup_enabled: bool,
    pub backup_period_seconds: u64,
    pub max_concurrent_keygen: u32,
    pub max_concurrent_signing: u32,
    pub session_warm_up_delay_ms: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsSection {
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulSection {
    pub address: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventInitiatorSection {
    pub algorithm: String,
    /// Hex-encoded raw private key. Must match the persisted private artifact byte for byte.
    pub pk_raw: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegritySection {
    pub signer: IntegritySignerSection,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegritySignerSection {
    pub ed25519: Ed25519Section,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ed25519Section {
    /// 64 hex characters (a 32-byte seed).
    pub private_key: String,
}

/// The event-initiator key as recorded in a shared configuration. Either field may be empty.
#[derive(Clone, Copy)]
pub struct RecordedInitiator<'a> {
    pub public_key: &'a str,
    pub pk_raw: &'a str,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let endpoints = Endpoints::internal_default();
        let tunables = OperationalTunables::default();
        let mut config = ClusterConfig {
            nats: NatsSection::default(),
            consul: ConsulSection::default(),
            mpc_threshold: 0,
            environment: String::new(),
            badger_password: String::new(),
            event_initiator_pubkey: String::new(),
            event_initiator: EventInitiatorSection::default(),
            integrity: IntegritySection::default(),
            db_path: String::new(),
            backups_dir: String::new(),
            backup_enabled: false,
            backup_period_seconds: 0,
            max_concurrent_keygen: 0,
            max_concurrent_signing: 0,
            session_warm_up_delay_ms: 0,
            extra: BTreeMap::new(),
        };
        config.set_endpoints(&endpoints);
        config.set_tunables(&tunables);
        config
    }
}

impl ClusterConfig {
    /// Build the configuration of a run. Only the unknown top-level keys of `prior` are carried over; every
    /// known field is set from `config`, and the key fields are left as empty placeholders.
    pub fn assemble(config: &ProvisionConfig, prior: Option<ClusterConfig>) -> ClusterConfig {
        let mut assembled = ClusterConfig {
            mpc_threshold: config.threshold.int(),
            environment: config.environment.as_str().to_string(),
            badger_password: generate_storage_password().to_string(),
            extra: prior.map(|prior| prior.extra).unwrap_or_default(),
            ..ClusterConfig::default()
        };
        assembled.set_endpoints(&config.internal_endpoints);
        assembled.set_tunables(&config.tunables);
        assembled
    }

    /// Read the configuration at `path`. Returns `Ok(None)` if there is no file.
    pub fn load(path: &Path) -> Result<Option<ClusterConfig>, ProvisionError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ProvisionError::io(path, err)),
        };
        serde_yaml::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ProvisionError::MalformedConfig {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Atomically write the configuration to `path`.
    pub fn store(&self, path: &Path) -> Result<(), ProvisionError> {
        let yaml = serde_yaml::to_string(self).map_err(|source| ProvisionError::MalformedConfig {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, yaml.as_bytes(), None)
    }

    /// Read the configuration at `path`, apply `change`, and write it back. Fails if there is no configuration
    /// at `path`.
    pub fn update(
        path: &Path,
        change: impl FnOnce(&mut ClusterConfig),
    ) -> Result<ClusterConfig, ProvisionError> {
        let mut config = ClusterConfig::load(path)?.ok_or_else(|| {
            ProvisionError::io(path, io::Error::new(io::ErrorKind::NotFound, "no cluster configuration"))
        })?;
        change(&mut config);
        config.store(path)?;
        Ok(config)
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.nats.url.clone(), self.consul.address.clone())
    }

    pub fn set_endpoints(&mut self, endpoints: &Endpoints) {
        self.nats.url = endpoints.messaging.clone();
        self.consul.address = endpoints.coordination.clone();
    }

    pub fn set_tunables(&mut self, tunables: &OperationalTunables) {
        self.db_path = tunables.db_path.clone();
        self.backups_dir = tunables.backups_dir.clone();
        self.backup_enabled = tunables.backup_enabled;
        self.backup_period_seconds = tunables.backup_period_seconds;
        self.max_concurrent_keygen = tunables.max_concurrent_keygen;
        self.max_concurrent_signing = tunables.max_concurrent_signing;
        self.session_warm_up_delay_ms = tunables.session_warm_up_delay_ms;
    }

    /// The recorded event-initiator key, if either of its fields is non-empty.
    pub fn recorded_initiator(&self) -> Option<RecordedInitiator<'_>> {
        let public_key = self.event_initiator_pubkey.trim();
        let pk_raw = self.event_initiator.pk_raw.trim();
        if public_key.is_empty() && pk_raw.is_empty() {
            None
        } else {
            Some(RecordedInitiator { public_key, pk_raw })
        }
    }

    pub fn set_initiator(&mut self, public_key_hex: &str, private_key_hex: &str) {
        self.event_initiator_pubkey = public_key_hex.to_string();
        self.event_initiator.algorithm = EVENT_INITIATOR_ALGORITHM.to_string();
        self.event_initiator.pk_raw = private_key_hex.to_string();
    }

    /// The recorded integrity-signer seed, if non-empty.
    pub fn recorded_integrity_key(&self) -> Option<&str> {
        let key = self.integrity.signer.ed25519.private_key.trim();
        (!key.is_empty()).then_some(key)
    }

    pub fn set_integrity_key(&mut self, seed_hex: &str) {
        self.integrity.signer.ed25519.private_key = seed_hex.to_string();
    }
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("nats", &self.nats)
            .field("consul", &self.consul)
            .field("mpc_threshold", &self.mpc_threshold)
            .field("environment", &self.environment)
            .field("badger_password", &REDACTED)
            .field("event_initiator_pubkey", &self.event_initiator_pubkey)
            .field("event_initiator", &self.event_initiator)
            .field("integrity", &self.integrity)
            .field("db_path", &self.db_path)
            .field("backups_dir", &self.backups_dir)
            .field("backup_enabled", &self.backup_enabled)
            .field("backup_period_seconds", &self.backup_period_seconds)
            .field("max_concurrent_keygen", &self.max_concurrent_keygen)
            .field("max_concurrent_signing", &self.max_concurrent_signing)
            .field("session_warm_up_delay_ms", &self.session_warm_up_delay_ms)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Debug for EventInitiatorSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventInitiatorSection")
            .field("algorithm", &self.algorithm)
            .field("pk_raw", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for IntegritySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegritySection")
            .field("signer.ed25519.private_key", &REDACTED)
            .finish()
    }
}
