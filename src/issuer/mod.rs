/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Issuer`] trait, which specifies the interface of the external collaborator that issues peer
//! identifiers and cryptographic identities, and registers finished peer directories with the cluster.
//!
//! The provisioning workflow treats the issuer as an opaque capability: it asks for an artifact to be written
//! to a given location, then reads and validates that artifact itself. The production implementation,
//! [`ProcessIssuer`](process::ProcessIssuer), drives the cluster's command-line tool as child processes. Tests
//! drive the workflow against an in-process implementation instead.

pub mod process;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ProvisionError;
use crate::types::basic::{ClusterSize, Node};
use crate::types::crypto_primitives::{decode_hex_array, VerifyingKey, PUBLIC_KEY_LENGTH};

/// Operations consumed from the external identity and peer issuing tool.
///
/// Implementations must be safe to call from several threads at once: the workflow issues the identities of
/// different nodes concurrently.
pub trait Issuer: Send + Sync {
    /// Write a peer directory for a cluster of `size` nodes to `output`, as a JSON object mapping every node
    /// name (`node0`, `node1`, ...) to its peer identifier.
    fn generate_peers(&self, size: ClusterSize, output: &Path) -> Result<(), IssuerError>;

    /// Write a fresh identity for `node` into `output_dir`: a public identity document named
    /// `{node}_identity.json` and a private key, encrypted at rest if `encrypt` is set. Returns the path of the
    /// identity document.
    fn generate_identity(
        &self,
        node: &Node,
        encrypt: bool,
        output_dir: &Path,
    ) -> Result<PathBuf, IssuerError>;

    /// Write a fresh event-initiator key pair into `output_dir`: the raw private key (hex) and an identity
    /// document carrying the public key.
    ///
    /// Unlike [`generate_identity`](Issuer::generate_identity) this takes no `encrypt` flag. `output_dir` is a
    /// scratch directory, and the private key is always written in the clear there. The
    /// [event-initiator custodian](crate::key_custodian::EventInitiatorCustodian) persists it afterwards, sealing
    /// it with the operator's passphrase when encryption is enabled, and removes the scratch directory.
    fn generate_initiator(&self, output_dir: &Path) -> Result<InitiatorArtifacts, IssuerError>;

    /// Submit the peer directory at `peers` to the cluster's coordination service, using the endpoints
    /// recorded in the shared configuration at `config`. Re-submitting the same directory must be safe.
    fn register_peers(&self, peers: &Path, config: &Path) -> Result<(), IssuerError>;
}

impl<T: Issuer + ?Sized> Issuer for &T {
    fn generate_peers(&self, size: ClusterSize, output: &Path) -> Result<(), IssuerError> {
        (**self).generate_peers(size, output)
    }

    fn generate_identity(
        &self,
        node: &Node,
        encrypt: bool,
        output_dir: &Path,
    ) -> Result<PathBuf, IssuerError> {
        (**self).generate_identity(node, encrypt, output_dir)
    }

    fn generate_initiator(&self, output_dir: &Path) -> Result<InitiatorArtifacts, IssuerError> {
        (**self).generate_initiator(output_dir)
    }

    fn register_peers(&self, peers: &Path, config: &Path) -> Result<(), IssuerError> {
        (**self).register_peers(peers, config)
    }
}

/// Paths of the artifacts written by [`Issuer::generate_initiator`].
#[derive(Clone, Debug)]
pub struct InitiatorArtifacts {
    pub private_key: PathBuf,
    pub identity_document: PathBuf,
}

/// The self-descriptive, public identity of a node (or of the event initiator).
///
/// Fields besides `node_name` and `public_key` are carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub node_name: String,
    pub public_key: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IdentityDocument {
    pub fn new(node_name: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            public_key: public_key.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Read an identity document and check that it describes `expected_name` with a well-formed public key.
    pub fn load(path: &Path, expected_name: &str) -> Result<IdentityDocument, ProvisionError> {
        let artifact = format!("identity document for {}", expected_name);
        let bytes = fs::read(path)
            .map_err(|err| ProvisionError::generation(&artifact, format!("{}: {}", path.display(), err)))?;
        let document: IdentityDocument = serde_json::from_slice(&bytes)
            .map_err(|err| ProvisionError::generation(&artifact, format!("{}: {}", path.display(), err)))?;

        if document.node_name != expected_name {
            return Err(ProvisionError::generation(
                artifact,
                format!("document names {:?}", document.node_name),
            ));
        }
        if document.verifying_key().is_none() {
            return Err(ProvisionError::generation(
                artifact,
                "public_key is not a hex-encoded ed25519 public key",
            ));
        }
        Ok(document)
    }

    pub fn public_key_bytes(&self) -> Option<[u8; PUBLIC_KEY_LENGTH]> {
        decode_hex_array(&self.public_key)
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.public_key_bytes()?).ok()
    }
}

/// Failures of the external issuer.
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{operation}` exited with {status}: {stderr}")]
    Failed {
        operation: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    #[error("`{operation}` did not finish within {timeout:?}")]
    TimedOut {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("`{operation}` did not produce {}", .path.display())]
    MissingOutput {
        operation: &'static str,
        path: PathBuf,
    },

    #[error("`{operation}` failed: {reason}")]
    Other {
        operation: &'static str,
        reason: String,
    },
}
