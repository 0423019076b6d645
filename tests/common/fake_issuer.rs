//! An in-process [Issuer] that writes the same artifacts as the cluster's command-line tool, without spawning
//! processes or touching the network.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ed25519_dalek::SigningKey;
use mpc_provision::cluster_config::ClusterConfig;
use mpc_provision::config::{identity_file_name, Endpoints};
use mpc_provision::issuer::{InitiatorArtifacts, Issuer, IssuerError};
use mpc_provision::key_custodian::event_initiator::INITIATOR_NAME;
use mpc_provision::types::basic::{ClusterSize, Node};
use rand_core::{OsRng, RngCore};
use serde_json::json;

/// A registration call, with the endpoints the shared configuration held at the time of the call.
#[derive(Clone, Debug)]
pub(crate) struct Registration {
    pub(crate) peers: BTreeMap<String, String>,
    pub(crate) endpoints: Endpoints,
}

#[derive(Default)]
pub(crate) struct FakeIssuer {
    fail_identity_of: Option<u32>,
    fail_registration: bool,
    duplicate_peers: bool,
    initiator_calls: AtomicUsize,
    identity_calls: AtomicUsize,
    registrations: Mutex<Vec<Registration>>,
}

impl FakeIssuer {
    pub(crate) fn new() -> FakeIssuer {
        FakeIssuer::default()
    }

    /// Fail `generate_identity` for the node with the given index.
    pub(crate) fn failing_identity_of(mut self, index: u32) -> FakeIssuer {
        self.fail_identity_of = Some(index);
        self
    }

    pub(crate) fn failing_registration(mut self) -> FakeIssuer {
        self.fail_registration = true;
        self
    }

    /// Assign the same peer identifier to every node.
    pub(crate) fn with_duplicate_peers(mut self) -> FakeIssuer {
        self.duplicate_peers = true;
        self
    }

    pub(crate) fn initiator_calls(&self) -> usize {
        self.initiator_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().unwrap().clone()
    }
}

impl Issuer for FakeIssuer {
    fn generate_peers(&self, size: ClusterSize, output: &Path) -> Result<(), IssuerError> {
        let peers: BTreeMap<String, String> = size
            .nodes()
            .map(|node| {
                let id = if self.duplicate_peers {
                    "peer-duplicate".to_string()
                } else {
                    random_peer_id()
                };
                (node.name().to_string(), id)
            })
            .collect();
        write_json(output, &json!(peers), "generate-peers")
    }

    fn generate_identity(
        &self,
        node: &Node,
        encrypt: bool,
        output_dir: &Path,
    ) -> Result<PathBuf, IssuerError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_identity_of == Some(node.index().int()) {
            return Err(IssuerError::Other {
                operation: "generate-identity",
                reason: format!("injected failure for {}", node),
            });
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        let document = output_dir.join(identity_file_name(node));
        write_json(
            &document,
            &json!({
                "node_name": node.name(),
                "public_key": hex::encode(signing_key.verifying_key().to_bytes()),
                "created_at": "2024-01-01T00:00:00Z",
            }),
            "generate-identity",
        )?;

        let private_key = if encrypt {
            output_dir.join(format!("{}_private.key.age", node.name()))
        } else {
            output_dir.join(format!("{}_private.key", node.name()))
        };
        write_file(
            &private_key,
            hex::encode(signing_key.to_bytes()).as_bytes(),
            "generate-identity",
        )?;
        Ok(document)
    }

    fn generate_initiator(&self, output_dir: &Path) -> Result<InitiatorArtifacts, IssuerError> {
        self.initiator_calls.fetch_add(1, Ordering::SeqCst);

        let signing_key = SigningKey::generate(&mut OsRng);
        let private_key = output_dir.join("event_initiator.key");
        let identity_document = output_dir.join("event_initiator.identity.json");
        write_file(
            &private_key,
            hex::encode(signing_key.to_bytes()).as_bytes(),
            "generate-initiator",
        )?;
        write_json(
            &identity_document,
            &json!({
                "node_name": INITIATOR_NAME,
                "public_key": hex::encode(signing_key.verifying_key().to_bytes()),
                "algorithm": "ed25519",
            }),
            "generate-initiator",
        )?;
        Ok(InitiatorArtifacts {
            private_key,
            identity_document,
        })
    }

    fn register_peers(&self, peers: &Path, config: &Path) -> Result<(), IssuerError> {
        let other = |reason: String| IssuerError::Other {
            operation: "register-peers",
            reason,
        };
        let peers: BTreeMap<String, String> = fs::read(peers)
            .map_err(|err| other(err.to_string()))
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|err| other(err.to_string())))?;
        let endpoints = ClusterConfig::load(config)
            .map_err(|err| other(err.to_string()))?
            .ok_or_else(|| other("no shared configuration".to_string()))?
            .endpoints();

        self.registrations
            .lock()
            .unwrap()
            .push(Registration { peers, endpoints });

        if self.fail_registration {
            return Err(other("injected failure".to_string()));
        }
        Ok(())
    }
}

fn random_peer_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("peer-{}", hex::encode(bytes))
}

fn write_json(
    path: &Path,
    value: &serde_json::Value,
    operation: &'static str,
) -> Result<(), IssuerError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|err| IssuerError::Other {
        operation,
        reason: err.to_string(),
    })?;
    write_file(path, &bytes, operation)
}

fn write_file(path: &Path, bytes: &[u8], operation: &'static str) -> Result<(), IssuerError> {
    fs::write(path, bytes).map_err(|err| IssuerError::Other {
        operation,
        reason: err.to_string(),
    })
}
