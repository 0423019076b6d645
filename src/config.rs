/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration of a provisioning run, as specified by the operator.
//!
//! A [`ProvisionConfig`] is constructed once at the top of the workflow using the builder pattern and is
//! then passed, immutably, to every stage:
//!
//! ```ignore
//! let configuration =
//!     ProvisionConfig::builder()
//!     .node_count(ClusterSize::new(3))
//!     .threshold(Threshold::new(2))
//!     .output_dir(PathBuf::from("./deployment"))
//!     .environment(Environment::new("development"))
//!     .build();
//! configuration.validate()?;
//! ```
//!
//! All filesystem locations of a run are derived from `output_dir` by [`Layout`].

use std::path::{Path, PathBuf};

use typed_builder::TypedBuilder;

use crate::errors::ProvisionError;
use crate::key_custodian::envelope::KdfParams;
use crate::types::basic::{ClusterSize, Environment, Node, Threshold};
use crate::types::crypto_primitives::Passphrase;

pub const DEFAULT_INTERNAL_NATS_URL: &str = "nats://nats-server:4222";
pub const DEFAULT_INTERNAL_CONSUL_ADDRESS: &str = "consul:8500";
pub const DEFAULT_EXTERNAL_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_EXTERNAL_CONSUL_ADDRESS: &str = "localhost:8500";

/// Stores the operator-defined parameters of a provisioning run:
/// 1. The cluster size and the signing threshold (`threshold < node_count`).
/// 2. The environment tag written into the shared configuration.
/// 3. Whether private artifacts are encrypted at rest, and with which passphrase.
/// 4. The messaging and coordination endpoints as seen from inside the cluster's containers
///    (`internal_endpoints`) and from the host that performs registration (`external_endpoints`).
/// 5. The output directory under which every artifact of the run is written.
/// 6. Static operational tunables copied into the shared configuration.
///
/// ## Validation
///
/// A `ProvisionConfig` is not validated on construction. Call [`ProvisionConfig::validate`] before acting on
/// it; the [`Provisioner`](crate::workflow::Provisioner) does so before it touches the filesystem.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ProvisionConfig]. On the builder call the following methods to construct a
    [ProvisionConfig].

    Required:
    - `.node_count(...)`
    - `.threshold(...)`
    - `.output_dir(...)`

    Optional:
    - `.environment(...)`
    - `.encrypt(...)`
    - `.passphrase(...)`
    - `.kdf_params(...)`
    - `.internal_endpoints(...)`
    - `.external_endpoints(...)`
    - `.tunables(...)`
    - `.workers(...)`
    - `.register(...)`
    - `.log_events(...)`
    - `.file_mode(...)`
"))]
pub struct ProvisionConfig {
    #[builder(setter(doc = "Set the number of nodes in the cluster. Required."))]
    pub node_count: ClusterSize,
    #[builder(setter(doc = "Set the signing threshold. Must be smaller than the node count. Required."))]
    pub threshold: Threshold,
    #[builder(setter(doc = "Set the directory all artifacts of the run are written under. Required."))]
    pub output_dir: PathBuf,
    #[builder(default, setter(doc = "Set the environment tag. Defaults to `development`."))]
    pub environment: Environment,
    #[builder(default = false, setter(doc = "Encrypt private artifacts at rest. Defaults to false."))]
    pub encrypt: bool,
    #[builder(default, setter(strip_option, doc = "Set the passphrase used when `encrypt` is set, or to open an existing encrypted artifact."))]
    pub passphrase: Option<Passphrase>,
    #[builder(default, setter(doc = "Set the Argon2id cost of sealing private artifacts. Defaults to `KdfParams::default()`."))]
    pub kdf_params: KdfParams,
    #[builder(default = Endpoints::internal_default(), setter(doc = "Set the endpoints used by containerized nodes."))]
    pub internal_endpoints: Endpoints,
    #[builder(default = Endpoints::external_default(), setter(doc = "Set the endpoints reachable from the host performing registration."))]
    pub external_endpoints: Endpoints,
    #[builder(default, setter(doc = "Set the static operational tunables of the shared configuration."))]
    pub tunables: OperationalTunables,
    #[builder(default = 4, setter(doc = "Set the maximum number of worker threads for per-node stages. Defaults to 4."))]
    pub workers: usize,
    #[builder(default = true, setter(doc = "Register the peer directory with the cluster at the end of the run. Defaults to true."))]
    pub register: bool,
    #[builder(default = true, setter(doc = "Log provisioning events. Defaults to true."))]
    pub log_events: bool,
    #[builder(default = 0o644, setter(doc = "Set the permission bits given to every distributed file. Defaults to 0o644."))]
    pub file_mode: u32,
}

impl ProvisionConfig {
    /// Check the request for errors that must be reported before any file is created or deleted.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let invalid = |reason: String| Err(ProvisionError::ValidationFailure(reason));

        if self.node_count.int() == 0 {
            return invalid("node count must be at least 1".to_string());
        }
        if self.threshold >= Threshold::new(self.node_count.int()) {
            return invalid(format!(
                "threshold ({}) must be smaller than the node count ({})",
                self.threshold, self.node_count
            ));
        }
        if !self.environment.is_well_formed() {
            return invalid(format!(
                "environment tag {:?} must be non-empty and contain only [A-Za-z0-9_-]",
                self.environment.as_str()
            ));
        }
        self.internal_endpoints.validate("internal")?;
        self.external_endpoints.validate("external")?;
        if self.workers == 0 {
            return invalid("worker count must be at least 1".to_string());
        }
        if self.file_mode & 0o111 != 0 || self.file_mode > 0o777 {
            return invalid(format!(
                "file mode {:o} must be a read/write mode without execute bits",
                self.file_mode
            ));
        }

        let has_passphrase = self.passphrase.as_ref().is_some_and(|p| !p.is_empty());
        if self.encrypt && !has_passphrase {
            return invalid("encryption at rest requires a non-empty passphrase".to_string());
        }
        if self.encrypt {
            self.kdf_params
                .check()
                .map_err(|err| ProvisionError::ValidationFailure(err.to_string()))?;
        }
        let layout = self.layout();
        if layout.sealed_initiator_key().exists() && !has_passphrase {
            return invalid(format!(
                "{} is encrypted; a passphrase is required to verify it",
                layout.sealed_initiator_key().display()
            ));
        }

        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.output_dir)
    }
}

/// Addresses of the cluster's messaging (NATS) and coordination (Consul) services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub messaging: String,
    pub coordination: String,
}

impl Endpoints {
    pub fn new(messaging: impl Into<String>, coordination: impl Into<String>) -> Self {
        Self {
            messaging: messaging.into(),
            coordination: coordination.into(),
        }
    }

    pub fn internal_default() -> Self {
        Endpoints::new(DEFAULT_INTERNAL_NATS_URL, DEFAULT_INTERNAL_CONSUL_ADDRESS)
    }

    pub fn external_default() -> Self {
        Endpoints::new(DEFAULT_EXTERNAL_NATS_URL, DEFAULT_EXTERNAL_CONSUL_ADDRESS)
    }

    fn validate(&self, which: &str) -> Result<(), ProvisionError> {
        if self.messaging.trim().is_empty() || self.coordination.trim().is_empty() {
            return Err(ProvisionError::ValidationFailure(format!(
                "{} messaging and coordination endpoints must be non-empty",
                which
            )));
        }
        Ok(())
    }
}

/// Static operational tunables copied verbatim into the shared configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationalTunables {
    pub db_path: String,
    pub backups_dir: String,
    pub backup_enabled: bool,
    pub backup_period_seconds: u64,
    pub max_concurrent_keygen: u32,
    pub max_concurrent_signing: u32,
    pub session_warm_up_delay_ms: u64,
}

impl Default for OperationalTunables {
    fn default() -> Self {
        Self {
            db_path: "./db".to_string(),
            backups_dir: "./backups".to_string(),
            backup_enabled: true,
            backup_period_seconds: 300,
            max_concurrent_keygen: 2,
            max_concurrent_signing: 10,
            session_warm_up_delay_ms: 100,
        }
    }
}

/// Filesystem locations of every artifact of a provisioning run, relative to the output directory.
///
/// ```text
/// {output_dir}/
/// ├── .provision.lock
/// ├── peers.json                      # canonical peer directory
/// ├── config.yaml                     # shared cluster configuration
/// ├── event_initiator.key[.enc]       # event-initiator private key (raw hex or sealed)
/// ├── event_initiator.identity.json
/// ├── integrity_signer.key            # 64 hex characters
/// └── node{i}/
///     ├── config.yaml
///     ├── peers.json
///     └── identity/
///         ├── node{i}_private.key
///         └── node{j}_identity.json   # one per node j in [0, N)
/// ```
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub const PEERS_FILE: &'static str = "peers.json";
    pub const CONFIG_FILE: &'static str = "config.yaml";
    pub const IDENTITY_DIR: &'static str = "identity";
    pub const IDENTITY_SUFFIX: &'static str = "_identity.json";

    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".provision.lock")
    }

    pub fn peers(&self) -> PathBuf {
        self.root.join(Self::PEERS_FILE)
    }

    pub fn cluster_config(&self) -> PathBuf {
        self.root.join(Self::CONFIG_FILE)
    }

    pub fn initiator_key(&self) -> PathBuf {
        self.root.join("event_initiator.key")
    }

    pub fn sealed_initiator_key(&self) -> PathBuf {
        self.root.join("event_initiator.key.enc")
    }

    pub fn initiator_identity(&self) -> PathBuf {
        self.root.join("event_initiator.identity.json")
    }

    /// Scratch directory the issuer writes a fresh event-initiator key pair into before it is taken into
    /// custody.
    pub fn initiator_workdir(&self) -> PathBuf {
        self.root.join(".initiator-work")
    }

    pub fn integrity_seed(&self) -> PathBuf {
        self.root.join("integrity_signer.key")
    }

    pub fn node_root(&self, node: &Node) -> PathBuf {
        self.root.join(node.name())
    }

    pub fn node_config(&self, node: &Node) -> PathBuf {
        self.node_root(node).join(Self::CONFIG_FILE)
    }

    pub fn node_peers(&self, node: &Node) -> PathBuf {
        self.node_root(node).join(Self::PEERS_FILE)
    }

    pub fn identity_dir(&self, node: &Node) -> PathBuf {
        self.node_root(node).join(Self::IDENTITY_DIR)
    }

    /// Where the identity document of `subject` lives inside the bundle of `holder`.
    pub fn identity_document(&self, holder: &Node, subject: &Node) -> PathBuf {
        self.identity_dir(holder).join(identity_file_name(subject))
    }
}

/// File name of a node's identity document, e.g. `node0_identity.json`.
pub fn identity_file_name(node: &Node) -> String {
    format!("{}{}", node.name(), Layout::IDENTITY_SUFFIX)
}
