/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The provisioning workflow, driven by a [`Provisioner`].
//!
//! ## Creating and running a provisioner
//!
//! ```ignore
//! let report =
//!     Provisioner::builder()
//!     .configuration(configuration)
//!     .issuer(ProcessIssuer::new("mpcium-cli", Duration::from_secs(120)))
//!     .on_custody_key(|event| println!("{} key is {}", event.key, event.state))
//!     .build()
//!     .run()?;
//! ```
//!
//! ## Stages
//!
//! [`Provisioner::run`] executes the following stages strictly in sequence. Each stage reads the side effects
//! of the stages before it back from disk, so no stage starts before its predecessor's artifacts are durably
//! written.
//!
//! 1. **Validate** the [`ProvisionConfig`]. An invalid request fails here, before anything is created or
//!    deleted.
//! 2. **Lock** the output directory against concurrent runs.
//! 3. **Load** the shared configuration left by the previous run, if any, and **check** the persisted keys
//!    against it without writing anything. A wrong passphrase or an inconsistent key fails the run here,
//!    with the previous run's artifacts untouched.
//! 4. **Clean** the node bundles and peer directory of the previous run. Key artifacts and the shared
//!    configuration are kept.
//! 5. **Build** the [peer directory](crate::peer_directory).
//! 6. **Issue** every node's [identity](crate::identity).
//! 7. **Take custody** of the event-initiator key, then the integrity-signer seed
//!    ([key custodian](crate::key_custodian)).
//! 8. **Materialize** the [shared configuration](crate::cluster_config) and embed both keys in it.
//! 9. **Distribute** the artifacts into every node's configuration root ([distribution](crate::distribution)).
//! 10. **Register** the peer directory with the cluster ([registrar](crate::registrar)), unless disabled.
//!
//! Any failure aborts the run. Artifacts already written are left in place: re-running is the recovery
//! mechanism, and the key custodian makes re-runs reuse the persisted keys instead of rotating them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use typed_builder::TypedBuilder;

use crate::cluster_config::ClusterConfig;
use crate::config::{Layout, ProvisionConfig};
use crate::distribution::distribute;
use crate::errors::ProvisionError;
use crate::event_bus::{EventHandlers, HandlerPtr};
use crate::events::*;
use crate::identity::{provision_identities, NodeIdentity};
use crate::issuer::Issuer;
use crate::key_custodian::{EventInitiatorCustodian, IntegritySignerCustodian, KeyCustodian, KeyState};
use crate::peer_directory::PeerDirectory;
use crate::registrar::register_peers;
use crate::run_lock::RunLock;
use crate::types::basic::Node;

/// Stores the configuration of a run, the issuer it drives, and the user's event handlers.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Provisioner]. On the builder call the following methods to construct a
    valid [Provisioner].

    Required:
    - `.configuration(...)`
    - `.issuer(...)`

    Optional:
    - `.on_generate_peer_directory(...)`
    - `.on_issue_identity(...)`
    - `.on_custody_key(...)`
    - `.on_materialize_config(...)`
    - `.on_distribute_bundle(...)`
    - `.on_register_peers(...)`
"))]
pub struct Provisioner<I: Issuer> {
    // Required parameters
    #[builder(setter(doc = "Set the [configuration](ProvisionConfig) of the run. Required."))]
    configuration: ProvisionConfig,
    #[builder(setter(doc = "Set the implementation of the external identity and peer issuer. The argument must implement the [Issuer](crate::issuer::Issuer) trait. Required."))]
    issuer: I,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&GeneratePeerDirectoryEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<GeneratePeerDirectoryEvent>),
    doc = "Register a handler closure to be invoked after the peer directory is generated and validated. Optional."))]
    on_generate_peer_directory: Option<HandlerPtr<GeneratePeerDirectoryEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&IssueIdentityEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<IssueIdentityEvent>),
    doc = "Register a handler closure to be invoked after a node's identity is issued. Optional."))]
    on_issue_identity: Option<HandlerPtr<IssueIdentityEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CustodyKeyEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CustodyKeyEvent>),
    doc = "Register a handler closure to be invoked after a long-lived key is generated or verified. Optional."))]
    on_custody_key: Option<HandlerPtr<CustodyKeyEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&MaterializeConfigEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<MaterializeConfigEvent>),
    doc = "Register a handler closure to be invoked after the shared configuration is written. Optional."))]
    on_materialize_config: Option<HandlerPtr<MaterializeConfigEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DistributeBundleEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DistributeBundleEvent>),
    doc = "Register a handler closure to be invoked after a node's configuration root is completed. Optional."))]
    on_distribute_bundle: Option<HandlerPtr<DistributeBundleEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RegisterPeersEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RegisterPeersEvent>),
    doc = "Register a handler closure to be invoked after the peer directory is registered with the cluster. Optional."))]
    on_register_peers: Option<HandlerPtr<RegisterPeersEvent>>,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct ProvisionReport {
    pub peers: PeerDirectory,
    pub identities: Vec<NodeIdentity>,
    pub initiator: KeyState,
    pub integrity: KeyState,
    pub node_roots: Vec<PathBuf>,
    pub registered: bool,
}

impl<I: Issuer> Provisioner<I> {
    /// Execute every stage of the workflow. See the [module documentation](self) for the order of stages.
    pub fn run(self) -> Result<ProvisionReport, ProvisionError> {
        let config = self.configuration;
        config.validate()?;

        let handlers = EventHandlers::new(
            config.log_events,
            self.on_generate_peer_directory,
            self.on_issue_identity,
            self.on_custody_key,
            self.on_materialize_config,
            self.on_distribute_bundle,
            self.on_register_peers,
        );
        let issuer = self.issuer;
        let layout = config.layout();

        let _lock = RunLock::acquire(layout.root(), &layout.lock_file())?;
        let prior = ClusterConfig::load(&layout.cluster_config())?;

        // Persisted keys are read and checked before anything from the previous run is deleted.
        let initiator_custodian = EventInitiatorCustodian::new(&issuer, &config);
        let integrity_custodian = IntegritySignerCustodian::new(layout.clone());
        precheck(&initiator_custodian, prior.as_ref())?;
        precheck(&integrity_custodian, prior.as_ref())?;

        clean_bundles(&layout)?;

        // Peer directory.
        let peers = PeerDirectory::build(&issuer, config.node_count, &layout.peers())?;
        handlers.fire_handlers(Event::GeneratePeerDirectory(GeneratePeerDirectoryEvent {
            timestamp: SystemTime::now(),
            size: config.node_count,
        }));

        // Identities.
        let identities = provision_identities(&issuer, &config)?;
        for identity in &identities {
            if let Some(public_key) = identity.document.verifying_key() {
                handlers.fire_handlers(Event::IssueIdentity(IssueIdentityEvent {
                    timestamp: SystemTime::now(),
                    node: identity.node.clone(),
                    public_key,
                }));
            }
        }

        // Keys.
        let (initiator, initiator_state) = custody(&initiator_custodian, prior.as_ref(), &handlers)?;
        let (integrity, integrity_state) = custody(&integrity_custodian, prior.as_ref(), &handlers)?;

        // Shared configuration.
        let mut cluster_config = ClusterConfig::assemble(&config, prior);
        initiator_custodian.embed(&initiator, &mut cluster_config);
        integrity_custodian.embed(&integrity, &mut cluster_config);
        cluster_config.store(&layout.cluster_config())?;
        handlers.fire_handlers(Event::MaterializeConfig(MaterializeConfigEvent {
            timestamp: SystemTime::now(),
            threshold: config.threshold,
            environment: config.environment.clone(),
        }));

        // Distribution.
        let bundles = distribute(&config)?;
        for bundle in &bundles {
            handlers.fire_handlers(Event::DistributeBundle(DistributeBundleEvent {
                timestamp: SystemTime::now(),
                node: bundle.node.clone(),
                identities: bundle.identities,
            }));
        }

        // Registration.
        if config.register {
            register_peers(&issuer, &config, &peers)?;
            handlers.fire_handlers(Event::RegisterPeers(RegisterPeersEvent {
                timestamp: SystemTime::now(),
                peers: peers.iter().map(|(_, peer)| peer.clone()).collect(),
            }));
        } else {
            log::info!("skipping peer registration");
        }

        Ok(ProvisionReport {
            peers,
            identities,
            initiator: initiator_state,
            integrity: integrity_state,
            node_roots: bundles.into_iter().map(|bundle| bundle.root).collect(),
            registered: config.register,
        })
    }
}

fn precheck<C: KeyCustodian>(custodian: &C, prior: Option<&ClusterConfig>) -> Result<(), ProvisionError> {
    let state = custodian.check(prior)?;
    log::debug!("{} key is {}", C::KIND, state);
    Ok(())
}

fn custody<C: KeyCustodian>(
    custodian: &C,
    prior: Option<&ClusterConfig>,
    handlers: &EventHandlers,
) -> Result<(C::Key, KeyState), ProvisionError> {
    let (key, state) = custodian.load_or_generate(prior)?;
    handlers.fire_handlers(Event::CustodyKey(CustodyKeyEvent {
        timestamp: SystemTime::now(),
        key: C::KIND,
        state,
        public_key: C::public_key(&key),
    }));
    Ok((key, state))
}

/// Delete every `node{i}` directory, the peer directory, and the initiator scratch directory under the output
/// root. Bundles are rebuilt from scratch on every run, never patched.
fn clean_bundles(layout: &Layout) -> Result<(), ProvisionError> {
    let root = layout.root();
    let entries = fs::read_dir(root).map_err(|err| ProvisionError::io(root, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| ProvisionError::io(root, err))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        if is_dir && name.to_str().and_then(Node::parse_name).is_some() {
            let path = entry.path();
            fs::remove_dir_all(&path).map_err(|err| ProvisionError::io(&path, err))?;
            log::debug!("removed previous bundle {}", path.display());
        }
    }

    remove_if_exists(&layout.peers(), false)?;
    remove_if_exists(&layout.initiator_workdir(), true)
}

fn remove_if_exists(path: &Path, dir: bool) -> Result<(), ProvisionError> {
    let removed = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ProvisionError::io(path, err)),
    }
}
