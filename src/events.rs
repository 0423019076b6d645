/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted by a provisioning run, for event handling and logging.
//!
//! An event for a given stage indicates that the stage has completed its side effects for the subject of the
//! event, e.g. an [`IssueIdentityEvent`] is emitted once a node's identity document has been written and
//! validated.
//!
//! Events are delivered synchronously, in stage order, to:
//! 1. The handlers registered on the [`Provisioner`](crate::workflow::Provisioner) builder.
//! 2. The default [loggers](crate::logging), if the run's configuration enables `log_events`.

use std::time::SystemTime;

use crate::key_custodian::KeyState;
use crate::types::basic::{ClusterSize, Environment, KeyKind, Node, PeerId, Threshold};
use crate::types::crypto_primitives::VerifyingKey;

pub enum Event {
    GeneratePeerDirectory(GeneratePeerDirectoryEvent),
    IssueIdentity(IssueIdentityEvent),
    CustodyKey(CustodyKeyEvent),
    MaterializeConfig(MaterializeConfigEvent),
    DistributeBundle(DistributeBundleEvent),
    RegisterPeers(RegisterPeersEvent),
}

/// A fresh peer directory was generated and validated.
pub struct GeneratePeerDirectoryEvent {
    pub timestamp: SystemTime,
    pub size: ClusterSize,
}

/// A node's identity was issued and validated.
pub struct IssueIdentityEvent {
    pub timestamp: SystemTime,
    pub node: Node,
    pub public_key: VerifyingKey,
}

/// A long-lived key was taken into custody, either by generating it or by verifying a persisted one.
pub struct CustodyKeyEvent {
    pub timestamp: SystemTime,
    pub key: KeyKind,
    pub state: KeyState,
    pub public_key: VerifyingKey,
}

/// The shared configuration was assembled, had both keys embedded, and was written.
pub struct MaterializeConfigEvent {
    pub timestamp: SystemTime,
    pub threshold: Threshold,
    pub environment: Environment,
}

/// A node's configuration root was completed and verified.
pub struct DistributeBundleEvent {
    pub timestamp: SystemTime,
    pub node: Node,
    pub identities: usize,
}

/// The peer directory was registered with the cluster.
pub struct RegisterPeersEvent {
    pub timestamp: SystemTime,
    pub peers: Vec<PeerId>,
}
