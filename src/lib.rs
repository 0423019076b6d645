/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Credential and peer provisioning for multi-node threshold-signing clusters.
//!
//! A [provisioning run](workflow::Provisioner::run) issues a peer directory and per-node identities through an
//! external [`Issuer`](issuer::Issuer), takes the cluster's two long-lived keys into
//! [custody](key_custodian), writes the [shared configuration](cluster_config), replicates everything into one
//! configuration root per node, and registers the peer set with the running cluster.

pub mod cluster_config;

pub mod config;

pub mod distribution;

pub mod errors;

pub mod events;

pub(crate) mod event_bus;

pub mod identity;

pub mod issuer;

pub mod key_custodian;

pub mod logging;

pub mod peer_directory;

pub(crate) mod persist;

pub(crate) mod pool;

pub mod registrar;

pub mod run_lock;

pub mod types;

pub mod workflow;
