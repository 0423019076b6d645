/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the run's
//! [configuration](crate::config::ProvisionConfig).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed onto
//! a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations). The
//! `mpc-provision` binary uses `fern`.
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet is how a
//! [CustodyKey](crate::events::CustodyKeyEvent) is printed:
//!
//! ```text
//! CustodyKey, 1701329264, event-initiator, Verified, Id5u7f6
//! ```
//!
//! In the snippet:
//! - The third value is the key that was taken into custody.
//! - The fourth value is the state the key ended up in.
//! - The fifth value is the first seven characters of the Base64 encoding of the SHA-256 fingerprint of the
//!   key's public half. Private key material is never logged.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;
use crate::types::crypto_primitives::{fingerprint, VerifyingKey};

// Names of each event in PascalCase for printing:
pub const GENERATE_PEER_DIRECTORY: &str = "GeneratePeerDirectory";
pub const ISSUE_IDENTITY: &str = "IssueIdentity";
pub const CUSTODY_KEY: &str = "CustodyKey";
pub const MATERIALIZE_CONFIG: &str = "MaterializeConfig";
pub const DISTRIBUTE_BUNDLE: &str = "DistributeBundle";
pub const REGISTER_PEERS: &str = "RegisterPeers";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for GeneratePeerDirectoryEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |generate_peer_directory_event: &GeneratePeerDirectoryEvent| {
            log::info!(
                "{}, {}, {}",
                GENERATE_PEER_DIRECTORY,
                secs_since_unix_epoch(generate_peer_directory_event.timestamp),
                generate_peer_directory_event.size
            )
        };
        Box::new(logger)
    }
}

impl Logger for IssueIdentityEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |issue_identity_event: &IssueIdentityEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ISSUE_IDENTITY,
                secs_since_unix_epoch(issue_identity_event.timestamp),
                issue_identity_event.node,
                public_key_fingerprint(&issue_identity_event.public_key)
            )
        };
        Box::new(logger)
    }
}

impl Logger for CustodyKeyEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |custody_key_event: &CustodyKeyEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                CUSTODY_KEY,
                secs_since_unix_epoch(custody_key_event.timestamp),
                custody_key_event.key,
                custody_key_event.state,
                public_key_fingerprint(&custody_key_event.public_key)
            )
        };
        Box::new(logger)
    }
}

impl Logger for MaterializeConfigEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |materialize_config_event: &MaterializeConfigEvent| {
            log::info!(
                "{}, {}, {}, {}",
                MATERIALIZE_CONFIG,
                secs_since_unix_epoch(materialize_config_event.timestamp),
                materialize_config_event.threshold,
                materialize_config_event.environment
            )
        };
        Box::new(logger)
    }
}

impl Logger for DistributeBundleEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |distribute_bundle_event: &DistributeBundleEvent| {
            log::info!(
                "{}, {}, {}, {}",
                DISTRIBUTE_BUNDLE,
                secs_since_unix_epoch(distribute_bundle_event.timestamp),
                distribute_bundle_event.node,
                distribute_bundle_event.identities
            )
        };
        Box::new(logger)
    }
}

impl Logger for RegisterPeersEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |register_peers_event: &RegisterPeersEvent| {
            log::info!(
                "{}, {}, {}",
                REGISTER_PEERS,
                secs_since_unix_epoch(register_peers_event.timestamp),
                register_peers_event.peers.len()
            )
        };
        Box::new(logger)
    }
}

fn public_key_fingerprint(public_key: &VerifyingKey) -> String {
    first_seven_base64_chars(&fingerprint(public_key.as_bytes()))
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events are never timestamped before the epoch on a sane clock; report 0 if they are.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
