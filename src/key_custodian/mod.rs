/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Custody of the cluster's two long-lived signing roots: the event-initiator key pair and the
//! integrity-signer seed.
//!
//! ## State machine
//!
//! Both keys follow the same shape, expressed by the [`KeyCustodian`] trait:
//!
//! ```text
//!   Absent ──generate──▶ Generated
//!   Present ──verify───▶ Verified
//!           └─mismatch─▶ KeyConsistencyViolation (fatal)
//! ```
//!
//! A key is [`Present`](KeyState::Present) if a private artifact for it exists under the output directory.
//! Present keys are checked against what the previous shared configuration records and are reused unchanged;
//! they are never regenerated, even when the check fails. Disagreement between the persisted artifact and the
//! shared configuration is reported as
//! [`KeyConsistencyViolation`](crate::errors::ProvisionError::KeyConsistencyViolation) and left for the operator
//! to resolve.
//!
//! The two keys differ when only the shared configuration remembers them. A recorded event-initiator key
//! without its private artifact is a violation. A recorded integrity seed without its seed file is
//! regenerated with a warning.
//!
//! ## Entry point
//!
//! [`KeyCustodian::load_or_generate`] is the only operation that writes key material. Its result is then
//! written into the new shared configuration with [`KeyCustodian::embed`]. [`KeyCustodian::check`] runs the
//! same reads and checks without writing, and is called before the previous run's bundles are cleaned up.

pub mod envelope;

pub mod event_initiator;

pub mod integrity_signer;

use std::fmt::{self, Display, Formatter};

use crate::cluster_config::ClusterConfig;
use crate::errors::ProvisionError;
use crate::types::basic::KeyKind;
use crate::types::crypto_primitives::VerifyingKey;

pub use event_initiator::{EventInitiatorCustodian, InitiatorKey};
pub use integrity_signer::{IntegrityKey, IntegritySignerCustodian};

/// Where a long-lived key is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    /// No private artifact exists yet.
    Absent,
    /// A private artifact exists but has not been checked yet.
    Present,
    /// The key was generated and persisted by this run.
    Generated,
    /// An existing key was checked against the shared configuration and reused.
    Verified,
}

impl Display for KeyState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Absent => f.write_str("Absent"),
            KeyState::Present => f.write_str("Present"),
            KeyState::Generated => f.write_str("Generated"),
            KeyState::Verified => f.write_str("Verified"),
        }
    }
}

/// Generate-once, verify-on-reuse custody of one long-lived key.
pub trait KeyCustodian {
    type Key;

    const KIND: KeyKind;

    /// Report whether the key's private artifact exists, without reading it.
    fn inspect(&self) -> KeyState;

    /// Read the persisted key and check it against `prior` without writing anything. Returns
    /// [`KeyState::Present`] if [`load_or_generate`](KeyCustodian::load_or_generate) will reuse it, or
    /// [`KeyState::Absent`] if it will generate a new one.
    ///
    /// Fails exactly where `load_or_generate` would fail before generating, so the workflow calls it before
    /// deleting anything from a previous run.
    fn check(&self, prior: Option<&ClusterConfig>) -> Result<KeyState, ProvisionError>;

    /// Load and verify the persisted key against `prior` (the shared configuration of the previous run, if
    /// any), or generate and persist a new one if there is no persisted key.
    ///
    /// Returns [`KeyState::Verified`] or [`KeyState::Generated`] alongside the key.
    fn load_or_generate(
        &self,
        prior: Option<&ClusterConfig>,
    ) -> Result<(Self::Key, KeyState), ProvisionError>;

    /// Write `key` into its fields of the shared configuration.
    fn embed(&self, key: &Self::Key, config: &mut ClusterConfig);

    /// The public half of `key`, used to refer to it in logs.
    fn public_key(key: &Self::Key) -> VerifyingKey;
}
