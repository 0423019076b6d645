/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ways a provisioning run can fail.
//!
//! Every failure is fatal: it propagates to [`Provisioner::run`](crate::workflow::Provisioner::run) and ends
//! the run without rolling back artifacts that were already written. Re-running is the recovery mechanism.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::issuer::IssuerError;
use crate::types::basic::KeyKind;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The request itself is invalid, e.g. `threshold >= node_count`. Raised before anything is written or
    /// deleted.
    #[error("invalid provisioning request: {0}")]
    ValidationFailure(String),

    /// The external issuer did not produce an expected artifact, or produced one that is unreadable.
    #[error("failed to generate {artifact}: {reason}")]
    GenerationFailure { artifact: String, reason: String },

    /// Persisted private key material disagrees with what the shared configuration records, or a persisted
    /// seed is malformed. Never repaired automatically.
    #[error("{key} key is inconsistent with the shared configuration: {reason}")]
    KeyConsistencyViolation { key: KeyKind, reason: String },

    /// An artifact that a node bundle requires was missing when it was copied or verified.
    #[error("failed to distribute {artifact} to {node}: {reason}")]
    DistributionFailure {
        node: String,
        artifact: String,
        reason: String,
    },

    /// The external registration call failed.
    #[error("peer registration failed: {0}")]
    RegistrationFailure(#[source] IssuerError),

    /// The shared configuration exists but cannot be parsed or serialized.
    #[error("cluster configuration {} is malformed: {source}", .path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Another provisioning run currently holds the output directory.
    #[error("output directory is locked by another provisioning run: {}", .0.display())]
    RunLocked(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn generation(artifact: impl Into<String>, reason: impl ToString) -> Self {
        ProvisionError::GenerationFailure {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn inconsistent(key: KeyKind, reason: impl Into<String>) -> Self {
        ProvisionError::KeyConsistencyViolation {
            key,
            reason: reason.into(),
        }
    }

    pub(crate) fn distribution(
        node: impl ToString,
        artifact: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        ProvisionError::DistributionFailure {
            node: node.to_string(),
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }
}
