/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Registration of the finished peer directory with the cluster's coordination service.
//!
//! Registration runs on the provisioning host, outside the cluster's container network, so it cannot reach
//! the container-internal addresses recorded in the shared configuration. For the duration of the external
//! call the messaging and coordination endpoints in the root `config.yaml` are replaced by their external
//! counterparts ([`EndpointSubstitution`]), then restored. Restoration happens whether or not registration
//! succeeds. The node bundles hold their own copies of the configuration and are never substituted.
//!
//! Registration is idempotent on the cluster's side, so the workflow does not deduplicate submissions.

use std::path::{Path, PathBuf};

use crate::cluster_config::ClusterConfig;
use crate::config::{Endpoints, ProvisionConfig};
use crate::errors::ProvisionError;
use crate::issuer::Issuer;
use crate::peer_directory::PeerDirectory;

/// A scoped replacement of the endpoints recorded in a shared configuration file.
///
/// Call [`restore`](EndpointSubstitution::restore) to put the original endpoints back and observe failures. If
/// the substitution is dropped without being restored, restoration is attempted on drop and failures are
/// logged.
#[derive(Debug)]
pub struct EndpointSubstitution {
    path: PathBuf,
    original: Endpoints,
    restored: bool,
}

impl EndpointSubstitution {
    /// Write `substitute` into the configuration at `path`, remembering the endpoints it replaced.
    pub fn apply(path: &Path, substitute: &Endpoints) -> Result<EndpointSubstitution, ProvisionError> {
        let mut original = None;
        ClusterConfig::update(path, |config| {
            original = Some(config.endpoints());
            config.set_endpoints(substitute);
        })?;
        let original = original.unwrap_or_else(Endpoints::internal_default);

        log::debug!(
            "substituted endpoints {} / {} with {} / {}",
            original.messaging,
            original.coordination,
            substitute.messaging,
            substitute.coordination
        );
        Ok(EndpointSubstitution {
            path: path.to_path_buf(),
            original,
            restored: false,
        })
    }

    pub fn original(&self) -> &Endpoints {
        &self.original
    }

    /// Put the original endpoints back.
    pub fn restore(mut self) -> Result<(), ProvisionError> {
        self.restored = true;
        self.write_original()
    }

    fn write_original(&self) -> Result<(), ProvisionError> {
        ClusterConfig::update(&self.path, |config| config.set_endpoints(&self.original))?;
        log::debug!("restored endpoints in {}", self.path.display());
        Ok(())
    }
}

impl Drop for EndpointSubstitution {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(err) = self.write_original() {
                log::warn!(
                    "failed to restore endpoints in {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

/// Submit the peer directory of the run to the cluster, using the external endpoints for the duration of the
/// call.
pub fn register_peers<I: Issuer + ?Sized>(
    issuer: &I,
    config: &ProvisionConfig,
    peers: &PeerDirectory,
) -> Result<(), ProvisionError> {
    let layout = config.layout();
    let config_path = layout.cluster_config();

    let substitution = EndpointSubstitution::apply(&config_path, &config.external_endpoints)?;
    log::debug!("registering {} peers", peers.len());
    let registered = issuer
        .register_peers(&layout.peers(), &config_path)
        .map_err(ProvisionError::RegistrationFailure);
    let restored = substitution.restore();

    registered?;
    restored
}
