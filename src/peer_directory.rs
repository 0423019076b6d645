/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [`PeerDirectory`] type, the canonical mapping from node index to peer identifier.
//!
//! A peer directory is created once per provisioning run by [`PeerDirectory::build`] and overwrites any prior
//! directory: there is no incremental update or merge.
//!
//! ## Invariants
//!
//! For a cluster of size `N`, a valid peer directory:
//! 1. Has exactly `N` entries, keyed by the node indices `[0, N)`.
//! 2. Assigns a non-empty peer identifier to every node.
//! 3. Never assigns the same peer identifier to two nodes.
//!
//! ## File format
//!
//! On disk the directory is a JSON object keyed by node name:
//!
//! ```text
//! { "node0": "12D3KooW...", "node1": "...", "node2": "..." }
//! ```

use std::collections::{btree_map, BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use crate::errors::ProvisionError;
use crate::issuer::Issuer;
use crate::types::basic::{ClusterSize, Node, NodeIndex, PeerId};

const ARTIFACT: &str = "peer directory";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: BTreeMap<NodeIndex, PeerId>,
}

impl PeerDirectory {
    /// Ask `issuer` for a fresh peer directory of `size` nodes, persist it at `path` (replacing any prior one),
    /// and read it back, checking every invariant.
    pub fn build<I: Issuer + ?Sized>(
        issuer: &I,
        size: ClusterSize,
        path: &Path,
    ) -> Result<PeerDirectory, ProvisionError> {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("removed previous peer directory {}", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => (),
            Err(err) => return Err(ProvisionError::io(path, err)),
        }

        issuer
            .generate_peers(size, path)
            .map_err(|err| ProvisionError::generation(ARTIFACT, err))?;

        PeerDirectory::load(path, size)
    }

    /// Read the peer directory at `path` and check it against a cluster of `size` nodes.
    pub fn load(path: &Path, size: ClusterSize) -> Result<PeerDirectory, ProvisionError> {
        let bytes = fs::read(path)
            .map_err(|err| ProvisionError::generation(ARTIFACT, format!("{}: {}", path.display(), err)))?;
        let raw: BTreeMap<String, String> = serde_json::from_slice(&bytes)
            .map_err(|err| ProvisionError::generation(ARTIFACT, format!("{}: {}", path.display(), err)))?;

        let mut peers = BTreeMap::new();
        for (name, id) in raw {
            let index = Node::parse_name(&name).ok_or_else(|| {
                ProvisionError::generation(ARTIFACT, format!("unexpected node name {:?}", name))
            })?;
            peers.insert(index, PeerId::new(id));
        }

        let directory = PeerDirectory { peers };
        directory.check(size)?;
        Ok(directory)
    }

    /// Check the invariants listed in the [module documentation](self).
    pub fn check(&self, size: ClusterSize) -> Result<(), ProvisionError> {
        if self.peers.len() != size.int() as usize {
            return Err(ProvisionError::generation(
                ARTIFACT,
                format!("expected {} entries, found {}", size, self.peers.len()),
            ));
        }
        if let Some(index) = self.peers.keys().find(|index| !size.contains(**index)) {
            return Err(ProvisionError::generation(
                ARTIFACT,
                format!("node index {} is outside of [0, {})", index, size),
            ));
        }

        let mut seen = HashSet::new();
        for (index, peer) in &self.peers {
            if peer.as_str().trim().is_empty() {
                return Err(ProvisionError::generation(
                    ARTIFACT,
                    format!("node {} has an empty peer identifier", index),
                ));
            }
            if !seen.insert(peer) {
                return Err(ProvisionError::generation(
                    ARTIFACT,
                    format!("peer identifier {} is assigned more than once", peer),
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, index: NodeIndex) -> Option<&PeerId> {
        self.peers.get(&index)
    }

    /// Iterate through the entries in ascending order of node index.
    pub fn iter(&self) -> btree_map::Iter<'_, NodeIndex, PeerId> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl FromIterator<(NodeIndex, PeerId)> for PeerDirectory {
    fn from_iter<T: IntoIterator<Item = (NodeIndex, PeerId)>>(iter: T) -> Self {
        PeerDirectory {
            peers: iter.into_iter().collect(),
        }
    }
}
