/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Issuance of per-node cryptographic identities.
//!
//! Every run issues a fresh identity for every node; there is no consistency check against earlier runs.
//! Each identity is written into the owning node's private `identity/` directory. Distributing the public
//! identity documents to the other nodes is the job of [`crate::distribution`].
//!
//! Failing to produce an identity for any node fails the whole run: partial identity sets are not a
//! supported state.

use std::fs;
use std::path::PathBuf;

use crate::config::{Layout, ProvisionConfig};
use crate::errors::ProvisionError;
use crate::issuer::{IdentityDocument, Issuer};
use crate::pool::run_bounded;
use crate::types::basic::Node;

/// The identity issued to one node.
#[derive(Clone, Debug)]
pub struct NodeIdentity {
    pub node: Node,
    pub document: IdentityDocument,
    /// Location of the identity document inside the node's own bundle.
    pub path: PathBuf,
}

/// Issue an identity for every node of the cluster, on at most `config.workers` threads.
///
/// Returns the identities in ascending order of node index.
pub fn provision_identities<I: Issuer + ?Sized>(
    issuer: &I,
    config: &ProvisionConfig,
) -> Result<Vec<NodeIdentity>, ProvisionError> {
    let layout = config.layout();
    let nodes: Vec<Node> = config.node_count.nodes().collect();

    run_bounded(config.workers, &nodes, |node| {
        issue_identity(issuer, &layout, node, config.encrypt)
    })
}

fn issue_identity<I: Issuer + ?Sized>(
    issuer: &I,
    layout: &Layout,
    node: &Node,
    encrypt: bool,
) -> Result<NodeIdentity, ProvisionError> {
    let identity_dir = layout.identity_dir(node);
    fs::create_dir_all(&identity_dir).map_err(|err| ProvisionError::io(&identity_dir, err))?;

    let path = issuer
        .generate_identity(node, encrypt, &identity_dir)
        .map_err(|err| ProvisionError::generation(format!("identity for {}", node), err))?;
    let document = IdentityDocument::load(&path, node.name())?;

    // The rest of the workflow looks for the document by its canonical name.
    let canonical = layout.identity_document(node, node);
    if path != canonical {
        fs::rename(&path, &canonical).map_err(|err| ProvisionError::io(&canonical, err))?;
    }

    Ok(NodeIdentity {
        node: node.clone(),
        document,
        path: canonical,
    })
}
