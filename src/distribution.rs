/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Replication of a run's artifacts into every node's private configuration root.
//!
//! After [`distribute`] succeeds, the root of every node `i` holds:
//! 1. A copy of the shared configuration (`config.yaml`).
//! 2. A copy of the peer directory (`peers.json`).
//! 3. In `identity/`, its own identity document and the identity document of every other node: exactly `N`
//!    documents in total.
//!
//! ## Copy plan
//!
//! Identity documents are exchanged according to a [`CopyPlan`]: the set of every `(source, target)` pair of
//! distinct nodes. The tasks of the plan are independent of each other and are executed on the bounded worker
//! pool. Verification only starts once every task has completed.
//!
//! ## Permissions
//!
//! Containerized nodes run as a different system user than the one provisioning them. Every file in a node
//! root is therefore set to [`ProvisionConfig::file_mode`] (read/write, never execute) and every directory to
//! `0o755`. The exception is the node's own private key in `identity/` (any file there that is not an identity
//! document): it is never readable by other users, so it gets `file_mode & 0o640`.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{identity_file_name, Layout, ProvisionConfig};
use crate::errors::ProvisionError;
use crate::persist::set_mode;
use crate::pool::run_bounded;
use crate::types::basic::{ClusterSize, Node};

/// Permission bits of every directory in a node root.
pub const DIR_MODE: u32 = 0o755;

/// Mask applied to `file_mode` for private keys in a node's identity directory.
pub const PRIVATE_FILE_MASK: u32 = 0o640;

/// Copy the identity document of `source` into the identity directory of `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyTask {
    pub source: Node,
    pub target: Node,
}

#[derive(Clone, Debug)]
pub struct CopyPlan {
    tasks: Vec<CopyTask>,
}

impl CopyPlan {
    /// Every ordered pair of distinct nodes: `N * (N - 1)` tasks.
    pub fn all_pairs(size: ClusterSize) -> CopyPlan {
        let tasks = size
            .nodes()
            .flat_map(|source| {
                let source_index = source.index();
                size.nodes()
                    .filter(move |target| target.index() != source_index)
                    .map(move |target| CopyTask {
                        source: source.clone(),
                        target,
                    })
            })
            .collect();
        CopyPlan { tasks }
    }

    pub fn tasks(&self) -> &[CopyTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A node's finished configuration root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeBundle {
    pub node: Node,
    pub root: PathBuf,
    /// Number of identity documents in the bundle. Always equal to the cluster size.
    pub identities: usize,
}

/// Build the configuration root of every node from the shared artifacts under `config.output_dir`.
///
/// Expects the shared configuration, the peer directory, and every node's own identity document to already
/// be in place. Returns the bundles in ascending order of node index.
pub fn distribute(config: &ProvisionConfig) -> Result<Vec<NodeBundle>, ProvisionError> {
    let layout = config.layout();
    let nodes: Vec<Node> = config.node_count.nodes().collect();

    run_bounded(config.workers, &nodes, |node| copy_shared_artifacts(&layout, node))?;

    let plan = CopyPlan::all_pairs(config.node_count);
    log::debug!("executing identity copy plan of {} tasks", plan.len());
    run_bounded(config.workers, plan.tasks(), |task| copy_identity(&layout, task))?;

    nodes
        .iter()
        .map(|node| {
            let root = layout.node_root(node);
            normalize_permissions(&root, config.file_mode)?;
            let identities = verify_identities(&layout, config.node_count, node)?;
            Ok(NodeBundle {
                node: node.clone(),
                root,
                identities,
            })
        })
        .collect()
}

fn copy_shared_artifacts(layout: &Layout, node: &Node) -> Result<(), ProvisionError> {
    let root = layout.node_root(node);
    fs::create_dir_all(&root).map_err(|err| ProvisionError::io(&root, err))?;

    copy_artifact(node, &layout.cluster_config(), &layout.node_config(node))?;
    copy_artifact(node, &layout.peers(), &layout.node_peers(node))
}

fn copy_identity(layout: &Layout, task: &CopyTask) -> Result<(), ProvisionError> {
    let target_dir = layout.identity_dir(&task.target);
    fs::create_dir_all(&target_dir).map_err(|err| ProvisionError::io(&target_dir, err))?;

    copy_artifact(
        &task.target,
        &layout.identity_document(&task.source, &task.source),
        &layout.identity_document(&task.target, &task.source),
    )
}

fn copy_artifact(node: &Node, source: &Path, target: &Path) -> Result<(), ProvisionError> {
    let artifact = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());

    if !source.is_file() {
        return Err(ProvisionError::distribution(
            node,
            artifact,
            format!("{} does not exist", source.display()),
        ));
    }
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|err| ProvisionError::distribution(node, artifact, err))
}

/// Recursively set every file under `root` to its [`file_mode_of`] and every directory to [`DIR_MODE`].
fn normalize_permissions(root: &Path, file_mode: u32) -> Result<(), ProvisionError> {
    set_mode(root, DIR_MODE)?;
    let entries = fs::read_dir(root).map_err(|err| ProvisionError::io(root, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| ProvisionError::io(root, err))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|err| ProvisionError::io(&path, err))?;
        if file_type.is_dir() {
            normalize_permissions(&path, file_mode)?;
        } else if file_type.is_file() {
            set_mode(&path, file_mode_of(&path, file_mode))?;
        }
    }
    log::debug!("normalized permissions under {}", root.display());
    Ok(())
}

/// `file_mode`, narrowed by [`PRIVATE_FILE_MASK`] for files in an identity directory that are not identity
/// documents.
fn file_mode_of(path: &Path, file_mode: u32) -> u32 {
    let in_identity_dir = path.parent().and_then(Path::file_name) == Some(OsStr::new(Layout::IDENTITY_DIR));
    let is_document = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(Layout::IDENTITY_SUFFIX));
    if in_identity_dir && !is_document {
        file_mode & PRIVATE_FILE_MASK
    } else {
        file_mode
    }
}

/// Check that the identity directory of `node` holds exactly one identity document per node of the cluster.
fn verify_identities(
    layout: &Layout,
    size: ClusterSize,
    node: &Node,
) -> Result<usize, ProvisionError> {
    let dir = layout.identity_dir(node);
    let entries = fs::read_dir(&dir).map_err(|err| ProvisionError::io(&dir, err))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ProvisionError::io(&dir, err))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(Layout::IDENTITY_SUFFIX) {
            found.push(name);
        }
    }

    for expected in size.nodes().map(|subject| identity_file_name(&subject)) {
        if !found.contains(&expected) {
            return Err(ProvisionError::distribution(
                node,
                expected,
                "missing after distribution",
            ));
        }
    }
    if found.len() != size.int() as usize {
        return Err(ProvisionError::distribution(
            node,
            "identity documents",
            format!("found {}, expected {}", found.len(), size),
        ));
    }
    Ok(found.len())
}
