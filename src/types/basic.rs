/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types shared across the stages of a provisioning run.
//!
//! These types follow the newtype pattern: they are created once from operator input, inspected by the
//! stages of the [workflow](crate::workflow), and have no active behavior of their own besides the small
//! API defined in this module.

use std::fmt::{self, Display, Formatter};

/// Position of a node in the cluster. Node indices of a cluster of size `N` are exactly `[0, N)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// One participant in the signing cluster.
///
/// Nodes are derived purely from the configured [`ClusterSize`] and are recomputed on every run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Node {
    index: NodeIndex,
    name: String,
}

impl Node {
    pub const NAME_PREFIX: &'static str = "node";

    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            name: format!("{}{}", Self::NAME_PREFIX, index),
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a node name of the form `node{index}` back into its index.
    pub fn parse_name(name: &str) -> Option<NodeIndex> {
        let digits = name.strip_prefix(Self::NAME_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Reject "node01" and friends, which would alias "node1".
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok().map(NodeIndex::new)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Number of nodes in the cluster (`N`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterSize(u32);

impl ClusterSize {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        index.int() < self.0
    }

    /// Iterate through the nodes of the cluster in ascending order of their indices.
    pub fn nodes(&self) -> impl Iterator<Item = Node> {
        (0..self.0).map(|i| Node::new(NodeIndex::new(i)))
    }
}

impl Display for ClusterSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The signing threshold (`mpc_threshold`). A valid threshold is strictly smaller than the [`ClusterSize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Threshold(u32);

impl Threshold {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for Threshold {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Stable, opaque peer identifier assigned to a node by the external identity issuer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deployment environment tag written into the shared configuration, e.g. `development` or `production`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment(String);

impl Environment {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Environment tags are non-empty and restricted to ASCII alphanumerics, `-`, and `_`.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new("development")
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two long-lived keys managed by the [key custodian](crate::key_custodian).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    EventInitiator,
    IntegritySigner,
}

impl Display for KeyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::EventInitiator => f.write_str("event-initiator"),
            KeyKind::IntegritySigner => f.write_str("integrity-signer"),
        }
    }
}
