//! Types that are used across multiple stages of a provisioning run.
//!
//! Other types, specific to single stages, can be found in the modules of those stages, e.g.,
//! [`crate::key_custodian::KeyState`].

pub mod basic;

pub mod crypto_primitives;
