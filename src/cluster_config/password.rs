/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Generation of the storage password written into the shared configuration.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use crate::types::crypto_primitives::random_bytes;

/// Length, in characters, of a storage password.
pub const STORAGE_PASSWORD_LEN: usize = 32;

/// Generate a 32-character alphanumeric password.
///
/// Random bytes are base64-encoded and stripped of every non-alphanumeric character. Candidates that come out
/// shorter than [`STORAGE_PASSWORD_LEN`] are rejected and a new one is drawn.
pub fn generate_storage_password() -> Zeroizing<String> {
    loop {
        let source = Zeroizing::new(STANDARD.encode(random_bytes::<48>()));
        let candidate: Zeroizing<String> = Zeroizing::new(
            source
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect(),
        );
        if candidate.len() >= STORAGE_PASSWORD_LEN {
            return Zeroizing::new(candidate[..STORAGE_PASSWORD_LEN].to_string());
        }
    }
}

/// Does `password` have the shape produced by [`generate_storage_password`]?
pub fn is_well_formed_storage_password(password: &str) -> bool {
    password.len() == STORAGE_PASSWORD_LEN && password.chars().all(|c| c.is_ascii_alphanumeric())
}
