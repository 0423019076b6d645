/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable file writes.
//!
//! Later stages of a run read the side effects of earlier stages back from disk, so every artifact is written
//! atomically (temporary file, `sync_all`, rename) and is either fully present or absent.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::ProvisionError;

/// Permission bits of private key artifacts.
pub(crate) const PRIVATE_MODE: u32 = 0o600;

/// Atomically replace the contents of `path` with `bytes`. If `mode` is given the file is created with those
/// permission bits (on Unix).
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), ProvisionError> {
    let tmp = temporary_sibling(path);
    // A leftover from an interrupted write is stale by definition.
    let _ = fs::remove_file(&tmp);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&tmp).map_err(|err| ProvisionError::io(&tmp, err))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_all())
        .map_err(|err| ProvisionError::io(&tmp, err))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|err| ProvisionError::io(path, err))
}

/// Set the permission bits of `path`. A no-op on platforms without Unix permissions.
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|err| ProvisionError::io(path, err))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
