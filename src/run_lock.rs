/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exclusive lock on an output directory for the duration of one provisioning run.
//!
//! The lock is an OS-level advisory lock on `{output_dir}/.provision.lock`, so it is released even if the
//! process dies. Acquisition never blocks: a second run against the same directory fails immediately with
//! [`ProvisionError::RunLocked`].

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::ProvisionError;

/// Held for as long as the run owns the output directory. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Create `root` if needed, then take the lock at `lock_file` inside it.
    pub fn acquire(root: &Path, lock_file: &Path) -> Result<RunLock, ProvisionError> {
        fs::create_dir_all(root).map_err(|err| ProvisionError::io(root, err))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_file)
            .map_err(|err| ProvisionError::io(lock_file, err))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::debug!("acquired run lock {}", lock_file.display());
                Ok(RunLock {
                    file,
                    path: lock_file.to_path_buf(),
                })
            }
            Err(err) if is_contended(&err) => Err(ProvisionError::RunLocked(root.to_path_buf())),
            Err(err) => Err(ProvisionError::io(lock_file, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            log::warn!("failed to release run lock {}: {}", self.path.display(), err);
        } else {
            log::debug!("released run lock {}", self.path.display());
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
