/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An [`Issuer`] that drives the cluster's command-line tool (e.g. `mpcium-cli`) as child processes.
//!
//! Every invocation is bounded by a timeout. When the timeout expires the child is killed and
//! [`IssuerError::TimedOut`] is returned.
//!
//! `generate-identity --encrypt` prompts the operator for a passphrase. Such interactive invocations get the
//! terminal (stdin, stdout and stderr are inherited) and run one at a time, even when the workflow issues
//! identities on several workers. Every other invocation runs with its output captured.
//!
//! | Operation | Invocation |
//! |---|---|
//! | `generate_peers` | `generate-peers --number <N> --output <file>` |
//! | `generate_identity` | `generate-identity --node <name> --output-dir <dir> [--encrypt]` |
//! | `generate_initiator` | `generate-initiator --output-dir <dir>` |
//! | `register_peers` | `register-peers --input <peers> --config <config>` |

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{InitiatorArtifacts, Issuer, IssuerError};
use crate::config::identity_file_name;
use crate::types::basic::{ClusterSize, Node};

/// How often a running child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// File names written by `generate-initiator`.
pub const INITIATOR_KEY_FILE: &str = "event_initiator.key";
pub const INITIATOR_IDENTITY_FILE: &str = "event_initiator.identity.json";

#[derive(Clone, Debug)]
pub struct ProcessIssuer {
    program: PathBuf,
    timeout: Duration,
    // Held for the whole of an interactive invocation. Shared by clones.
    terminal: Arc<Mutex<()>>,
}

impl ProcessIssuer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            terminal: Arc::new(Mutex::new(())),
        }
    }

    /// Run `program args...`, wait at most `self.timeout`, and fail on a non-zero exit status.
    ///
    /// `interactive` invocations are handed the terminal so that the tool can prompt the operator (e.g. for an
    /// encryption passphrase), and are serialized with each other. Their output is not captured.
    fn run(
        &self,
        operation: &'static str,
        args: &[&str],
        interactive: bool,
    ) -> Result<(), IssuerError> {
        // The guarded value is `()`, so a poisoned lock is still usable.
        let _terminal = interactive.then(|| {
            self.terminal
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        });
        log::debug!("running {} {}", self.program.display(), args.join(" "));

        let (stdin, stdout, stderr) = if interactive {
            (Stdio::inherit(), Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::piped(), Stdio::piped())
        };
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| IssuerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // Drain captured pipes on their own threads so that a chatty child never blocks on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_timeout(&mut child, self.timeout).map_err(|reason| IssuerError::Other {
            operation,
            reason,
        })?;
        let Some(status) = status else {
            // Grandchildren may still hold the pipes open, so the drain threads are left detached.
            return Err(IssuerError::TimedOut {
                operation,
                timeout: self.timeout,
            });
        };
        let stdout = join_drain(stdout);
        let stderr = join_drain(stderr);

        match status {
            status if status.success() => {
                if !stdout.trim().is_empty() {
                    log::debug!("{}: {}", operation, stdout.trim());
                }
                Ok(())
            }
            status => Err(IssuerError::Failed {
                operation,
                status,
                stderr: if interactive {
                    "see the terminal output".to_string()
                } else {
                    stderr.trim().to_string()
                },
            }),
        }
    }
}

impl Issuer for ProcessIssuer {
    fn generate_peers(&self, size: ClusterSize, output: &Path) -> Result<(), IssuerError> {
        let number = size.to_string();
        let output_str = output.to_string_lossy();
        self.run(
            "generate-peers",
            &["generate-peers", "--number", number.as_str(), "--output", &*output_str],
            false,
        )?;
        expect_output("generate-peers", output)
    }

    fn generate_identity(
        &self,
        node: &Node,
        encrypt: bool,
        output_dir: &Path,
    ) -> Result<PathBuf, IssuerError> {
        let output_dir_str = output_dir.to_string_lossy();
        let mut args = vec![
            "generate-identity",
            "--node",
            node.name(),
            "--output-dir",
            &*output_dir_str,
        ];
        if encrypt {
            args.push("--encrypt");
        }
        self.run("generate-identity", &args, encrypt)?;

        let document = output_dir.join(identity_file_name(node));
        expect_output("generate-identity", &document)?;
        Ok(document)
    }

    fn generate_initiator(&self, output_dir: &Path) -> Result<InitiatorArtifacts, IssuerError> {
        let output_dir_str = output_dir.to_string_lossy();
        self.run(
            "generate-initiator",
            &["generate-initiator", "--output-dir", &*output_dir_str],
            false,
        )?;

        let artifacts = InitiatorArtifacts {
            private_key: output_dir.join(INITIATOR_KEY_FILE),
            identity_document: output_dir.join(INITIATOR_IDENTITY_FILE),
        };
        expect_output("generate-initiator", &artifacts.private_key)?;
        expect_output("generate-initiator", &artifacts.identity_document)?;
        Ok(artifacts)
    }

    fn register_peers(&self, peers: &Path, config: &Path) -> Result<(), IssuerError> {
        let peers_str = peers.to_string_lossy();
        let config_str = config.to_string_lossy();
        self.run(
            "register-peers",
            &["register-peers", "--input", &*peers_str, "--config", &*config_str],
            false,
        )
    }
}

fn expect_output(operation: &'static str, path: &Path) -> Result<(), IssuerError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IssuerError::MissingOutput {
            operation,
            path: path.to_path_buf(),
        })
    }
}

/// Poll `child` until it exits or `timeout` elapses. Returns `Ok(None)` if the child was killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, String> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => {
                if let Err(err) = child.kill() {
                    log::warn!("failed to kill timed out child {}: {}", child.id(), err);
                }
                // Reap the child so that it does not linger as a zombie.
                let _ = child.wait();
                return Ok(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Err(format!("failed to wait for child: {}", err)),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
