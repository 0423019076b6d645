use std::fs;
use std::path::{Path, PathBuf};

use mpc_provision::cluster_config::ClusterConfig;
use mpc_provision::config::{Endpoints, Layout, ProvisionConfig};
use mpc_provision::errors::ProvisionError;
use mpc_provision::issuer::Issuer;
use mpc_provision::key_custodian::envelope::KdfParams;
use mpc_provision::types::basic::{ClusterSize, Threshold};
use mpc_provision::types::crypto_primitives::Passphrase;
use mpc_provision::workflow::{ProvisionReport, Provisioner};

pub(crate) const EXTERNAL_NATS_URL: &str = "nats://127.0.0.1:14222";
pub(crate) const EXTERNAL_CONSUL_ADDRESS: &str = "127.0.0.1:18500";

// Argon2 parameters cheap enough for tests.
pub(crate) fn cheap_kdf() -> KdfParams {
    KdfParams {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    }
}

pub(crate) fn external_endpoints() -> Endpoints {
    Endpoints::new(EXTERNAL_NATS_URL, EXTERNAL_CONSUL_ADDRESS)
}

pub(crate) fn output_dir(tmp: &Path) -> PathBuf {
    tmp.join("deployment")
}

pub(crate) fn config(output_dir: &Path, nodes: u32, threshold: u32) -> ProvisionConfig {
    ProvisionConfig::builder()
        .node_count(ClusterSize::new(nodes))
        .threshold(Threshold::new(threshold))
        .output_dir(output_dir.to_path_buf())
        .external_endpoints(external_endpoints())
        .kdf_params(cheap_kdf())
        .workers(2)
        .build()
}

pub(crate) fn encrypted_config(
    output_dir: &Path,
    nodes: u32,
    threshold: u32,
    passphrase: &str,
) -> ProvisionConfig {
    ProvisionConfig {
        encrypt: true,
        passphrase: Some(Passphrase::new(passphrase)),
        ..config(output_dir, nodes, threshold)
    }
}

pub(crate) fn run<I: Issuer>(
    issuer: I,
    configuration: ProvisionConfig,
) -> Result<ProvisionReport, ProvisionError> {
    Provisioner::builder()
        .configuration(configuration)
        .issuer(issuer)
        .build()
        .run()
}

pub(crate) fn shared_config(output_dir: &Path) -> ClusterConfig {
    ClusterConfig::load(&Layout::new(output_dir).cluster_config())
        .unwrap()
        .expect("shared configuration exists")
}

/// Names of the files in `dir`, sorted.
pub(crate) fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub(crate) fn identity_documents(dir: &Path) -> Vec<String> {
    file_names(dir)
        .into_iter()
        .filter(|name| name.ends_with(Layout::IDENTITY_SUFFIX))
        .collect()
}
