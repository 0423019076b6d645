use std::collections::HashSet;
use std::fs;

use log::LevelFilter;
use mpc_provision::cluster_config::{
    generate_storage_password, is_well_formed_storage_password, ClusterConfig,
    EVENT_INITIATOR_ALGORITHM,
};
use mpc_provision::config::{Endpoints, Layout, OperationalTunables, ProvisionConfig};
use mpc_provision::errors::ProvisionError;
use mpc_provision::peer_directory::PeerDirectory;
use mpc_provision::types::basic::{ClusterSize, Environment, NodeIndex, PeerId};

mod common;

use crate::common::{
    fake_issuer::FakeIssuer,
    fixtures::{config, external_endpoints},
    logging::setup_logger,
};

#[test]
fn storage_password_test() {
    let passwords: HashSet<String> = (0..64)
        .map(|_| generate_storage_password().to_string())
        .collect();

    assert_eq!(passwords.len(), 64);
    assert!(passwords
        .iter()
        .all(|password| is_well_formed_storage_password(password)));
    assert!(!is_well_formed_storage_password("short"));
    assert!(!is_well_formed_storage_password(&"a+".repeat(16)));
}

#[test]
fn assemble_test() {
    let tmp = tempfile::tempdir().unwrap();
    let configuration = ProvisionConfig {
        environment: Environment::new("staging"),
        ..config(tmp.path(), 5, 3)
    };

    let assembled = ClusterConfig::assemble(&configuration, None);

    // 1. Known fields come from the request; key fields stay empty until the custodians embed them.
    assert_eq!(assembled.mpc_threshold, 3);
    assert_eq!(assembled.environment, "staging");
    assert_eq!(assembled.endpoints(), Endpoints::internal_default());
    assert_ne!(assembled.endpoints(), external_endpoints());
    assert!(is_well_formed_storage_password(&assembled.badger_password));
    assert!(assembled.recorded_initiator().is_none());
    assert!(assembled.recorded_integrity_key().is_none());

    // 2. Tunables are copied verbatim.
    let tunables = OperationalTunables::default();
    assert_eq!(assembled.db_path, tunables.db_path);
    assert_eq!(assembled.backups_dir, tunables.backups_dir);
    assert_eq!(assembled.backup_enabled, tunables.backup_enabled);
    assert_eq!(assembled.backup_period_seconds, tunables.backup_period_seconds);
    assert_eq!(assembled.max_concurrent_keygen, tunables.max_concurrent_keygen);
    assert_eq!(assembled.max_concurrent_signing, tunables.max_concurrent_signing);
    assert_eq!(
        assembled.session_warm_up_delay_ms,
        tunables.session_warm_up_delay_ms
    );

    // 3. A prior configuration contributes only its unknown keys.
    let mut prior = ClusterConfig::assemble(&configuration, None);
    prior.mpc_threshold = 1;
    prior.set_integrity_key(&"ab".repeat(32));
    prior
        .extra
        .insert("chain_code".to_string(), serde_yaml::Value::from("cafe"));
    let reassembled = ClusterConfig::assemble(&configuration, Some(prior.clone()));
    assert_eq!(reassembled.mpc_threshold, 3);
    assert!(reassembled.recorded_integrity_key().is_none());
    assert_eq!(reassembled.extra, prior.extra);
    assert_ne!(reassembled.badger_password, prior.badger_password);
}

#[test]
fn store_load_and_update_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let path = Layout::new(tmp.path()).cluster_config();

    // 1. A missing file is not an error.
    assert!(ClusterConfig::load(&path).unwrap().is_none());

    // 2. Unknown keys written by other tools survive an update.
    fs::write(
        &path,
        "mpc_threshold: 2\nenvironment: production\nchain_code: cafe\nlisten:\n  port: 8080\n",
    )
    .unwrap();
    let updated = ClusterConfig::update(&path, |config| {
        config.set_initiator("aa", "bb");
    })
    .unwrap();
    assert_eq!(updated.mpc_threshold, 2);
    assert_eq!(updated.environment, "production");

    let reloaded = ClusterConfig::load(&path).unwrap().unwrap();
    assert_eq!(reloaded.event_initiator_pubkey, "aa");
    assert_eq!(reloaded.event_initiator.pk_raw, "bb");
    assert_eq!(reloaded.event_initiator.algorithm, EVENT_INITIATOR_ALGORITHM);
    assert_eq!(
        reloaded.extra.get("chain_code"),
        Some(&serde_yaml::Value::from("cafe"))
    );
    assert!(reloaded.extra.contains_key("listen"));
    let yaml = fs::read_to_string(&path).unwrap();
    assert!(yaml.contains("pk_raw: bb"));
    assert!(yaml.contains("port: 8080"));
}

#[test]
fn update_without_configuration_test() {
    let tmp = tempfile::tempdir().unwrap();
    let path = Layout::new(tmp.path()).cluster_config();

    assert!(matches!(
        ClusterConfig::update(&path, |_| ()),
        Err(ProvisionError::Io { .. })
    ));
    assert!(!path.exists());
}

#[test]
fn malformed_configuration_test() {
    let tmp = tempfile::tempdir().unwrap();
    let path = Layout::new(tmp.path()).cluster_config();
    fs::write(&path, "mpc_threshold: [not, a, number\n").unwrap();

    assert!(matches!(
        ClusterConfig::load(&path),
        Err(ProvisionError::MalformedConfig { .. })
    ));
}

#[test]
fn debug_output_is_redacted_test() {
    let mut config = ClusterConfig::default();
    config.badger_password = "hunter2hunter2hunter2hunter2abcd".to_string();
    config.set_initiator("aa", "super-secret-private");
    config.set_integrity_key("another-secret-seed");

    let debug = format!("{:?}", config);
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("super-secret-private"));
    assert!(!debug.contains("another-secret-seed"));
}

#[test]
fn peer_directory_build_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let path = Layout::new(tmp.path()).peers();
    fs::write(&path, r#"{"node0":"stale"}"#).unwrap();

    let directory = PeerDirectory::build(&FakeIssuer::new(), ClusterSize::new(4), &path).unwrap();

    assert_eq!(directory.len(), 4);
    assert_eq!(
        directory.iter().map(|(index, _)| index.int()).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_ne!(directory.get(NodeIndex::new(0)), Some(&PeerId::new("stale")));
    assert_eq!(
        PeerDirectory::load(&path, ClusterSize::new(4)).unwrap(),
        directory
    );
}

#[test]
fn peer_directory_validation_test() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("peers.json");
    let load = |json: &str, size: u32| {
        fs::write(&path, json).unwrap();
        PeerDirectory::load(&path, ClusterSize::new(size))
    };
    let rejected = |result: Result<PeerDirectory, ProvisionError>| {
        matches!(result, Err(ProvisionError::GenerationFailure { .. }))
    };

    assert!(load(r#"{"node0":"a","node1":"b"}"#, 2).is_ok());

    // Missing and surplus entries.
    assert!(rejected(load(r#"{"node0":"a"}"#, 2)));
    assert!(rejected(load(r#"{"node0":"a","node1":"b","node2":"c"}"#, 2)));
    // Indices outside of [0, N).
    assert!(rejected(load(r#"{"node0":"a","node2":"b"}"#, 2)));
    // Names that are not node names, or that alias one.
    assert!(rejected(load(r#"{"node0":"a","peer1":"b"}"#, 2)));
    assert!(rejected(load(r#"{"node0":"a","node01":"b"}"#, 2)));
    // Empty and duplicate identifiers.
    assert!(rejected(load(r#"{"node0":"a","node1":" "}"#, 2)));
    assert!(rejected(load(r#"{"node0":"a","node1":"a"}"#, 2)));
    // Not a JSON object of strings.
    assert!(rejected(load(r#"["a","b"]"#, 2)));
}

#[test]
fn peer_directory_from_entries_test() {
    let directory: PeerDirectory = [
        (NodeIndex::new(1), PeerId::new("b")),
        (NodeIndex::new(0), PeerId::new("a")),
    ]
    .into_iter()
    .collect();

    assert!(directory.check(ClusterSize::new(2)).is_ok());
    assert!(directory.check(ClusterSize::new(3)).is_err());
    assert_eq!(directory.get(NodeIndex::new(1)), Some(&PeerId::new("b")));
}
