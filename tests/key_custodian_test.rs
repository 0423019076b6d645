use std::fs;

use log::LevelFilter;
use mpc_provision::cluster_config::ClusterConfig;
use mpc_provision::config::Layout;
use mpc_provision::errors::ProvisionError;
use mpc_provision::key_custodian::{
    EventInitiatorCustodian, IntegritySignerCustodian, KeyCustodian, KeyState,
};
use mpc_provision::types::basic::KeyKind;

mod common;

use crate::common::{
    fake_issuer::FakeIssuer,
    fixtures::{config, encrypted_config, output_dir, run, shared_config},
    logging::setup_logger,
};

#[test]
fn integrity_seed_generation_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let custodian = IntegritySignerCustodian::new(layout.clone());

    // 1. With nothing persisted, a 64-hex-character seed is generated and persisted.
    assert_eq!(custodian.inspect(), KeyState::Absent);
    let (key, state) = custodian.load_or_generate(None).unwrap();
    assert_eq!(state, KeyState::Generated);
    assert_eq!(key.seed_hex().len(), 64);
    assert!(key.seed_hex().bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(fs::read_to_string(layout.integrity_seed()).unwrap(), key.seed_hex());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(layout.integrity_seed()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // 2. Embedding writes the seed verbatim; reloading against that configuration verifies it.
    let mut recorded = ClusterConfig::default();
    custodian.embed(&key, &mut recorded);
    assert_eq!(recorded.recorded_integrity_key(), Some(key.seed_hex()));

    assert_eq!(custodian.inspect(), KeyState::Present);
    let (reloaded, state) = custodian.load_or_generate(Some(&recorded)).unwrap();
    assert_eq!(state, KeyState::Verified);
    assert_eq!(reloaded.seed_hex(), key.seed_hex());
    assert_eq!(reloaded.public(), key.public());
}

#[test]
fn truncated_integrity_seed_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let custodian = IntegritySignerCustodian::new(layout.clone());

    let (key, _) = custodian.load_or_generate(None).unwrap();
    fs::write(layout.integrity_seed(), &key.seed_hex()[..40]).unwrap();

    assert!(matches!(
        custodian.load_or_generate(None),
        Err(ProvisionError::KeyConsistencyViolation {
            key: KeyKind::IntegritySigner,
            ..
        })
    ));
    // The corrupted seed is left in place for the operator.
    assert_eq!(
        fs::read_to_string(layout.integrity_seed()).unwrap(),
        &key.seed_hex()[..40]
    );
}

#[test]
fn integrity_seed_mismatch_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let custodian = IntegritySignerCustodian::new(layout.clone());
    custodian.load_or_generate(None).unwrap();

    let mut recorded = ClusterConfig::default();
    recorded.set_integrity_key(&hex::encode([1u8; 32]));

    assert!(matches!(
        custodian.load_or_generate(Some(&recorded)),
        Err(ProvisionError::KeyConsistencyViolation {
            key: KeyKind::IntegritySigner,
            ..
        })
    ));
}

#[test]
fn recorded_integrity_seed_without_file_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let custodian = IntegritySignerCustodian::new(layout.clone());

    let old_seed = hex::encode([1u8; 32]);
    let mut recorded = ClusterConfig::default();
    recorded.set_integrity_key(&old_seed);

    // 1. The check reports that a new seed will be generated.
    assert_eq!(custodian.check(Some(&recorded)).unwrap(), KeyState::Absent);
    assert!(!layout.integrity_seed().exists());

    // 2. A fresh seed is generated and persisted in place of the recorded one.
    let (key, state) = custodian.load_or_generate(Some(&recorded)).unwrap();
    assert_eq!(state, KeyState::Generated);
    assert_ne!(key.seed_hex(), old_seed);
    assert_eq!(fs::read_to_string(layout.integrity_seed()).unwrap(), key.seed_hex());
}

#[test]
fn integrity_seed_check_writes_nothing_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let custodian = IntegritySignerCustodian::new(layout.clone());

    assert_eq!(custodian.check(None).unwrap(), KeyState::Absent);
    assert!(!layout.integrity_seed().exists());

    let (key, _) = custodian.load_or_generate(None).unwrap();
    let mut recorded = ClusterConfig::default();
    custodian.embed(&key, &mut recorded);
    assert_eq!(custodian.check(Some(&recorded)).unwrap(), KeyState::Present);

    recorded.set_integrity_key(&hex::encode([2u8; 32]));
    assert!(matches!(
        custodian.check(Some(&recorded)),
        Err(ProvisionError::KeyConsistencyViolation { .. })
    ));
}

#[test]
fn event_initiator_generation_and_reuse_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let configuration = config(tmp.path(), 3, 2);
    let layout = configuration.layout();
    let issuer = FakeIssuer::new();
    let custodian = EventInitiatorCustodian::new(&issuer, &configuration);

    // 1. Generate through the issuer, then persist the private key with owner-only permissions.
    assert_eq!(custodian.inspect(), KeyState::Absent);
    let (key, state) = custodian.load_or_generate(None).unwrap();
    assert_eq!(state, KeyState::Generated);
    assert_eq!(issuer.initiator_calls(), 1);
    assert_eq!(
        fs::read_to_string(layout.initiator_key()).unwrap(),
        *key.keypair.private_hex()
    );
    assert_eq!(key.identity.public_key, key.keypair.public_hex());
    assert!(layout.initiator_identity().exists());
    assert!(!layout.initiator_workdir().exists());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(layout.initiator_key()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // 2. Embedding records both halves; reloading against that configuration verifies and reuses the key.
    let mut recorded = ClusterConfig::default();
    custodian.embed(&key, &mut recorded);
    assert_eq!(recorded.event_initiator_pubkey, key.keypair.public_hex());
    assert_eq!(recorded.event_initiator.pk_raw, *key.keypair.private_hex());

    let (reloaded, state) = custodian.load_or_generate(Some(&recorded)).unwrap();
    assert_eq!(state, KeyState::Verified);
    assert_eq!(reloaded.keypair.public(), key.keypair.public());
    assert_eq!(issuer.initiator_calls(), 1);
}

#[test]
fn event_initiator_recorded_key_mismatch_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let configuration = config(tmp.path(), 3, 2);
    let issuer = FakeIssuer::new();
    let custodian = EventInitiatorCustodian::new(&issuer, &configuration);
    let (key, _) = custodian.load_or_generate(None).unwrap();

    // 1. A stale pk_raw is a violation.
    let mut stale_private = ClusterConfig::default();
    custodian.embed(&key, &mut stale_private);
    stale_private.event_initiator.pk_raw = hex::encode([9u8; 32]);
    assert!(matches!(
        custodian.load_or_generate(Some(&stale_private)),
        Err(ProvisionError::KeyConsistencyViolation {
            key: KeyKind::EventInitiator,
            ..
        })
    ));

    // 2. So is a stale public key.
    let mut stale_public = ClusterConfig::default();
    custodian.embed(&key, &mut stale_public);
    stale_public.event_initiator_pubkey = hex::encode([9u8; 32]);
    assert!(matches!(
        custodian.load_or_generate(Some(&stale_public)),
        Err(ProvisionError::KeyConsistencyViolation { .. })
    ));
}

#[test]
fn event_initiator_artifact_without_record_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = output_dir(tmp.path());
    let layout = Layout::new(&output_dir);

    // Losing the shared configuration keeps the persisted keys: they are re-embedded, not regenerated.
    run(FakeIssuer::new(), config(&output_dir, 3, 2)).unwrap();
    let before = shared_config(&output_dir);
    fs::remove_file(layout.cluster_config()).unwrap();

    let issuer = FakeIssuer::new();
    let report = run(&issuer, config(&output_dir, 3, 2)).unwrap();
    let after = shared_config(&output_dir);

    assert_eq!(report.initiator, KeyState::Verified);
    assert_eq!(report.integrity, KeyState::Verified);
    assert_eq!(issuer.initiator_calls(), 0);
    assert_eq!(before.event_initiator.pk_raw, after.event_initiator.pk_raw);
    assert_eq!(
        before.integrity.signer.ed25519.private_key,
        after.integrity.signer.ed25519.private_key
    );
}

#[test]
fn event_initiator_record_without_artifact_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = output_dir(tmp.path());
    let layout = Layout::new(&output_dir);

    run(FakeIssuer::new(), config(&output_dir, 3, 2)).unwrap();
    fs::remove_file(layout.initiator_key()).unwrap();

    let issuer = FakeIssuer::new();
    let result = run(&issuer, config(&output_dir, 3, 2));

    assert!(matches!(
        result,
        Err(ProvisionError::KeyConsistencyViolation {
            key: KeyKind::EventInitiator,
            ..
        })
    ));
    assert_eq!(issuer.initiator_calls(), 0);
}

#[test]
fn encrypted_event_initiator_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = output_dir(tmp.path());
    let layout = Layout::new(&output_dir);

    // 1. With encryption enabled only the sealed artifact is written.
    let report = run(
        FakeIssuer::new(),
        encrypted_config(&output_dir, 3, 2, "correct horse"),
    )
    .unwrap();
    assert_eq!(report.initiator, KeyState::Generated);
    assert!(layout.sealed_initiator_key().exists());
    assert!(!layout.initiator_key().exists());
    let sealed = fs::read(layout.sealed_initiator_key()).unwrap();
    assert!(sealed.starts_with(b"MPCE"));
    let recorded = shared_config(&output_dir);
    assert!(!sealed
        .windows(recorded.event_initiator.pk_raw.len())
        .any(|window| window == recorded.event_initiator.pk_raw.as_bytes()));

    // 2. The right passphrase opens and verifies the sealed key.
    let report = run(
        FakeIssuer::new(),
        encrypted_config(&output_dir, 3, 2, "correct horse"),
    )
    .unwrap();
    assert_eq!(report.initiator, KeyState::Verified);
    assert_eq!(
        shared_config(&output_dir).event_initiator.pk_raw,
        recorded.event_initiator.pk_raw
    );

    // 3. A wrong passphrase is an input error, not a consistency violation.
    let result = run(
        FakeIssuer::new(),
        encrypted_config(&output_dir, 3, 2, "battery staple"),
    );
    assert!(matches!(result, Err(ProvisionError::ValidationFailure(_))));

    // 4. Without a passphrase the run is rejected before anything is touched.
    let result = run(FakeIssuer::new(), config(&output_dir, 3, 2));
    assert!(matches!(result, Err(ProvisionError::ValidationFailure(_))));
}

#[test]
fn both_initiator_artifacts_present_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = output_dir(tmp.path());
    let layout = Layout::new(&output_dir);

    run(
        FakeIssuer::new(),
        encrypted_config(&output_dir, 3, 2, "correct horse"),
    )
    .unwrap();
    fs::write(layout.initiator_key(), hex::encode([3u8; 32])).unwrap();

    let result = run(
        FakeIssuer::new(),
        encrypted_config(&output_dir, 3, 2, "correct horse"),
    );
    assert!(matches!(
        result,
        Err(ProvisionError::KeyConsistencyViolation { .. })
    ));
}

#[test]
fn event_initiator_check_test() {
    setup_logger(LevelFilter::Debug);
    let tmp = tempfile::tempdir().unwrap();
    let sealed_with = encrypted_config(tmp.path(), 3, 2, "correct horse");
    let issuer = FakeIssuer::new();
    let layout = sealed_with.layout();

    // 1. Nothing persisted: the key will be generated, and checking it generates nothing.
    let custodian = EventInitiatorCustodian::new(&issuer, &sealed_with);
    assert_eq!(custodian.check(None).unwrap(), KeyState::Absent);
    assert_eq!(issuer.initiator_calls(), 0);
    assert!(!layout.sealed_initiator_key().exists());

    // 2. A sealed key opens with the right passphrase and matches its record.
    let (key, _) = custodian.load_or_generate(None).unwrap();
    let mut recorded = ClusterConfig::default();
    custodian.embed(&key, &mut recorded);
    assert_eq!(custodian.check(Some(&recorded)).unwrap(), KeyState::Present);

    // 3. The wrong passphrase is caught by the check alone.
    let wrong = encrypted_config(tmp.path(), 3, 2, "battery staple");
    let sealed_before = fs::read(layout.sealed_initiator_key()).unwrap();
    assert!(matches!(
        EventInitiatorCustodian::new(&issuer, &wrong).check(Some(&recorded)),
        Err(ProvisionError::ValidationFailure(_))
    ));
    assert_eq!(fs::read(layout.sealed_initiator_key()).unwrap(), sealed_before);
    assert_eq!(issuer.initiator_calls(), 1);
}
