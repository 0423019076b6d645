/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! `mpc-provision`: provision the credentials and peer set of a threshold-signing cluster.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use mpc_provision::config::{
    Endpoints, ProvisionConfig, DEFAULT_EXTERNAL_CONSUL_ADDRESS, DEFAULT_EXTERNAL_NATS_URL,
    DEFAULT_INTERNAL_CONSUL_ADDRESS, DEFAULT_INTERNAL_NATS_URL,
};
use mpc_provision::issuer::process::ProcessIssuer;
use mpc_provision::types::basic::{ClusterSize, Environment, Threshold};
use mpc_provision::types::crypto_primitives::Passphrase;
use mpc_provision::workflow::Provisioner;

#[derive(Parser, Debug)]
#[command(name = "mpc-provision")]
#[command(about = "Provision node identities, keys, and the peer set of a threshold-signing cluster", long_about = None)]
struct Cli {
    /// Number of nodes in the cluster
    #[arg(short, long, default_value_t = 3)]
    nodes: u32,

    /// Signing threshold; must be smaller than the number of nodes
    #[arg(short, long, default_value_t = 2)]
    threshold: u32,

    /// Environment tag written into the shared configuration
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Encrypt private artifacts at rest
    #[arg(long)]
    encrypt: bool,

    /// Name of the environment variable holding the encryption passphrase
    #[arg(long, default_value = "MPC_PROVISION_PASSPHRASE")]
    passphrase_env: String,

    /// NATS URL as seen from inside the cluster
    #[arg(long, default_value = DEFAULT_INTERNAL_NATS_URL)]
    nats_url: String,

    /// Consul address as seen from inside the cluster
    #[arg(long, default_value = DEFAULT_INTERNAL_CONSUL_ADDRESS)]
    consul_address: String,

    /// NATS URL reachable from this host, used during registration
    #[arg(long, default_value = DEFAULT_EXTERNAL_NATS_URL)]
    external_nats_url: String,

    /// Consul address reachable from this host, used during registration
    #[arg(long, default_value = DEFAULT_EXTERNAL_CONSUL_ADDRESS)]
    external_consul_address: String,

    /// Directory all artifacts are written under
    #[arg(short, long, default_value = "./deployment")]
    output_dir: PathBuf,

    /// Identity and peer issuing tool
    #[arg(long, default_value = "mpcium-cli")]
    issuer_bin: PathBuf,

    /// Timeout of every issuer invocation, in seconds
    #[arg(long, default_value_t = 120)]
    issuer_timeout_secs: u64,

    /// Maximum number of worker threads for per-node stages
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Do not register the peer directory with the cluster
    #[arg(long)]
    skip_registration: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_logger(cli.log_level) {
        eprintln!("failed to set up logging: {}", err);
        return ExitCode::FAILURE;
    }

    let passphrase = std::env::var(&cli.passphrase_env)
        .ok()
        .filter(|passphrase| !passphrase.is_empty())
        .map(Passphrase::new);

    let configuration = ProvisionConfig::builder()
        .node_count(ClusterSize::new(cli.nodes))
        .threshold(Threshold::new(cli.threshold))
        .output_dir(cli.output_dir)
        .environment(Environment::new(cli.environment))
        .encrypt(cli.encrypt)
        .internal_endpoints(Endpoints::new(cli.nats_url, cli.consul_address))
        .external_endpoints(Endpoints::new(
            cli.external_nats_url,
            cli.external_consul_address,
        ))
        .workers(cli.workers)
        .register(!cli.skip_registration)
        .build();
    let configuration = ProvisionConfig {
        passphrase,
        ..configuration
    };

    let issuer = ProcessIssuer::new(cli.issuer_bin, Duration::from_secs(cli.issuer_timeout_secs));

    match Provisioner::builder()
        .configuration(configuration)
        .issuer(issuer)
        .build()
        .run()
    {
        Ok(report) => {
            log::info!(
                "provisioned {} nodes (event-initiator key {}, integrity-signer key {})",
                report.node_roots.len(),
                report.initiator,
                report.integrity
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn setup_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
}
