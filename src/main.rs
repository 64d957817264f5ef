//! Consul ACL operator entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use consul_acl_operator::config::{ConfigOverrides, OperatorConfig};
use consul_acl_operator::consul::{AclClient, ConsulClient};
use consul_acl_operator::controller::build_controllers;
use consul_acl_operator::crd::{all_crds, crds_yaml};
use consul_acl_operator::health::{serve_health, Readiness};
use consul_acl_operator::leader_election::{replica_identity, LeaderElector, LEADER_LEASE_NAME};
use consul_acl_operator::retry::{retry_with_backoff, RetryPolicy};
use consul_acl_operator::telemetry::init_logging;
use consul_acl_operator::FIELD_MANAGER;

/// Consul ACL operator - syncs ACL roles, auth methods and binding rules
#[derive(Parser, Debug)]
#[command(name = "consul-acl-operator", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML or JSON configuration file
    #[arg(long, env = "ACL_OPERATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Consul HTTP API address
    #[arg(long, env = "CONSUL_HTTP_ADDR")]
    consul_address: Option<String>,

    /// Consul ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    consul_token: Option<String>,

    /// Consul datacenter
    #[arg(long, env = "CONSUL_DATACENTER")]
    consul_datacenter: Option<String>,

    /// Requeue interval for healthy resources, in seconds
    #[arg(long, env = "ACL_OPERATOR_SYNC_PERIOD")]
    sync_period: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "ACL_OPERATOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Only watch resources in this namespace
    #[arg(long)]
    watch_namespace: Option<String>,

    /// Run controllers only while holding the leader Lease
    #[arg(long, env = "ACL_OPERATOR_LEADER_ELECT")]
    leader_elect: bool,

    /// Address for the /healthz and /readyz endpoints
    #[arg(long, env = "ACL_OPERATOR_HEALTH_PROBE_ADDR")]
    health_probe_bind_address: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    Controller,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            consul_address: self.consul_address.clone(),
            consul_token: self.consul_token.clone(),
            consul_datacenter: self.consul_datacenter.clone(),
            sync_period_secs: self.sync_period,
            log_level: self.log_level.clone(),
            watch_namespace: self.watch_namespace.clone(),
            leader_election: self.leader_elect.then_some(true),
            health_probe_bind_address: self.health_probe_bind_address.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             TLS connections to Kubernetes and Consul cannot be made.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        print!("{}", crds_yaml()?);
        return Ok(());
    }

    let mut config = OperatorConfig::load(cli.config.as_deref())?;
    config.apply_overrides(cli.overrides());
    config.validate()?;

    init_logging(&config.operator.log_level, config.operator.log_format)?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(Arc::new(config)).await,
    }
}

/// Install or update the operator's CRDs with server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All ACL CRDs installed/updated");
    Ok(())
}

async fn run_controller(config: Arc<OperatorConfig>) -> anyhow::Result<()> {
    tracing::info!(
        consul = %config.consul.address,
        datacenter = config.consul.datacenter.as_deref().unwrap_or("default"),
        sync_period_secs = config.operator.sync_period_secs,
        leader_election = config.operator.leader_election,
        "Consul ACL operator starting"
    );

    let readiness = Readiness::default();
    if let Some(addr) = config.health_probe_addr() {
        tokio::spawn(serve_health(addr, readiness.clone()));
    }

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRDs on startup; the API server may still be coming up
    retry_with_backoff(&RetryPolicy::attempts(10), "install_crds", || {
        ensure_crds_installed(&client)
    })
    .await?;

    let acl: Arc<dyn AclClient> = Arc::new(
        ConsulClient::new(&config.consul)
            .map_err(|e| anyhow::anyhow!("Failed to create Consul client: {}", e))?,
    );

    if !config.operator.leader_election {
        readiness.set_ready(true);
        run_controllers(client, acl, config).await;
        return Ok(());
    }

    let elector = Arc::new(LeaderElector::new(
        client.clone(),
        LEADER_LEASE_NAME,
        &config.leader_election_namespace(),
        &replica_identity(),
    ));
    let mut guard = elector.acquire().await;
    readiness.set_ready(true);

    let leadership_lost = tokio::select! {
        _ = run_controllers(client, acl, config) => false,
        _ = guard.lost() => true,
    };
    readiness.set_ready(false);

    if leadership_lost {
        // Another replica may already be reconciling; stop rather than race it
        return Err(anyhow::anyhow!("Leadership lost, exiting"));
    }
    if let Err(e) = guard.release_leadership().await {
        tracing::warn!(error = %e, "Failed to release leader lease");
    }
    Ok(())
}

async fn run_controllers(client: Client, acl: Arc<dyn AclClient>, config: Arc<OperatorConfig>) {
    tracing::info!("Starting controllers:");
    let controllers = build_controllers(client, acl, config);
    futures::future::join_all(controllers).await;
    tracing::info!("Consul ACL operator shutting down");
}
