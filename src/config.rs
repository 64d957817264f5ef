//! Operator configuration
//!
//! Loaded once at startup from an optional YAML (or JSON) file, overlaid
//! with command line flags and environment variables, validated, and then
//! shared read-only through the controller context.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::LogFormat;
use crate::Error;

/// Root operator configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Consul connection
    pub consul: ConsulConfig,
    /// Reconciliation behaviour
    pub operator: OperatorSettings,
}

/// How to reach the Consul HTTP API
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsulConfig {
    /// Base URL, e.g. `http://consul-server.consul:8500`
    pub address: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    /// Datacenter passed as `?dc=`
    pub datacenter: Option<String>,
    /// Consul Enterprise namespace passed as `?ns=`
    pub namespace: Option<String>,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Skip TLS certificate verification
    pub insecure_skip_verify: bool,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            token: None,
            datacenter: None,
            namespace: None,
            request_timeout_secs: 10,
            insecure_skip_verify: false,
        }
    }
}

/// Reconciliation settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorSettings {
    /// Requeue interval for healthy resources
    pub sync_period_secs: u64,
    /// Deadline for a single reconciliation pass
    pub reconcile_timeout_secs: u64,
    /// First backoff delay after a transient failure
    pub error_backoff_base_secs: u64,
    /// Upper bound on the backoff delay
    pub error_backoff_max_secs: u64,
    /// Only watch this namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,
    /// Run controllers only on the replica holding the leader Lease
    pub leader_election: bool,
    /// Namespace of the leader Lease; `POD_NAMESPACE`, then `default`, when unset
    pub leader_election_namespace: Option<String>,
    /// Address of the `/healthz` and `/readyz` server; disabled when unset
    pub health_probe_bind_address: Option<String>,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            sync_period_secs: 300,
            reconcile_timeout_secs: 60,
            error_backoff_base_secs: 5,
            error_backoff_max_secs: 300,
            watch_namespace: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            leader_election: false,
            leader_election_namespace: None,
            health_probe_bind_address: Some("0.0.0.0:8081".to_string()),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// `CONSUL_HTTP_ADDR`
    pub consul_address: Option<String>,
    /// `CONSUL_HTTP_TOKEN`
    pub consul_token: Option<String>,
    /// `CONSUL_DATACENTER`
    pub consul_datacenter: Option<String>,
    /// `ACL_OPERATOR_SYNC_PERIOD`
    pub sync_period_secs: Option<u64>,
    /// `ACL_OPERATOR_LOG_LEVEL`
    pub log_level: Option<String>,
    /// `--watch-namespace`
    pub watch_namespace: Option<String>,
    /// `ACL_OPERATOR_LEADER_ELECT`
    pub leader_election: Option<bool>,
    /// `ACL_OPERATOR_HEALTH_PROBE_ADDR`
    pub health_probe_bind_address: Option<String>,
}

impl OperatorConfig {
    /// Load configuration from a file; defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML; JSON is accepted as well
    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))
    }

    /// Apply command line and environment overrides
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(address) = overrides.consul_address {
            self.consul.address = address;
        }
        if let Some(token) = overrides.consul_token {
            self.consul.token = Some(token);
        }
        if let Some(dc) = overrides.consul_datacenter {
            self.consul.datacenter = Some(dc);
        }
        if let Some(period) = overrides.sync_period_secs {
            self.operator.sync_period_secs = period;
        }
        if let Some(level) = overrides.log_level {
            self.operator.log_level = level;
        }
        if let Some(ns) = overrides.watch_namespace {
            self.operator.watch_namespace = Some(ns);
        }
        if let Some(enabled) = overrides.leader_election {
            self.operator.leader_election = enabled;
        }
        if let Some(addr) = overrides.health_probe_bind_address {
            self.operator.health_probe_bind_address = Some(addr);
        }
    }

    /// Reject configurations the operator cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let address = self.consul.address.trim();
        if address.is_empty() {
            return Err(Error::config("consul.address must not be empty"));
        }
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(Error::config(format!(
                "consul.address '{address}' must start with http:// or https://"
            )));
        }
        if self.consul.request_timeout_secs == 0 {
            return Err(Error::config("consul.requestTimeoutSecs must be positive"));
        }

        let op = &self.operator;
        if op.sync_period_secs == 0 {
            return Err(Error::config("operator.syncPeriodSecs must be positive"));
        }
        if op.reconcile_timeout_secs == 0 {
            return Err(Error::config("operator.reconcileTimeoutSecs must be positive"));
        }
        if op.error_backoff_base_secs == 0 || op.error_backoff_max_secs < op.error_backoff_base_secs {
            return Err(Error::config(
                "operator.errorBackoffBaseSecs must be positive and not exceed errorBackoffMaxSecs",
            ));
        }
        if op.log_level.trim().is_empty() {
            return Err(Error::config("operator.logLevel must not be empty"));
        }
        if op
            .leader_election_namespace
            .as_deref()
            .is_some_and(|ns| ns.trim().is_empty())
        {
            return Err(Error::config("operator.leaderElectionNamespace must not be empty"));
        }
        if let Some(addr) = &op.health_probe_bind_address {
            addr.parse::<SocketAddr>().map_err(|e| {
                Error::config(format!(
                    "operator.healthProbeBindAddress '{addr}' is not a socket address: {e}"
                ))
            })?;
        }
        Ok(())
    }

    /// Where to serve health probes, if anywhere
    pub fn health_probe_addr(&self) -> Option<SocketAddr> {
        self.operator
            .health_probe_bind_address
            .as_deref()
            .and_then(|addr| addr.parse().ok())
    }

    /// Namespace holding the leader Lease
    pub fn leader_election_namespace(&self) -> String {
        self.operator
            .leader_election_namespace
            .clone()
            .or_else(|| std::env::var("POD_NAMESPACE").ok())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Requeue interval for healthy resources
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.operator.sync_period_secs)
    }

    /// Deadline for a single reconciliation pass
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.operator.reconcile_timeout_secs)
    }

    /// Backoff bounds for transient failures
    pub fn backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.operator.error_backoff_base_secs),
            Duration::from_secs(self.operator.error_backoff_max_secs),
        )
    }
}
