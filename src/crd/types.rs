//! Shared types for the ACL custom resources

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Longest name Consul accepts for roles and auth methods
pub const MAX_EXTERNAL_NAME_LEN: usize = 256;

/// Name of the Consul object managed for `namespace/name`
///
/// Kubernetes names cannot contain `_`, so the result is unique per object.
pub fn external_name(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}")
}

/// Check that a computed external name is acceptable to Consul
///
/// Consul restricts role and auth method names to ASCII letters, digits,
/// `-` and `_`. Kubernetes allows `.` in object names, which Consul rejects.
pub fn validate_external_name(name: &str) -> Result<(), crate::Error> {
    if name.is_empty() || name.len() > MAX_EXTERNAL_NAME_LEN {
        return Err(crate::Error::validation(format!(
            "consul name '{name}' must be 1-{MAX_EXTERNAL_NAME_LEN} characters"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(crate::Error::validation(format!(
            "consul name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}

/// Parse a Go `time.Duration` string such as `1h30m` or `90s`
///
/// Consul reports TTLs in this format and normalizes what it is given
/// (`60m` comes back as `1h0m0s`), so comparisons go through this parser.
pub fn parse_go_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit: f64 = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
        let nanos = (value * nanos_per_unit).round();
        if !nanos.is_finite() || nanos > u64::MAX as f64 {
            return None;
        }
        total_nanos = total_nanos.checked_add(nanos as u128)?;
    }

    u64::try_from(total_nanos).ok().map(Duration::from_nanos)
}

/// Health of the Consul object relative to the resource spec
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HealthStatus {
    /// Consul object exists and matches the resource spec
    Healthy,
    /// Consul object exists but differs from the resource spec
    Progressing,
    /// No Consul object exists for the computed name
    Missing,
    /// The last sync attempt failed permanently
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Progressing => write!(f, "Progressing"),
            Self::Missing => write!(f, "Missing"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Status shared by all ACL resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AclStatus {
    /// Consul identifier, empty until the object has been created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Last observed health
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,

    /// Error detail for Degraded resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the resource this status describes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the health was evaluated (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
}

impl AclStatus {
    /// Create a new status with the given health
    pub fn with_health(health: HealthStatus) -> Self {
        Self {
            health: Some(health),
            ..Default::default()
        }
    }

    /// Set the Consul identifier and return self for chaining
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Stamp the sync time with the current time
    pub fn synced_now(mut self) -> Self {
        self.last_sync_time = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// Compare everything except the sync timestamp
    pub fn same_state(&self, other: &AclStatus) -> bool {
        self.id == other.id
            && self.health == other.health
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}
