//! Semantic configuration inputs (`spec.md` §6). Loading these from a file,
//! environment variables, or flags is the bin crate's job — this module only
//! defines the validated shape and the handful of defaults the spec commits
//! to (poll interval, reconcile interval, election prefix, lease TTL, ...).

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_poll_interval() -> u64 {
    3
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_region() -> String {
    "default".to_string()
}

fn default_meta_prefix() -> String {
    "/hermes/meta".to_string()
}

fn default_election_prefix() -> String {
    "/hermes/election".to_string()
}

fn default_lease_ttl() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// Control-plane HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Base URL of the control plane, e.g. `https://control.example.com`.
    pub url: String,
    /// Seconds between short-poll change-stream ticks. Default 3.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds between full reconcile passes. Default 60.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Region header value sent on every outbound request. Default `"default"`.
    #[serde(default = "default_region")]
    pub region: String,
}

impl ControlPlaneConfig {
    /// Poll cadence as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reconcile cadence as a [`Duration`].
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// etcd (KV store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    /// Cluster member endpoints, e.g. `["http://127.0.0.1:2379"]`.
    pub endpoints: Vec<String>,
    /// Optional username for etcd auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for etcd auth.
    #[serde(default)]
    pub password: Option<String>,
    /// Prefix under which domain objects are stored.
    pub domain_prefix: String,
    /// Prefix under which cluster objects are stored.
    pub cluster_prefix: String,
    /// Prefix under which gateways self-register as instances.
    pub instance_prefix: String,
    /// Prefix under which controller metadata (`config_revision`) is stored.
    /// Default `"/hermes/meta"`.
    #[serde(default = "default_meta_prefix")]
    pub meta_prefix: String,
}

impl EtcdConfig {
    /// Key under `meta_prefix` that holds the last observed control-plane revision.
    pub fn config_revision_key(&self) -> String {
        format!("{}/config_revision", self.meta_prefix.trim_end_matches('/'))
    }
}

/// HMAC request-signing settings. Signing is only enabled when both fields are set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Access key used as the `Credential` in the `Authorization` header.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Secret key used as the HMAC key. Never logged.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl AuthConfig {
    /// Whether request signing is enabled, i.e. both `access_key` and `secret_key` are set.
    pub fn is_enabled(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

/// Leader-election settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Whether leader election is active. When `false` this process becomes
    /// leader unconditionally.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// KV prefix under which the election session is held. Default `/hermes/election`.
    #[serde(default = "default_election_prefix")]
    pub prefix: String,
    /// Session TTL in seconds. Default 15.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

impl ElectionConfig {
    /// Session TTL as a [`Duration`].
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            prefix: default_election_prefix(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

/// Top-level validated configuration for the controller process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control-plane HTTP settings.
    pub control_plane: ControlPlaneConfig,
    /// etcd KV store settings.
    pub etcd: EtcdConfig,
    /// Request-signing settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Leader-election settings.
    #[serde(default)]
    pub election: ElectionConfig,
}
