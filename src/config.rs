use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::domain::order::{Permissive, TransitionPolicy, TransitionTable};

// ============================================================================
// Application Configuration
// ============================================================================
//
// Read once from the environment at startup. Every key has a default so a
// local ScyllaDB on the standard port works with no configuration.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicyKind {
    Permissive,
    ForwardOnly,
}

impl StatusPolicyKind {
    pub fn build(self) -> Arc<dyn TransitionPolicy> {
        match self {
            StatusPolicyKind::Permissive => Arc::new(Permissive),
            StatusPolicyKind::ForwardOnly => Arc::new(TransitionTable::forward_only()),
        }
    }
}

impl FromStr for StatusPolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(StatusPolicyKind::Permissive),
            "forward-only" | "forward_only" => Ok(StatusPolicyKind::ForwardOnly),
            other => bail!("unknown status policy '{}' (expected permissive or forward-only)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scylla_nodes: Vec<String>,
    pub keyspace: String,
    pub metrics_port: u16,
    pub store_timeout: Duration,
    pub status_policy: StatusPolicyKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scylla_nodes: vec!["127.0.0.1:9042".to_string()],
            keyspace: "storefront_ks".to_string(),
            metrics_port: 9090,
            store_timeout: Duration::from_millis(2000),
            status_policy: StatusPolicyKind::Permissive,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(nodes) = lookup("SCYLLA_NODES") {
            let nodes: Vec<String> = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            if nodes.is_empty() {
                bail!("SCYLLA_NODES must list at least one host:port");
            }
            config.scylla_nodes = nodes;
        }

        if let Some(keyspace) = lookup("SCYLLA_KEYSPACE") {
            let valid = !keyspace.is_empty()
                && keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                bail!("SCYLLA_KEYSPACE '{}' is not a valid keyspace name", keyspace);
            }
            config.keyspace = keyspace;
        }

        if let Some(port) = lookup("METRICS_PORT") {
            config.metrics_port = port
                .trim()
                .parse()
                .with_context(|| format!("METRICS_PORT '{}' is not a port number", port))?;
        }

        if let Some(ms) = lookup("STORE_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .with_context(|| format!("STORE_TIMEOUT_MS '{}' is not a number", ms))?;
            if ms == 0 {
                bail!("STORE_TIMEOUT_MS must be greater than zero");
            }
            config.store_timeout = Duration::from_millis(ms);
        }

        if let Some(policy) = lookup("ORDER_STATUS_POLICY") {
            config.status_policy = policy.parse()?;
        }

        Ok(config)
    }
}
