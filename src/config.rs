use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::types::ConfigError;

/// One configured Syncthing daemon endpoint. Identity is the name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
}

impl Instance {
    /// Classifies the instance by the hostname of its base URL.
    /// URLs that fail to parse are treated as remote.
    pub fn host_class(&self) -> HostClass {
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) => url.host_str().map(classify_host).unwrap_or(HostClass::Remote),
            Err(_) => HostClass::Remote,
        }
    }
}

/// Network class of a daemon host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    Loopback,
    Private,
    Remote,
}

pub fn classify_host(hostname: &str) -> HostClass {
    if hostname == "localhost" || hostname == "127.0.0.1" {
        return HostClass::Loopback;
    }
    if hostname.starts_with("192.168.") || hostname.starts_with("10.") {
        return HostClass::Private;
    }
    if let Some(rest) = hostname.strip_prefix("172.") {
        let second = rest.split('.').next().and_then(|s| s.parse::<u8>().ok());
        if matches!(second, Some(16..=31)) {
            return HostClass::Private;
        }
    }
    HostClass::Remote
}

/// Immutable host filter applied to one aggregation query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostFilter {
    #[default]
    All,
    /// Loopback and private-network hosts.
    Local,
    Remote,
    Loopback,
}

impl HostFilter {
    pub fn matches(self, class: HostClass) -> bool {
        match self {
            HostFilter::All => true,
            HostFilter::Local => matches!(class, HostClass::Loopback | HostClass::Private),
            HostFilter::Remote => class == HostClass::Remote,
            HostFilter::Loopback => class == HostClass::Loopback,
        }
    }
}

/// The configured list of daemon endpoints, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Vec<Instance>,
}

impl InstanceRegistry {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }

    /// Load the registry, in priority order: the `SYNC_INSTANCES` environment
    /// variable (JSON array), `config/instances.json`, then
    /// `config/instances.example.json`. Falls back to an empty registry.
    pub async fn load() -> Self {
        match Self::try_load().await {
            Ok(registry) => {
                info!(count = registry.len(), "Loaded instance registry");
                registry
            }
            Err(err) => {
                warn!(error = ?err, "Failed to load instance registry, starting empty");
                Self::default()
            }
        }
    }

    async fn try_load() -> Result<Self, ConfigError> {
        if let Ok(raw) = env::var("SYNC_INSTANCES") {
            if !raw.trim().is_empty() {
                match parse_instances(&raw) {
                    Ok(instances) => return Ok(Self::new(instances)),
                    Err(err) => {
                        warn!(error = ?err, "SYNC_INSTANCES is not valid JSON, falling back to files");
                    }
                }
            }
        }

        for path in ["config/instances.json", "config/instances.example.json"] {
            if Path::new(path).exists() {
                let contents = fs::read_to_string(path).await?;
                return parse_instances(&contents).map(Self::new);
            }
        }

        Ok(Self::default())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Instances matching the filter, preserving registry order.
    pub fn filtered(&self, filter: HostFilter) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|i| filter.matches(i.host_class()))
            .cloned()
            .collect()
    }
}

fn parse_instances(raw: &str) -> Result<Vec<Instance>, ConfigError> {
    serde_json::from_str(raw).map_err(|err| ConfigError::Registry(err.to_string()))
}

/// Server settings taken from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub batch_deadline: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            batch_deadline: Duration::from_secs(10),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        match format!("{host}:{port}").parse() {
            Ok(addr) => settings.bind = addr,
            Err(err) => warn!(error = ?err, %host, port, "Invalid bind address, using default"),
        }
        if let Some(ms) = env::var("SYNC_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            settings.batch_deadline = Duration::from_millis(ms);
        }
        settings
    }
}
