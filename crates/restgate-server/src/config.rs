//! Service configuration, loaded from a YAML file with sensible defaults.

use serde::Deserialize;

use restgate_gateway::tls::{SecretCategory, WatcherSettings};

pub const CONFIG_PATH_ENV: &str = "RESTGATE_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub listen_address: Option<String>,
    pub connected_system: ConnectedSystemConfig,
    pub connection_pool: ConnectionPoolConfig,
    pub certificates: CertificatesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedSystemConfig {
    /// Base URL of the subsystem directory service.
    pub url: String,
    pub subsystems_path: String,
    /// Access-based TTL of the subsystem cache.
    pub cache_access_expiry_seconds: u64,
}

impl Default for ConnectedSystemConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            subsystems_path: "/subsystem-manager/v1/subsystems".to_string(),
            cache_access_expiry_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionPoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout_seconds: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self { max_idle_per_host: 50, idle_timeout_seconds: 60 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificatesConfig {
    /// Secret change feed; the watcher is disabled when absent.
    pub watch_url: Option<String>,
    pub secrets: Vec<SecretCategory>,
    #[serde(flatten)]
    pub watcher: WatcherSettings,
}

impl ServiceConfig {
    /// Load from the file named by `RESTGATE_CONFIG`, falling back to
    /// defaults when the variable is unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let contents = std::fs::read(&path)
                    .map_err(|e| anyhow::anyhow!("cannot read config file {}: {}", path, e))?;
                let config = serde_yaml::from_slice(&contents)
                    .map_err(|e| anyhow::anyhow!("invalid config file {}: {}", path, e))?;
                Ok(config)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn listen_address(&self) -> &str {
        self.listen_address.as_deref().unwrap_or("0.0.0.0:8080")
    }

    pub fn pool_settings(&self) -> restgate_gateway::PoolSettings {
        restgate_gateway::PoolSettings {
            max_idle_per_host: self.connection_pool.max_idle_per_host,
            idle_timeout: std::time::Duration::from_secs(self.connection_pool.idle_timeout_seconds),
        }
    }
}
