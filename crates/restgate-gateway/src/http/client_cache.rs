//! Pooled HTTP client caching per request configuration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client;
use restgate_core::{GatewayError, GatewayResult};

use crate::http::request::OutboundRequest;
use crate::tls::TlsMaterial;

/// Shared connection-pool settings applied to every built client.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_idle_per_host: 50, idle_timeout: Duration::from_secs(60) }
    }
}

/// Configuration hash for client caching. The TLS generation is part of the
/// key so a certificate update evicts pooled clients built from the old
/// material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientConfig {
    connect_timeout_seconds: u64,
    read_timeout_seconds: u64,
    verify_certificates: bool,
    trust_secret: Option<String>,
    key_secret: Option<String>,
    tls_generation: Option<u64>,
}

impl ClientConfig {
    fn from_request(request: &OutboundRequest, material: Option<&Arc<TlsMaterial>>, verify: bool) -> Self {
        Self {
            connect_timeout_seconds: request.connect_timeout_seconds,
            read_timeout_seconds: request.read_timeout_seconds,
            verify_certificates: verify,
            trust_secret: request.trust_store_secret_name.clone(),
            key_secret: request.key_store_secret_name.clone(),
            tls_generation: material.map(|m| m.generation),
        }
    }

    fn build_client(
        &self,
        material: Option<&Arc<TlsMaterial>>,
        pool: &PoolSettings,
    ) -> GatewayResult<Client> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_seconds))
            .read_timeout(Duration::from_secs(self.read_timeout_seconds))
            .pool_max_idle_per_host(pool.max_idle_per_host)
            .pool_idle_timeout(pool.idle_timeout);

        if !self.verify_certificates {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(material) = material {
            for certificate in &material.root_certificates {
                builder = builder.add_root_certificate(certificate.clone());
            }
            if let Some(identity) = &material.identity {
                builder = builder.identity(identity.clone());
            }
        }

        builder.build().map_err(|e| GatewayError::General(format!("failed to build http client: {}", e)))
    }
}

/// Client cache that maintains one pooled client per distinct configuration.
pub struct ClientCache {
    pool: PoolSettings,
    cache: RwLock<HashMap<ClientConfig, Arc<Client>>>,
}

impl ClientCache {
    pub fn new(pool: PoolSettings) -> Self {
        Self { pool, cache: RwLock::new(HashMap::new()) }
    }

    /// Get or create a client for the given request configuration.
    pub fn get_client(
        &self,
        request: &OutboundRequest,
        material: Option<&Arc<TlsMaterial>>,
        verify: bool,
    ) -> GatewayResult<Arc<Client>> {
        let config = ClientConfig::from_request(request, material, verify);

        {
            let cache = self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(client) = cache.get(&config) {
                return Ok(client.clone());
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // double-check in case another task inserted while we waited
        if let Some(client) = cache.get(&config) {
            return Ok(client.clone());
        }

        // drop clients built from older material for the same secrets
        if config.tls_generation.is_some() {
            cache.retain(|existing, _| {
                existing.trust_secret != config.trust_secret
                    || existing.key_secret != config.key_secret
                    || existing.tls_generation == config.tls_generation
            });
        }

        let client = Arc::new(config.build_client(material, &self.pool)?);
        cache.insert(config, client.clone());
        Ok(client)
    }

    pub fn cached_clients(&self) -> usize {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
