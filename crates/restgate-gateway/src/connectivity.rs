//! Subsystem lookup against the directory service.
//!
//! The directory answers a GET by name with a JSON array of subsystem
//! records; the first record with connection properties is authoritative.
//! Results are cached with an access-based TTL, so frequently used
//! subsystems stay resident while idle ones age out.

use std::sync::Arc;
use std::time::Duration;

use restgate_core::{ExpiringCache, GatewayError, GatewayResult, Subsystem};

use crate::http::{HttpExecutor, OutboundRequest};

pub struct ConnectivityRetriever {
    executor: Arc<HttpExecutor>,
    directory_url: String,
    subsystems_path: String,
    cache: ExpiringCache<String, Subsystem>,
}

impl ConnectivityRetriever {
    pub fn new(
        executor: Arc<HttpExecutor>,
        directory_url: String,
        subsystems_path: String,
        cache_access_expiry: Duration,
    ) -> Self {
        Self {
            executor,
            directory_url,
            subsystems_path,
            cache: ExpiringCache::from_last_access(cache_access_expiry),
        }
    }

    /// Look up a subsystem by name, resolving its auth-subsystem reference
    /// when present.
    pub async fn subsystem(&self, name: &str) -> GatewayResult<Subsystem> {
        self.cache
            .get_or_compute(name.to_string(), || self.load(name))
            .await
    }

    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(&name.to_string());
    }

    async fn load(&self, name: &str) -> GatewayResult<Subsystem> {
        let mut subsystem = self.fetch(name).await?;
        let auth_name = subsystem
            .connection()
            .auth_subsystem_name
            .clone()
            .filter(|n| !n.trim().is_empty());
        if let Some(auth_name) = auth_name {
            subsystem.auth_subsystem = Some(Box::new(self.fetch(&auth_name).await?));
        }
        Ok(subsystem)
    }

    async fn fetch(&self, name: &str) -> GatewayResult<Subsystem> {
        tracing::info!(subsystem = name, "getting subsystem");
        let mut request = OutboundRequest::new();
        request.url = format!("{}{}?name={}", self.directory_url, self.subsystems_path, name);
        request.method = "GET".to_string();
        request
            .headers
            .insert("content-type".to_string(), vec!["application/json".to_string()]);

        let response = self.executor.execute(&request).await?;
        let subsystems: Vec<Subsystem> =
            serde_json::from_slice(&response.body).map_err(|e| {
                GatewayError::General(format!("invalid subsystem directory response: {}", e))
            })?;

        let Some(subsystem) = subsystems.into_iter().next() else {
            return Err(GatewayError::ConnectedSystemNotFound(name.to_string()));
        };
        if subsystem.connection_properties.is_empty() {
            return Err(GatewayError::General(format!(
                "subsystem {} does not contain a connection property",
                name
            )));
        }
        Ok(subsystem)
    }
}
