//! In-memory store of uploaded resource configurations.
//!
//! Documents are YAML; the raw bytes are kept alongside the parsed form so a
//! download returns exactly what was uploaded.

use std::collections::HashMap;
use std::sync::RwLock;

use restgate_core::{GatewayError, GatewayResult, ResourceConfiguration};

struct StoredConfiguration {
    document: ResourceConfiguration,
    raw: Vec<u8>,
}

#[derive(Default)]
pub struct ResourceConfigurationStore {
    inner: RwLock<HashMap<String, StoredConfiguration>>,
}

impl ResourceConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload a new configuration document.
    pub fn upload(&self, contents: &[u8]) -> GatewayResult<ResourceConfiguration> {
        let document = parse_and_validate(contents)?;
        let mut inner = self.write();
        if inner.contains_key(&document.name) {
            return Err(GatewayError::ResourceConfigurationAlreadyExists(document.name));
        }
        tracing::info!(name = %document.name, "storing resource configuration");
        inner.insert(
            document.name.clone(),
            StoredConfiguration { document: document.clone(), raw: contents.to_vec() },
        );
        Ok(document)
    }

    /// Replace an existing configuration; the stored name follows the
    /// uploaded document.
    pub fn replace(&self, name: &str, contents: &[u8]) -> GatewayResult<ResourceConfiguration> {
        let document = parse_and_validate(contents)?;
        let mut inner = self.write();
        if inner.remove(name).is_none() {
            return Err(GatewayError::ResourceConfigurationNotFound(name.to_string()));
        }
        tracing::info!(replaced = name, name = %document.name, "replacing resource configuration");
        inner.insert(
            document.name.clone(),
            StoredConfiguration { document: document.clone(), raw: contents.to_vec() },
        );
        Ok(document)
    }

    pub fn get(&self, name: &str) -> GatewayResult<ResourceConfiguration> {
        self.read()
            .get(name)
            .map(|stored| stored.document.clone())
            .ok_or_else(|| GatewayError::ResourceConfigurationNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<ResourceConfiguration> {
        self.read().values().map(|stored| stored.document.clone()).collect()
    }

    /// The original uploaded bytes.
    pub fn download(&self, name: &str) -> GatewayResult<Vec<u8>> {
        self.read()
            .get(name)
            .map(|stored| stored.raw.clone())
            .ok_or_else(|| GatewayError::ResourceConfigurationNotFound(name.to_string()))
    }

    pub fn delete(&self, name: &str) -> GatewayResult<()> {
        self.write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::ResourceConfigurationNotFound(name.to_string()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, StoredConfiguration>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, StoredConfiguration>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_and_validate(contents: &[u8]) -> GatewayResult<ResourceConfiguration> {
    let document: ResourceConfiguration = serde_yaml::from_slice(contents)
        .map_err(|e| GatewayError::SchemaError(e.to_string()))?;
    if document.name.trim().is_empty() {
        return Err(GatewayError::SchemaError("configuration name is required".to_string()));
    }
    if document.resources.is_empty() {
        return Err(GatewayError::SchemaError("at least one resource is required".to_string()));
    }
    for (resource_name, resource) in &document.resources {
        if resource.methods.is_empty() {
            return Err(GatewayError::SchemaError(format!(
                "resource '{}' must define at least one method",
                resource_name
            )));
        }
    }
    Ok(document)
}
