//! Process-wide store of TLS material and derived client TLS contexts.
//!
//! Raw certificate material is kept per secret name in two maps (keystore
//! and truststore). Client TLS contexts are built lazily per
//! (truststore secret, keystore secret) pair and cached; any change to an
//! underlying secret invalidates every cached context that references it,
//! forcing a rebuild on next use. Readers never observe a context built from
//! material that was replaced before their read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use restgate_core::{GatewayError, GatewayResult};

/// Built client TLS material for one (truststore, keystore) pair.
///
/// The generation increases with every rebuild, letting client caches key on
/// it so a certificate update also invalidates pooled clients.
#[derive(Clone)]
pub struct TlsMaterial {
    pub generation: u64,
    pub root_certificates: Vec<reqwest::Certificate>,
    pub identity: Option<reqwest::Identity>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("generation", &self.generation)
            .field("root_certificates", &self.root_certificates.len())
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContextKey {
    trust_secret: Option<String>,
    key_secret: Option<String>,
}

#[derive(Default)]
struct Inner {
    truststore: HashMap<String, Vec<u8>>,
    keystore: HashMap<String, Vec<u8>>,
    contexts: HashMap<ContextKey, Arc<TlsMaterial>>,
    next_generation: u64,
}

#[derive(Default)]
pub struct TlsContextStore {
    inner: Mutex<Inner>,
}

impl TlsContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (building and caching lazily) the TLS context for the given
    /// secret-name pair.
    pub fn get(
        &self,
        trust_secret: Option<&str>,
        key_secret: Option<&str>,
    ) -> GatewayResult<Arc<TlsMaterial>> {
        let key = ContextKey {
            trust_secret: trust_secret.map(str::to_string),
            key_secret: key_secret.map(str::to_string),
        };
        let mut inner = self.lock();
        if let Some(material) = inner.contexts.get(&key) {
            return Ok(material.clone());
        }

        let root_certificates = match &key.trust_secret {
            Some(secret) => {
                let pem = inner.truststore.get(secret).ok_or_else(|| {
                    GatewayError::CertificateHandlingFailed {
                        kind: "truststore",
                        secret: secret.clone(),
                        reason: "empty secret data".to_string(),
                    }
                })?;
                vec![reqwest::Certificate::from_pem(pem).map_err(|e| {
                    GatewayError::CertificateHandlingFailed {
                        kind: "truststore",
                        secret: secret.clone(),
                        reason: e.to_string(),
                    }
                })?]
            }
            None => Vec::new(),
        };

        let identity = match &key.key_secret {
            Some(secret) => {
                let pem = inner.keystore.get(secret).ok_or_else(|| {
                    GatewayError::CertificateHandlingFailed {
                        kind: "keystore",
                        secret: secret.clone(),
                        reason: "empty secret data".to_string(),
                    }
                })?;
                Some(reqwest::Identity::from_pem(pem).map_err(|e| {
                    GatewayError::CertificateHandlingFailed {
                        kind: "keystore",
                        secret: secret.clone(),
                        reason: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        inner.next_generation += 1;
        let material = Arc::new(TlsMaterial {
            generation: inner.next_generation,
            root_certificates,
            identity,
        });
        inner.contexts.insert(key, material.clone());
        Ok(material)
    }

    /// Store keystore material. Overwriting an existing entry invalidates
    /// every cached context built from it.
    pub fn add_keystore_cert(&self, secret_name: &str, pem: Vec<u8>) {
        let mut inner = self.lock();
        if inner.keystore.insert(secret_name.to_string(), pem).is_some() {
            Self::remove_contexts_using_keystore(&mut inner, secret_name);
        }
    }

    pub fn delete_keystore_cert(&self, secret_name: &str) {
        let mut inner = self.lock();
        inner.keystore.remove(secret_name);
        Self::remove_contexts_using_keystore(&mut inner, secret_name);
    }

    /// Store truststore material. Overwriting an existing entry invalidates
    /// every cached context built from it.
    pub fn add_truststore_cert(&self, secret_name: &str, pem: Vec<u8>) {
        let mut inner = self.lock();
        if inner.truststore.insert(secret_name.to_string(), pem).is_some() {
            Self::remove_contexts_using_truststore(&mut inner, secret_name);
        }
    }

    pub fn delete_truststore_cert(&self, secret_name: &str) {
        let mut inner = self.lock();
        inner.truststore.remove(secret_name);
        Self::remove_contexts_using_truststore(&mut inner, secret_name);
    }

    pub fn contains_truststore_cert(&self, secret_name: &str) -> bool {
        self.lock().truststore.contains_key(secret_name)
    }

    pub fn contains_keystore_cert(&self, secret_name: &str) -> bool {
        self.lock().keystore.contains_key(secret_name)
    }

    /// Cached context for a pair without building; test and introspection
    /// helper.
    pub fn cached_generation(
        &self,
        trust_secret: Option<&str>,
        key_secret: Option<&str>,
    ) -> Option<u64> {
        let key = ContextKey {
            trust_secret: trust_secret.map(str::to_string),
            key_secret: key_secret.map(str::to_string),
        };
        self.lock().contexts.get(&key).map(|m| m.generation)
    }

    fn remove_contexts_using_keystore(inner: &mut Inner, secret_name: &str) {
        inner.contexts.retain(|key, _| key.key_secret.as_deref() != Some(secret_name));
    }

    fn remove_contexts_using_truststore(inner: &mut Inner, secret_name: &str) {
        inner.contexts.retain(|key, _| key.trust_secret.as_deref() != Some(secret_name));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
