use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{DiError, Result};
use crate::key::Key;
use crate::provider::Provider;

// ============================================================================
// ProviderRegistry
// ============================================================================

/// Maps provider keys to providers. At most one provider per key.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<Key, Arc<Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under `key`.
    ///
    /// Fails with [`DiError::DuplicateKey`] if the key is taken and
    /// `overwrite` is false; the existing provider stays bound.
    pub fn register(&self, key: Key, provider: Arc<Provider>, overwrite: bool) -> Result<Arc<Provider>> {
        let mut providers = self.providers.write();
        if providers.contains_key(&key) {
            if !overwrite {
                return Err(DiError::DuplicateKey { key });
            }
            warn!(key = %key, "Overwriting provider");
        }
        debug!(key = %key, scope = provider.scope().name(), "Registered provider");
        providers.insert(key, Arc::clone(&provider));
        Ok(provider)
    }

    /// Registers every entry, or none of them if any key collides.
    pub fn register_all(&self, entries: Vec<(Key, Arc<Provider>)>, overwrite: bool) -> Result<()> {
        let mut providers = self.providers.write();
        if !overwrite {
            if let Some((key, _)) = entries.iter().find(|(key, _)| providers.contains_key(key)) {
                return Err(DiError::DuplicateKey { key: key.clone() });
            }
        }
        for (key, provider) in entries {
            debug!(key = %key, scope = provider.scope().name(), "Imported provider");
            providers.insert(key, provider);
        }
        Ok(())
    }

    /// Looks up a provider.
    pub fn get(&self, key: &Key) -> Result<Arc<Provider>> {
        self.providers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| DiError::NotRegistered { key: key.clone() })
    }

    #[inline]
    pub fn has(&self, key: &Key) -> bool {
        self.providers.read().contains_key(key)
    }

    pub fn remove(&self, key: &Key) -> Option<Arc<Provider>> {
        let removed = self.providers.write().remove(key);
        if removed.is_some() {
            debug!(key = %key, "Removed provider");
        }
        removed
    }

    pub fn keys(&self) -> Vec<Key> {
        self.providers.read().keys().cloned().collect()
    }

    /// Copies out every `(key, provider)` pair.
    pub fn entries(&self) -> Vec<(Key, Arc<Provider>)> {
        self.providers
            .read()
            .iter()
            .map(|(key, provider)| (key.clone(), Arc::clone(provider)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.len())
            .finish()
    }
}

// ============================================================================
// DependencyGraph
// ============================================================================

/// Maps a consumer to the set of provider keys it declares as dependencies.
///
/// Entries are never pruned automatically.
#[derive(Default)]
pub struct DependencyGraph {
    edges: RwLock<HashMap<Key, HashSet<Key>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `keys` into the consumer's dependency set. No keys, no entry.
    pub fn depends_on<I>(&self, consumer: &Key, keys: I)
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return;
        }
        let mut edges = self.edges.write();
        let deps = edges.entry(consumer.clone()).or_default();
        deps.extend(keys.map(Into::<Key>::into));
        debug!(consumer = %consumer, deps = deps.len(), "Declared dependencies");
    }

    /// The consumer's declared dependencies; empty if none were declared.
    pub fn deps(&self, consumer: &Key) -> HashSet<Key> {
        self.edges
            .read()
            .get(consumer)
            .cloned()
            .unwrap_or_default()
    }

    /// Direct dependencies of `consumer` without a usable provider.
    ///
    /// A dependency is missing when no provider is registered for it, or its
    /// provider has neither a cached instance nor a factory. Only declared
    /// dependencies of `consumer` itself are inspected. The result is sorted
    /// by display form.
    pub fn missing(&self, consumer: &Key, providers: &ProviderRegistry) -> Vec<Key> {
        let mut missing: Vec<Key> = self
            .deps(consumer)
            .into_iter()
            .filter(|dep| match providers.get(dep) {
                Ok(provider) => !provider.is_providable(),
                Err(_) => true,
            })
            .collect();
        missing.sort_by_key(|key| key.to_string());
        missing
    }

    /// Drops the consumer's entry.
    pub fn forget(&self, consumer: &Key) -> Option<HashSet<Key>> {
        self.edges.write().remove(consumer)
    }

    pub fn contains(&self, consumer: &Key) -> bool {
        self.edges.read().contains_key(consumer)
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("consumers", &self.len())
            .finish()
    }
}
