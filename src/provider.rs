use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::trace;

use crate::container::Container;
use crate::error::Result;
use crate::key::Key;
use crate::scope::{Instance, ScopeStore};

/// Type-erased factory. Receives the resolving container so it can resolve
/// its own dependencies.
pub type Factory = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

// ============================================================================
// Provider
// ============================================================================

/// Binds an optional factory to a scope store and a cache key.
///
/// A provider without a factory can still serve an instance seeded through
/// [`set_instance`](Provider::set_instance).
pub struct Provider {
    factory: Option<Factory>,
    scope: Arc<dyn ScopeStore>,
    cache_key: Key,
    init: ReentrantMutex<()>,
}

impl Provider {
    pub fn new(cache_key: Key, factory: Option<Factory>, scope: Arc<dyn ScopeStore>) -> Self {
        Self {
            factory,
            scope,
            cache_key,
            init: ReentrantMutex::new(()),
        }
    }

    #[inline]
    pub fn cache_key(&self) -> &Key {
        &self.cache_key
    }

    #[inline]
    pub fn scope(&self) -> &Arc<dyn ScopeStore> {
        &self.scope
    }

    #[inline]
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Checks whether the bound store holds an instance for this provider in
    /// the current partition.
    #[inline]
    pub fn has_instance(&self) -> bool {
        self.scope.contains(&self.cache_key)
    }

    /// `false` when the bound scope never serves cached instances.
    #[inline]
    pub fn memoizes(&self) -> bool {
        self.scope.memoizes()
    }

    /// `true` if an instance is cached or a factory can produce one.
    #[inline]
    pub fn is_providable(&self) -> bool {
        self.has_factory() || self.has_instance()
    }

    /// Returns the cached instance, without calling the factory.
    pub fn instance(&self) -> Option<Instance> {
        self.scope.get(&self.cache_key)
    }

    /// Seeds the store directly, bypassing the factory.
    pub fn set_instance(&self, instance: Instance) {
        self.scope.insert(&self.cache_key, instance);
    }

    /// Drops the cached instance so the next [`provide`](Provider::provide)
    /// runs the factory again.
    pub fn reset(&self) -> Option<Instance> {
        self.scope.remove(&self.cache_key)
    }

    /// Returns the cached instance, or runs the factory and caches its result.
    ///
    /// Returns `Ok(None)` when the provider is not providable; the caller
    /// decides how to report that.
    ///
    /// The compute-and-cache step holds a per-provider reentrant lock, so a
    /// memoizing scope runs the factory at most once per partition even when
    /// several threads race on a cold key.
    pub fn provide(&self, container: &Container) -> Result<Option<Instance>> {
        if let Some(instance) = self.scope.get(&self.cache_key) {
            trace!(key = %self.cache_key, scope = self.scope.name(), "Cache hit");
            return Ok(Some(instance));
        }

        let factory = match &self.factory {
            Some(factory) => factory,
            None => return Ok(None),
        };

        let _init = self.init.lock();
        if let Some(instance) = self.scope.get(&self.cache_key) {
            return Ok(Some(instance));
        }

        trace!(key = %self.cache_key, scope = self.scope.name(), "Calling factory");
        let instance = factory(container)?;
        self.scope.insert(&self.cache_key, Arc::clone(&instance));
        Ok(Some(instance))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("cache_key", &self.cache_key)
            .field("scope", &self.scope.name())
            .field("has_factory", &self.has_factory())
            .finish()
    }
}
