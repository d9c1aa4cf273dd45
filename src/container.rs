use std::any::{type_name, Any};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::error::{DiError, Result};
use crate::guard::ResolutionGuard;
use crate::inject::{self, Args, AutoInject, Inject, Injectable, InjectedProperty};
use crate::key::Key;
use crate::provider::{Factory, Provider};
use crate::registry::{DependencyGraph, ProviderRegistry};
use crate::scope::{Instance, ScopeKind, ScopeRef, ScopeRegistry, ScopeStore};

// ============================================================================
// Configuration
// ============================================================================

/// Container-wide settings.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Let registrations replace existing providers instead of failing with
    /// [`DiError::DuplicateKey`].
    pub allow_overwrite: bool,
    /// Deepest nesting of factory-driven resolutions before
    /// [`DiError::DepthExceeded`] is raised.
    pub max_depth: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            allow_overwrite: false,
            max_depth: 100,
        }
    }
}

// ============================================================================
// Container
// ============================================================================

/// Provider registry, scope registry and dependency graph, plus the resolver
/// tying them together.
///
/// Thread-safe and shareable via `Arc<Container>`. Resolution may run on any
/// number of threads; registration is expected to finish during startup.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use kinject::Container;
///
/// let container = Container::new();
/// container.register_factory("apple", |_| "apple".to_string()).unwrap();
///
/// let a = container.resolve_as::<String>("apple").unwrap();
/// let b = container.resolve_as::<String>("apple").unwrap();
/// assert_eq!(*a, "apple");
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct Container {
    id: u64,
    providers: ProviderRegistry,
    scopes: ScopeRegistry,
    graph: DependencyGraph,
    config: ContainerConfig,
}

impl Container {
    /// Creates an empty container with the built-in scopes.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            providers: ProviderRegistry::new(),
            scopes: ScopeRegistry::new(),
            graph: DependencyGraph::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    #[inline]
    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    #[inline]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    #[inline]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Registers a custom scope store under `name`.
    pub fn register_scope(&self, name: &str, store: Arc<dyn ScopeStore>) {
        self.scopes.register_store(name, store);
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Binds a type-erased factory to `key` in `scope`.
    ///
    /// The scope is resolved now, so the provider is tied to a concrete store
    /// rather than a name.
    pub fn register_provider(
        &self,
        key: impl Into<Key>,
        factory: Option<Factory>,
        scope: impl Into<ScopeRef>,
        overwrite: bool,
    ) -> Result<Arc<Provider>> {
        let key = key.into();
        let store = self.scopes.resolve(&scope.into())?;
        let provider = Arc::new(Provider::new(key.clone(), factory, store));
        self.providers
            .register(key, provider, overwrite || self.config.allow_overwrite)
    }

    /// Registers a singleton factory.
    pub fn register_factory<T, F>(&self, key: impl Into<Key>, factory: F) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.register_factory_in(key, ScopeRef::default(), factory)
    }

    /// Registers a factory in the given scope.
    pub fn register_factory_in<T, F>(
        &self,
        key: impl Into<Key>,
        scope: impl Into<ScopeRef>,
        factory: F,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.register_try_factory(key, scope, move |c| Ok(factory(c)))
    }

    /// Registers a fallible factory in the given scope.
    ///
    /// Errors returned by the factory reach the caller of `resolve` as is.
    pub fn register_try_factory<T, F>(
        &self,
        key: impl Into<Key>,
        scope: impl Into<ScopeRef>,
        factory: F,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.register_provider(key, Some(erase(factory)), scope, false)
            .map(|_| ())
    }

    /// Like [`register_factory_in`](Self::register_factory_in), replacing any
    /// provider already bound to `key`.
    pub fn replace_factory<T, F>(
        &self,
        key: impl Into<Key>,
        scope: impl Into<ScopeRef>,
        factory: F,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let factory = erase(move |c: &Container| Ok(factory(c)));
        self.register_provider(key, Some(factory), scope, true)
            .map(|_| ())
    }

    /// Registers `T` under `Key::of::<T>()`, built through its
    /// [`Injectable`] constructor.
    ///
    /// The constructor's dependencies are declared against the type key, so
    /// resolving it reports missing dependencies before construction starts.
    pub fn register_injectable<T: Injectable>(&self, scope: impl Into<ScopeRef>) -> Result<()> {
        let key = Key::of::<T>();
        self.register_try_factory(key.clone(), scope, |c| {
            inject::construct::<T>(c, Args::new())
        })?;
        self.graph.depends_on(&key, T::dependencies());
        Ok(())
    }

    /// Seeds a singleton instance for `key`.
    pub fn set_instance<T: Send + Sync + 'static>(&self, key: impl Into<Key>, value: T) -> Result<()> {
        self.set_instance_in(key, ScopeRef::default(), value)
    }

    /// Seeds an instance for `key`.
    ///
    /// If no provider exists yet, a factory-less one is created in
    /// `default_scope` first. The store is written directly; no factory runs.
    pub fn set_instance_in<T: Send + Sync + 'static>(
        &self,
        key: impl Into<Key>,
        default_scope: impl Into<ScopeRef>,
        value: T,
    ) -> Result<()> {
        self.set_shared_instance(key, default_scope, Arc::new(value))
    }

    /// Seeds an already type-erased instance.
    pub fn set_shared_instance(
        &self,
        key: impl Into<Key>,
        default_scope: impl Into<ScopeRef>,
        instance: Instance,
    ) -> Result<()> {
        let key = key.into();
        let provider = match self.providers.get(&key) {
            Ok(provider) => provider,
            Err(_) => self.register_provider(key.clone(), None, default_scope, false)?,
        };
        provider.set_instance(instance);
        debug!(key = %key, scope = provider.scope().name(), "Seeded instance");
        Ok(())
    }

    /// Removes the provider bound to `key`.
    pub fn remove(&self, key: impl Into<Key>) -> Option<Arc<Provider>> {
        self.providers.remove(&key.into())
    }

    /// Drops the cached instance of `key`; the next resolution recomputes it.
    pub fn reset(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.providers.get(&key)?.reset();
        trace!(key = %key, "Reset provider");
        Ok(())
    }

    #[inline]
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.providers.has(&key.into())
    }

    /// Looks up the provider bound to `key`.
    pub fn provider(&self, key: impl Into<Key>) -> Result<Arc<Provider>> {
        self.providers.get(&key.into())
    }

    /// Registered provider keys, in no particular order.
    pub fn keys(&self) -> Vec<Key> {
        self.providers.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    // ------------------------------------------------------------------------
    // Dependency graph
    // ------------------------------------------------------------------------

    /// Declares that `consumer` depends on `keys`.
    pub fn depends_on<I>(&self, consumer: impl Into<Key>, keys: I)
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.graph.depends_on(&consumer.into(), keys);
    }

    pub fn deps(&self, consumer: impl Into<Key>) -> HashSet<Key> {
        self.graph.deps(&consumer.into())
    }

    /// Declared dependencies of `consumer` that have no usable provider.
    ///
    /// Only direct dependencies are checked; a missing dependency further
    /// down surfaces when the nested factory resolves it.
    pub fn missing_deps(&self, consumer: impl Into<Key>) -> Vec<Key> {
        self.graph.missing(&consumer.into(), &self.providers)
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolves one key.
    ///
    /// Fails with [`DiError::Unresolvable`] if the key's declared dependencies
    /// are missing, [`DiError::NotRegistered`] if no provider is bound, and
    /// [`DiError::Unprovidable`] if the provider has neither an instance nor a
    /// factory.
    pub fn resolve(&self, key: impl Into<Key>) -> Result<Instance> {
        self.resolve_key(&key.into())
    }

    /// Resolves several keys left to right, returning instances in input
    /// order. Stops at the first failure; no partial result is returned.
    pub fn resolve_many<I>(&self, keys: I) -> Result<Vec<Instance>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        keys.into_iter()
            .map(|key| self.resolve_key(&key.into()))
            .collect()
    }

    /// Resolves `key` and downcasts the instance to `T`.
    pub fn resolve_as<T: Any + Send + Sync>(&self, key: impl Into<Key>) -> Result<Arc<T>> {
        let key = key.into();
        let instance = self.resolve_key(&key)?;
        downcast(&key, instance)
    }

    /// Resolves the provider registered under `Key::of::<T>()`.
    #[inline]
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.resolve_as::<T>(Key::of::<T>())
    }

    /// Resolves every declared dependency of `consumer`.
    ///
    /// The order follows the dependency set and is unspecified; use
    /// [`resolve_many`](Self::resolve_many) when order matters.
    pub fn resolve_deps(&self, consumer: impl Into<Key>) -> Result<Vec<Instance>> {
        self.resolve_many(self.deps(consumer))
    }

    pub(crate) fn resolve_key(&self, key: &Key) -> Result<Instance> {
        trace!(key = %key, "Resolving");

        let missing = self.graph.missing(key, &self.providers);
        if !missing.is_empty() {
            return Err(DiError::Unresolvable {
                key: key.clone(),
                missing,
            });
        }

        let provider = self.providers.get(key)?;
        let _guard = ResolutionGuard::enter(
            self.id,
            key,
            self.config.max_depth,
            !provider.memoizes(),
        )?;
        provider
            .provide(self)?
            .ok_or_else(|| DiError::Unprovidable { key: key.clone() })
    }

    // ------------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------------

    /// Imports every provider of `other`, sharing its providers and scope
    /// stores. Declared dependencies of imported keys come along.
    ///
    /// Without `overwrite`, any key collision fails the whole import.
    pub fn import_container(&self, other: &Container, overwrite: bool) -> Result<()> {
        let entries = other.providers.entries();
        let keys: Vec<Key> = entries.iter().map(|(key, _)| key.clone()).collect();
        self.providers
            .register_all(entries, overwrite || self.config.allow_overwrite)?;
        for key in keys {
            self.graph.depends_on(&key, other.graph.deps(&key));
        }
        Ok(())
    }

    /// Imports the declarations of a [`Catalog`], binding each to a store
    /// from this container's scope registry.
    ///
    /// Scopes are resolved and collisions checked before anything is written.
    pub fn import_catalog(&self, catalog: &Catalog, overwrite: bool) -> Result<()> {
        let mut entries = Vec::with_capacity(catalog.len());
        for entry in catalog.entries() {
            let store = self.scopes.resolve(&entry.scope)?;
            let provider = Provider::new(entry.key.clone(), Some(Arc::clone(&entry.factory)), store);
            entries.push((entry.key.clone(), Arc::new(provider)));
        }
        self.providers
            .register_all(entries, overwrite || self.config.allow_overwrite)?;
        for entry in catalog.entries() {
            self.graph.depends_on(&entry.key, entry.dependencies.iter().cloned());
        }
        for (consumer, deps) in catalog.unbound_dependencies() {
            self.graph.depends_on(consumer, deps.iter().cloned());
        }
        Ok(())
    }
}

impl Default for Container {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("provider_count", &self.providers.len())
            .field("scopes", &self.scopes.names())
            .finish_non_exhaustive()
    }
}

/// Wraps a typed fallible factory into a [`Factory`].
pub(crate) fn erase<T, F>(factory: F) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |c: &Container| -> Result<Instance> {
        let instance: Instance = Arc::new(factory(c)?);
        Ok(instance)
    })
}

fn downcast<T: Any + Send + Sync>(key: &Key, instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        key: key.clone(),
        expected: type_name::<T>(),
    })
}

// ============================================================================
// Injector
// ============================================================================

/// High-level entry point owning an `Arc<Container>`.
///
/// Injection adapters keep a handle on the container, so they are created
/// here rather than on a borrowed [`Container`].
#[derive(Clone)]
pub struct Injector {
    container: Arc<Container>,
}

impl Injector {
    #[inline]
    pub fn new(container: Container) -> Self {
        Self {
            container: Arc::new(container),
        }
    }

    #[inline]
    pub fn from_arc(container: Arc<Container>) -> Self {
        Self { container }
    }

    #[inline]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Starts an explicit injection wrapper.
    #[inline]
    pub fn inject(&self) -> Inject {
        Inject::new(&self.container)
    }

    /// Starts a best-effort, name-matched injection wrapper.
    #[inline]
    pub fn auto_inject(&self) -> AutoInject {
        AutoInject::new(&self.container)
    }

    /// Declares `key` as a dependency of `Owner` and returns a lazy accessor
    /// for it.
    ///
    /// `name` defaults to the key's display form. With `replace_on_access`
    /// the first resolved value is kept; otherwise every access resolves
    /// again.
    pub fn inject_property<Owner, T>(
        &self,
        key: impl Into<Key>,
        name: Option<&str>,
        replace_on_access: bool,
    ) -> InjectedProperty<T>
    where
        Owner: ?Sized + 'static,
        T: Any + Send + Sync,
    {
        InjectedProperty::new::<Owner>(&self.container, key.into(), name, replace_on_access)
    }

    /// Builds `T` through its [`Injectable`] constructor. `args` follow the
    /// injected dependencies.
    pub fn create<T: Injectable>(&self, args: Args) -> Result<T> {
        self.container.depends_on(Key::of::<T>(), T::dependencies());
        inject::construct::<T>(&self.container, args)
    }

    #[inline]
    pub fn resolve(&self, key: impl Into<Key>) -> Result<Instance> {
        self.container.resolve(key)
    }

    #[inline]
    pub fn resolve_as<T: Any + Send + Sync>(&self, key: impl Into<Key>) -> Result<Arc<T>> {
        self.container.resolve_as(key)
    }

    #[inline]
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.container.has(key)
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("container", &self.container)
            .finish()
    }
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Fluent builder for a [`Container`].
///
/// Registration errors are held back and returned by
/// [`build`](ContainerBuilder::build).
///
/// # Example
///
/// ```rust
/// use kinject::{Args, ContainerBuilder};
///
/// let injector = ContainerBuilder::new()
///     .factory("apple", |_| "apple".to_string())
///     .build_injector()
///     .unwrap();
///
/// let f = injector.inject().arg("apple").wrap(|args| {
///     let apple = args.get::<String>(0)?;
///     let who = args.get::<&str>(1)?;
///     Ok(format!("{} for {}", apple, who))
/// });
/// assert_eq!(f.call(Args::new().with("bob")).unwrap(), "apple for bob");
/// ```
pub struct ContainerBuilder {
    container: Container,
    error: Option<DiError>,
}

impl ContainerBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    #[inline]
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            container: Container::with_config(config),
            error: None,
        }
    }

    /// Replaces the configuration. Registrations already made keep their
    /// outcome.
    #[inline]
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.container.config = config;
        self
    }

    /// Lets later registrations replace earlier ones.
    #[inline]
    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.container.config.allow_overwrite = allow;
        self
    }

    #[inline]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.container.config.max_depth = depth;
        self
    }

    /// Registers a custom scope store under `name`.
    #[inline]
    pub fn scope(self, name: &str, store: Arc<dyn ScopeStore>) -> Self {
        self.container.register_scope(name, store);
        self
    }

    /// Registers a scope kind, instantiated on first use.
    #[inline]
    pub fn scope_kind<S: ScopeKind>(self) -> Self {
        self.container.scopes.register_kind::<S>();
        self
    }

    /// Registers a singleton factory.
    #[inline]
    pub fn factory<T, F>(self, key: impl Into<Key>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let result = self.container.register_factory(key, factory);
        self.record(result)
    }

    /// Registers a factory in the given scope.
    #[inline]
    pub fn factory_in<T, F>(self, key: impl Into<Key>, scope: impl Into<ScopeRef>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let result = self.container.register_factory_in(key, scope, factory);
        self.record(result)
    }

    /// Registers a fallible factory in the given scope.
    #[inline]
    pub fn try_factory<T, F>(self, key: impl Into<Key>, scope: impl Into<ScopeRef>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        let result = self.container.register_try_factory(key, scope, factory);
        self.record(result)
    }

    /// Seeds a singleton instance.
    #[inline]
    pub fn instance<T: Send + Sync + 'static>(self, key: impl Into<Key>, value: T) -> Self {
        let result = self.container.set_instance(key, value);
        self.record(result)
    }

    /// Registers an [`Injectable`] type.
    #[inline]
    pub fn injectable<T: Injectable>(self, scope: impl Into<ScopeRef>) -> Self {
        let result = self.container.register_injectable::<T>(scope);
        self.record(result)
    }

    #[inline]
    pub fn depends_on<I>(self, consumer: impl Into<Key>, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.container.depends_on(consumer, keys);
        self
    }

    /// Imports a catalog, failing on key collisions unless overwrites are
    /// allowed.
    #[inline]
    pub fn catalog(self, catalog: &Catalog) -> Self {
        let result = self.container.import_catalog(catalog, false);
        self.record(result)
    }

    /// Returns the container, or the first registration error.
    pub fn build(self) -> Result<Arc<Container>> {
        match self.error {
            Some(err) => Err(err),
            None => {
                debug!(providers = self.container.len(), "Built container");
                Ok(Arc::new(self.container))
            }
        }
    }

    /// Like [`build`](Self::build), wrapped in an [`Injector`].
    #[inline]
    pub fn build_injector(self) -> Result<Injector> {
        self.build().map(Injector::from_arc)
    }

    fn record(mut self, result: Result<()>) -> Self {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
            }
        }
        self
    }
}

impl Default for ContainerBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
