//! Scope stores and the scope registry.
//!
//! A scope store caches provider instances. Its key transform decides the
//! lifetime partition an instance belongs to:
//!
//! - [`SingletonScope`] (`singleton`, `global`): one instance per key.
//! - [`ProcessScope`] (`process`): one instance per key per OS process.
//! - [`ThreadScope`] (`thread`): one instance per key per thread.
//! - [`NoneScope`] (`none`, `transient`): nothing is kept.
//! - [`ProxyScope`] / [`NamespacedProxyScope`]: storage lives in an external
//!   [`InstanceMap`], optionally prefixed by a namespace.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thread_local::ThreadLocal;
use tracing::debug;

use crate::error::{DiError, Result};
use crate::key::Key;

/// A type-erased, shareable provider instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds a scope store on demand.
pub type ScopeFactory = Arc<dyn Fn() -> Arc<dyn ScopeStore> + Send + Sync>;

// ============================================================================
// Slot keys
// ============================================================================

/// The lifetime partition a cached instance belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    Shared,
    Process(u32),
    Namespace(Arc<str>),
}

/// A provider key after a scope's key transform has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub partition: Partition,
    pub key: Key,
}

impl SlotKey {
    #[inline]
    pub fn new(partition: Partition, key: &Key) -> Self {
        Self {
            partition,
            key: key.clone(),
        }
    }
}

// ============================================================================
// InstanceMap
// ============================================================================

/// Shared backing storage for map-based scopes.
///
/// Cloning is cheap and yields a handle to the same storage, which is how
/// proxy scopes share state with a pre-existing map.
#[derive(Clone, Default)]
pub struct InstanceMap {
    slots: Arc<RwLock<HashMap<SlotKey, Instance>>>,
}

impl InstanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: &SlotKey) -> Option<Instance> {
        self.slots.read().get(slot).cloned()
    }

    pub fn insert(&self, slot: SlotKey, instance: Instance) -> Option<Instance> {
        self.slots.write().insert(slot, instance)
    }

    pub fn remove(&self, slot: &SlotKey) -> Option<Instance> {
        self.slots.write().remove(slot)
    }

    pub fn contains(&self, slot: &SlotKey) -> bool {
        self.slots.read().contains_key(slot)
    }

    /// Removes every slot in `partition`, leaving other partitions untouched.
    pub fn clear_partition(&self, partition: &Partition) {
        self.slots.write().retain(|slot, _| &slot.partition != partition);
    }

    /// Number of slots in `partition`.
    pub fn count(&self, partition: &Partition) -> usize {
        self.slots
            .read()
            .keys()
            .filter(|slot| &slot.partition == partition)
            .count()
    }

    /// Total number of slots across all partitions.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl fmt::Debug for InstanceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMap")
            .field("slots", &self.len())
            .finish()
    }
}

// ============================================================================
// ScopeStore
// ============================================================================

/// A keyed cache of provider instances with its own lifetime policy.
///
/// Implement this to add custom scopes (a per-request scope in a server, for
/// example) and register them with [`ScopeRegistry::register_store`].
///
/// `clear` must only drop entries that belong to this store's own partition.
pub trait ScopeStore: Send + Sync {
    /// Name the scope is known by.
    fn name(&self) -> &str;

    /// Key transform. Must be deterministic for a given key and ambient
    /// context (process id, thread, namespace).
    fn slot_key(&self, key: &Key) -> SlotKey {
        SlotKey::new(Partition::Shared, key)
    }

    fn get(&self, key: &Key) -> Option<Instance>;

    fn insert(&self, key: &Key, instance: Instance);

    fn remove(&self, key: &Key) -> Option<Instance>;

    fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `false` if inserted instances are never served back. Providers in such
    /// a scope may recurse into themselves.
    fn memoizes(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("name", &self.name())
            .field("len", &self.len())
            .finish()
    }
}

/// A scope store type the [`ScopeRegistry`] can instantiate by itself.
pub trait ScopeKind: ScopeStore + Default + 'static {
    const NAME: &'static str;
    const ALIASES: &'static [&'static str] = &[];
}

// Map-backed stores only differ in backing map and partition.
macro_rules! map_backed_store {
    () => {
        fn get(&self, key: &Key) -> Option<Instance> {
            self.instances.get(&self.slot_key(key))
        }

        fn insert(&self, key: &Key, instance: Instance) {
            self.instances.insert(self.slot_key(key), instance);
        }

        fn remove(&self, key: &Key) -> Option<Instance> {
            self.instances.remove(&self.slot_key(key))
        }

        fn contains(&self, key: &Key) -> bool {
            self.instances.contains(&self.slot_key(key))
        }

        fn clear(&self) {
            self.instances.clear_partition(&self.partition());
        }

        fn len(&self) -> usize {
            self.instances.count(&self.partition())
        }
    };
}

// ============================================================================
// Built-in scopes
// ============================================================================

/// One instance per key for the lifetime of the store.
#[derive(Debug, Default)]
pub struct SingletonScope {
    instances: InstanceMap,
}

impl SingletonScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self) -> Partition {
        Partition::Shared
    }
}

impl ScopeStore for SingletonScope {
    fn name(&self) -> &str {
        Self::NAME
    }

    map_backed_store!();
}

impl ScopeKind for SingletonScope {
    const NAME: &'static str = "singleton";
    const ALIASES: &'static [&'static str] = &["global"];
}

/// One instance per key per OS process.
///
/// Keys are partitioned by the current process id, so a forked child sharing
/// the in-memory store never sees its parent's instances.
#[derive(Debug, Default)]
pub struct ProcessScope {
    instances: InstanceMap,
}

impl ProcessScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self) -> Partition {
        Partition::Process(std::process::id())
    }
}

impl ScopeStore for ProcessScope {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn slot_key(&self, key: &Key) -> SlotKey {
        SlotKey::new(self.partition(), key)
    }

    map_backed_store!();
}

impl ScopeKind for ProcessScope {
    const NAME: &'static str = "process";
}

/// One instance per key per calling thread.
///
/// Each store owns its per-thread maps, so dropping the store drops the
/// instances of every thread. `clear`, `remove` and `len` only see the
/// calling thread.
#[derive(Default)]
pub struct ThreadScope {
    slots: ThreadLocal<RefCell<HashMap<Key, Instance>>>,
}

impl ThreadScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> &RefCell<HashMap<Key, Instance>> {
        self.slots.get_or_default()
    }
}

impl fmt::Debug for ThreadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScope")
            .field("len", &self.len())
            .finish()
    }
}

// Replaced and removed instances are dropped after the borrow ends, so their
// destructors may use thread scopes again.
impl ScopeStore for ThreadScope {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, key: &Key) -> Option<Instance> {
        self.slots().borrow().get(key).cloned()
    }

    fn insert(&self, key: &Key, instance: Instance) {
        let replaced = self.slots().borrow_mut().insert(key.clone(), instance);
        drop(replaced);
    }

    fn remove(&self, key: &Key) -> Option<Instance> {
        self.slots().borrow_mut().remove(key)
    }

    fn contains(&self, key: &Key) -> bool {
        self.slots().borrow().contains_key(key)
    }

    fn clear(&self) {
        let cleared = self.slots().take();
        drop(cleared);
    }

    fn len(&self) -> usize {
        self.slots().borrow().len()
    }
}

impl ScopeKind for ThreadScope {
    const NAME: &'static str = "thread";
}

/// Keeps nothing: every resolution runs the factory again.
#[derive(Debug, Default)]
pub struct NoneScope;

impl ScopeStore for NoneScope {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn get(&self, _key: &Key) -> Option<Instance> {
        None
    }

    fn insert(&self, _key: &Key, _instance: Instance) {}

    fn remove(&self, _key: &Key) -> Option<Instance> {
        None
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn memoizes(&self) -> bool {
        false
    }
}

impl ScopeKind for NoneScope {
    const NAME: &'static str = "none";
    const ALIASES: &'static [&'static str] = &["transient"];
}

/// Stores instances in an externally supplied [`InstanceMap`].
#[derive(Debug)]
pub struct ProxyScope {
    name: String,
    instances: InstanceMap,
}

impl ProxyScope {
    pub fn new(name: impl Into<String>, instances: InstanceMap) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }

    fn partition(&self) -> Partition {
        Partition::Shared
    }
}

impl ScopeStore for ProxyScope {
    fn name(&self) -> &str {
        &self.name
    }

    map_backed_store!();
}

/// A proxy whose keys are prefixed with a namespace.
///
/// Several namespaced scopes can share one [`InstanceMap`] without ever
/// observing each other's keys.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use kinject::{InstanceMap, Key, NamespacedProxyScope, ScopeStore};
///
/// let shared = InstanceMap::new();
/// let users = NamespacedProxyScope::new("users", shared.clone());
/// let orders = NamespacedProxyScope::new("orders", shared.clone());
///
/// users.insert(&Key::name("repo"), Arc::new(1u8));
/// assert!(users.contains(&Key::name("repo")));
/// assert!(!orders.contains(&Key::name("repo")));
/// assert_eq!(shared.len(), 1);
/// ```
#[derive(Debug)]
pub struct NamespacedProxyScope {
    namespace: Arc<str>,
    instances: InstanceMap,
}

impl NamespacedProxyScope {
    pub fn new(namespace: impl Into<Arc<str>>, instances: InstanceMap) -> Self {
        Self {
            namespace: namespace.into(),
            instances,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn partition(&self) -> Partition {
        Partition::Namespace(Arc::clone(&self.namespace))
    }
}

impl ScopeStore for NamespacedProxyScope {
    fn name(&self) -> &str {
        &self.namespace
    }

    fn slot_key(&self, key: &Key) -> SlotKey {
        SlotKey::new(self.partition(), key)
    }

    map_backed_store!();
}

// ============================================================================
// ScopeRef
// ============================================================================

fn make_kind<S: ScopeKind>() -> Arc<dyn ScopeStore> {
    Arc::new(S::default())
}

/// Anything the [`ScopeRegistry`] can turn into a concrete store.
#[derive(Clone)]
pub enum ScopeRef {
    /// A registered scope name such as `"singleton"` or `"thread"`.
    Name(Arc<str>),
    /// A [`ScopeKind`] type; instantiated once per registry.
    Kind {
        id: TypeId,
        name: &'static str,
        aliases: &'static [&'static str],
        make: fn() -> Arc<dyn ScopeStore>,
    },
    /// A concrete store, used as is.
    Store(Arc<dyn ScopeStore>),
    /// An unregistered factory; every resolution builds a new store.
    Factory(ScopeFactory),
}

impl ScopeRef {
    pub fn name(name: impl Into<Arc<str>>) -> Self {
        Self::Name(name.into())
    }

    pub fn kind<S: ScopeKind>() -> Self {
        Self::Kind {
            id: TypeId::of::<S>(),
            name: S::NAME,
            aliases: S::ALIASES,
            make: make_kind::<S>,
        }
    }

    pub fn store(store: impl ScopeStore + 'static) -> Self {
        Self::Store(Arc::new(store))
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ScopeStore> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }
}

impl Default for ScopeRef {
    fn default() -> Self {
        Self::Name(SingletonScope::NAME.into())
    }
}

impl From<&str> for ScopeRef {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

impl From<String> for ScopeRef {
    fn from(name: String) -> Self {
        Self::Name(name.into())
    }
}

impl From<Arc<dyn ScopeStore>> for ScopeRef {
    fn from(store: Arc<dyn ScopeStore>) -> Self {
        Self::Store(store)
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "ScopeRef::Name({:?})", name),
            Self::Kind { name, .. } => write!(f, "ScopeRef::Kind({})", name),
            Self::Store(store) => write!(f, "ScopeRef::Store({})", store.name()),
            Self::Factory(_) => f.write_str("ScopeRef::Factory"),
        }
    }
}

// ============================================================================
// ScopeRegistry
// ============================================================================

struct ScopeSlot {
    label: Arc<str>,
    store: OnceLock<Arc<dyn ScopeStore>>,
    make: ScopeFactory,
}

impl ScopeSlot {
    fn lazy(label: Arc<str>, make: ScopeFactory) -> Self {
        Self {
            label,
            store: OnceLock::new(),
            make,
        }
    }

    fn ready(store: Arc<dyn ScopeStore>) -> Self {
        let label: Arc<str> = store.name().into();
        let cell = OnceLock::new();
        let _ = cell.set(Arc::clone(&store));
        Self {
            label,
            store: cell,
            make: Arc::new(move || Arc::clone(&store)),
        }
    }

    fn get(&self) -> Arc<dyn ScopeStore> {
        Arc::clone(self.store.get_or_init(|| {
            debug!(scope = %self.label, "Instantiated scope store");
            (self.make)()
        }))
    }
}

#[derive(Default)]
struct Scopes {
    names: HashMap<Arc<str>, Arc<ScopeSlot>>,
    kinds: HashMap<TypeId, Arc<ScopeSlot>>,
}

/// Maps scope names and kinds to concrete stores.
///
/// Kinds and factories are instantiated on first [`resolve`](Self::resolve)
/// and the store is memoized, so every later lookup by name or by kind yields
/// the same instance.
pub struct ScopeRegistry {
    scopes: RwLock<Scopes>,
}

impl ScopeRegistry {
    /// Creates a registry with the built-in scopes registered.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_kind::<SingletonScope>();
        registry.register_kind::<ProcessScope>();
        registry.register_kind::<ThreadScope>();
        registry.register_kind::<NoneScope>();
        registry
    }

    /// Creates a registry without any scopes.
    pub fn empty() -> Self {
        Self {
            scopes: RwLock::new(Scopes::default()),
        }
    }

    /// Registers a scope kind under its name, its aliases and its type.
    pub fn register_kind<S: ScopeKind>(&self) {
        self.insert_kind(TypeId::of::<S>(), S::NAME, S::ALIASES, make_kind::<S>);
    }

    /// Registers a concrete store under `name`.
    pub fn register_store(&self, name: impl Into<Arc<str>>, store: Arc<dyn ScopeStore>) {
        let name = name.into();
        debug!(scope = %name, "Registered scope store");
        self.scopes
            .write()
            .names
            .insert(name, Arc::new(ScopeSlot::ready(store)));
    }

    /// Registers a factory under `name`; it runs on first resolution only.
    pub fn register_factory<F>(&self, name: impl Into<Arc<str>>, factory: F)
    where
        F: Fn() -> Arc<dyn ScopeStore> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(scope = %name, "Registered scope factory");
        let slot = Arc::new(ScopeSlot::lazy(Arc::clone(&name), Arc::new(factory)));
        self.scopes.write().names.insert(name, slot);
    }

    /// Turns a scope reference into a concrete store.
    pub fn resolve(&self, scope: &ScopeRef) -> Result<Arc<dyn ScopeStore>> {
        match scope {
            ScopeRef::Store(store) => Ok(Arc::clone(store)),
            ScopeRef::Factory(factory) => Ok(factory()),
            ScopeRef::Name(name) => {
                let slot = self.scopes.read().names.get(name).cloned();
                slot.map(|slot| slot.get()).ok_or_else(|| DiError::UnknownScope {
                    name: name.to_string(),
                })
            }
            ScopeRef::Kind {
                id,
                name,
                aliases,
                make,
            } => {
                let slot = self.scopes.read().kinds.get(id).cloned();
                let slot = match slot {
                    Some(slot) => slot,
                    None => self.insert_kind(*id, *name, *aliases, *make),
                };
                Ok(slot.get())
            }
        }
    }

    /// Returns `true` if a scope is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.scopes.read().names.contains_key(name)
    }

    /// Registered scope names, aliases included, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .read()
            .names
            .keys()
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names
    }

    fn insert_kind(
        &self,
        id: TypeId,
        name: &'static str,
        aliases: &'static [&'static str],
        make: fn() -> Arc<dyn ScopeStore>,
    ) -> Arc<ScopeSlot> {
        let mut scopes = self.scopes.write();
        if let Some(existing) = scopes.kinds.get(&id) {
            return Arc::clone(existing);
        }
        debug!(scope = name, "Registered scope kind");
        let slot = Arc::new(ScopeSlot::lazy(name.into(), Arc::new(make)));
        scopes.kinds.insert(id, Arc::clone(&slot));
        for label in std::iter::once(&name).chain(aliases.iter()) {
            scopes.names.insert((*label).into(), Arc::clone(&slot));
        }
        slot
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn value(n: u32) -> Instance {
        Arc::new(n)
    }

    fn read(instance: Option<Instance>) -> Option<u32> {
        instance.and_then(|i| i.downcast_ref::<u32>().copied())
    }

    #[test]
    fn test_singleton_scope_keeps_instances() {
        let scope = SingletonScope::new();
        let key = Key::name("k");
        scope.insert(&key, value(1));
        assert_eq!(read(scope.get(&key)), Some(1));
        assert_eq!(scope.len(), 1);

        scope.insert(&Key::name("other"), value(2));
        assert_eq!(read(scope.get(&key)), Some(1));

        assert_eq!(read(scope.remove(&key)), Some(1));
        assert!(!scope.contains(&key));
    }

    #[test]
    fn test_process_scope_partitions_by_pid() {
        let scope = ProcessScope::new();
        let key = Key::name("k");
        assert_eq!(
            scope.slot_key(&key).partition,
            Partition::Process(std::process::id())
        );
        scope.insert(&key, value(7));
        assert_eq!(read(scope.get(&key)), Some(7));
    }

    #[test]
    fn test_none_scope_discards_writes() {
        let scope = NoneScope;
        let key = Key::name("k");
        scope.insert(&key, value(1));
        assert!(scope.get(&key).is_none());
        assert!(scope.is_empty());
        assert!(!scope.memoizes());
        assert!(SingletonScope::new().memoizes());
    }

    #[test]
    fn test_thread_scope_isolates_threads() {
        let scope = Arc::new(ThreadScope::new());
        let key = Key::name("k");
        scope.insert(&key, value(1));

        let other = {
            let scope = Arc::clone(&scope);
            let key = key.clone();
            thread::spawn(move || {
                let before = read(scope.get(&key));
                scope.insert(&key, value(2));
                (before, read(scope.get(&key)))
            })
            .join()
            .unwrap()
        };

        assert_eq!(other, (None, Some(2)));
        assert_eq!(read(scope.get(&key)), Some(1));
    }

    #[test]
    fn test_thread_scopes_do_not_share_slots() {
        let a = ThreadScope::new();
        let b = ThreadScope::new();
        let key = Key::name("k");
        a.insert(&key, value(1));
        assert!(b.get(&key).is_none());
        a.clear();
        assert!(a.is_empty());
    }

    #[test]
    fn test_dropping_thread_scope_frees_every_thread() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Tracked(Arc<AtomicUsize>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let scope = Arc::new(ThreadScope::new());
        let key = Key::name("k");
        scope.insert(&key, Arc::new(Tracked(Arc::clone(&drops))));
        {
            let scope = Arc::clone(&scope);
            let drops = Arc::clone(&drops);
            let key = key.clone();
            thread::spawn(move || scope.insert(&key, Arc::new(Tracked(drops))))
                .join()
                .unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(scope);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_thread_scope_drops_replaced_instances_outside_borrow() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Peek {
            scope: Arc<ThreadScope>,
            drops: Arc<AtomicUsize>,
        }

        impl Drop for Peek {
            fn drop(&mut self) {
                let _ = self.scope.get(&Key::name("k"));
                self.drops.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let scope = Arc::new(ThreadScope::new());
        let key = Key::name("k");
        let peek = || {
            Arc::new(Peek {
                scope: Arc::clone(&scope),
                drops: Arc::clone(&drops),
            }) as Instance
        };

        scope.insert(&key, peek());
        scope.insert(&key, peek());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        scope.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_namespaced_scopes_do_not_collide() {
        let shared = InstanceMap::new();
        let ns1 = NamespacedProxyScope::new("ns1", shared.clone());
        let ns2 = NamespacedProxyScope::new("ns2", shared.clone());
        let key = Key::name("k");

        ns1.insert(&key, value(1));
        ns2.insert(&key, value(2));

        assert_eq!(read(ns1.get(&key)), Some(1));
        assert_eq!(read(ns2.get(&key)), Some(2));
        assert_ne!(ns1.slot_key(&key), ns2.slot_key(&key));
        assert_eq!(shared.len(), 2);

        ns1.clear();
        assert!(ns1.get(&key).is_none());
        assert_eq!(read(ns2.get(&key)), Some(2));
    }

    #[test]
    fn test_proxy_scope_shares_external_map() {
        let shared = InstanceMap::new();
        let proxy = ProxyScope::new("shared", shared.clone());
        proxy.insert(&Key::name("k"), value(3));

        let slot = SlotKey::new(Partition::Shared, &Key::name("k"));
        assert_eq!(read(shared.get(&slot)), Some(3));
        assert_eq!(proxy.name(), "shared");
    }

    #[test]
    fn test_registry_builtins_and_aliases() {
        let registry = ScopeRegistry::new();
        for name in ["singleton", "global", "process", "thread", "none", "transient"] {
            assert!(registry.contains(name), "{} should be registered", name);
        }

        let singleton = registry.resolve(&"singleton".into()).unwrap();
        let global = registry.resolve(&"global".into()).unwrap();
        assert!(Arc::ptr_eq(&singleton, &global));

        let by_kind = registry.resolve(&ScopeRef::kind::<SingletonScope>()).unwrap();
        assert!(Arc::ptr_eq(&singleton, &by_kind));
    }

    #[test]
    fn test_registry_unknown_scope() {
        let registry = ScopeRegistry::new();
        match registry.resolve(&"request".into()) {
            Err(DiError::UnknownScope { name }) => assert_eq!(name, "request"),
            other => panic!("expected UnknownScope, got {:?}", other.map(|s| s.name().to_string())),
        }
    }

    #[test]
    fn test_registry_factory_is_lazy_and_memoized() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ScopeRegistry::empty();
        {
            let calls = Arc::clone(&calls);
            registry.register_factory("request", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Arc::new(SingletonScope::new()) as Arc<dyn ScopeStore>
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let a = registry.resolve(&"request".into()).unwrap();
        let b = registry.resolve(&"request".into()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_registers_unknown_kind_on_demand() {
        let registry = ScopeRegistry::empty();
        assert!(!registry.contains("thread"));
        let a = registry.resolve(&ScopeRef::kind::<ThreadScope>()).unwrap();
        assert!(registry.contains("thread"));
        let b = registry.resolve(&"thread".into()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registry_store_and_factory_refs() {
        let registry = ScopeRegistry::new();
        let store: Arc<dyn ScopeStore> = Arc::new(SingletonScope::new());
        let resolved = registry.resolve(&ScopeRef::Store(Arc::clone(&store))).unwrap();
        assert!(Arc::ptr_eq(&store, &resolved));

        let factory = ScopeRef::factory(|| Arc::new(NoneScope) as Arc<dyn ScopeStore>);
        let a = registry.resolve(&factory).unwrap();
        let b = registry.resolve(&factory).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "none");
    }
}
