use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::container::{erase, Container};
use crate::error::Result;
use crate::key::Key;
use crate::provider::Factory;
use crate::scope::ScopeRef;

/// One unbound provider declaration.
#[derive(Clone)]
pub struct CatalogEntry {
    pub key: Key,
    pub factory: Factory,
    pub scope: ScopeRef,
    pub dependencies: Vec<Key>,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("key", &self.key)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Declarative set of providers, not yet bound to any container.
///
/// Scopes stay symbolic until [`Container::import_catalog`] resolves them
/// against the importing container, so one catalog can feed several
/// containers. Declaring a key again replaces the earlier entry in place.
///
/// # Example
///
/// ```rust
/// use kinject::{Catalog, Container};
///
/// let base = Catalog::new().provide("greeting", "singleton", |_| "hello".to_string());
/// let app = Catalog::inherit(&base).provide("name", "transient", |_| "world".to_string());
///
/// let container = Container::new();
/// container.import_catalog(&app, false).unwrap();
/// assert_eq!(*container.resolve_as::<String>("greeting").unwrap(), "hello");
/// ```
#[derive(Clone, Default, Debug)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    pending: HashMap<Key, Vec<Key>>,
}

impl Catalog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a catalog holding every declaration of `parent`.
    #[inline]
    pub fn inherit(parent: &Catalog) -> Self {
        parent.clone()
    }

    /// Declares an infallible factory.
    pub fn provide<T, F>(self, key: impl Into<Key>, scope: impl Into<ScopeRef>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.try_provide(key, scope, move |c| Ok(factory(c)))
    }

    /// Declares a fallible factory.
    pub fn try_provide<T, F>(self, key: impl Into<Key>, scope: impl Into<ScopeRef>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.insert(CatalogEntry {
            key: key.into(),
            factory: erase(factory),
            scope: scope.into(),
            dependencies: Vec::new(),
        })
    }

    /// Declares dependencies for `consumer`; imported along with it.
    ///
    /// The consumer need not be declared yet. Dependencies given first are
    /// attached once an entry for it is provided, and are imported as plain
    /// graph entries if it never is. Replacing an entry keeps its
    /// dependencies.
    pub fn depends_on<I>(mut self, consumer: impl Into<Key>, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let consumer = consumer.into();
        let keys = keys.into_iter().map(Into::<Key>::into);
        match self.entries.iter_mut().find(|e| e.key == consumer) {
            Some(entry) => entry.dependencies.extend(keys),
            None => self.pending.entry(consumer).or_default().extend(keys),
        }
        self
    }

    fn insert(mut self, mut entry: CatalogEntry) -> Self {
        if let Some(deps) = self.pending.remove(&entry.key) {
            entry.dependencies.extend(deps);
        }
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(slot) => {
                entry.dependencies = std::mem::take(&mut slot.dependencies);
                *slot = entry;
            }
            None => self.entries.push(entry),
        }
        self
    }

    /// Dependencies declared for keys this catalog does not provide.
    pub fn unbound_dependencies(&self) -> impl Iterator<Item = (&Key, &[Key])> {
        self.pending.iter().map(|(key, deps)| (key, deps.as_slice()))
    }

    #[inline]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&CatalogEntry> {
        let key = key.into();
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.get(key).is_some()
    }

    /// Declared keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|e| &e.key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
