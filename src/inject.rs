//! Injection adapters.
//!
//! Three ways to hand resolved instances to ordinary code:
//!
//! - [`Inject`] wraps a callable and prepends instances for an explicit list
//!   of keys on every call.
//! - [`InjectedProperty`] is a lazily resolved, optionally memoized accessor
//!   owned by some type.
//! - [`AutoInject`] matches declared parameter names against registered keys.
//!   It is best-effort and only as good as the [`Signature`] it is given.
//!
//! Constructors take part through the [`Injectable`] trait.

use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use crate::container::Container;
use crate::error::{DiError, Result};
use crate::key::Key;
use crate::scope::Instance;

// ============================================================================
// Args
// ============================================================================

/// Call arguments: ordered positional instances plus named instances.
#[derive(Clone, Default)]
pub struct Args {
    positional: Vec<Instance>,
    named: HashMap<String, Instance>,
}

impl Args {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn with<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.with_instance(Arc::new(value))
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.positional.push(instance);
        self
    }

    /// Sets a named argument, replacing any previous value under `name`.
    pub fn with_named<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with_named_instance(name, Arc::new(value))
    }

    pub fn with_named_instance(mut self, name: impl Into<String>, instance: Instance) -> Self {
        self.named.insert(name.into(), instance);
        self
    }

    /// Typed access to the positional argument at `index`.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        let label = format!("#{}", index);
        let instance = self
            .positional
            .get(index)
            .ok_or_else(|| DiError::MissingArgument { name: label.clone() })?;
        downcast_arg(label, Arc::clone(instance))
    }

    /// Typed access to the named argument `name`.
    pub fn named<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self
            .named
            .get(name)
            .ok_or_else(|| DiError::MissingArgument { name: name.to_string() })?;
        downcast_arg(name.to_string(), Arc::clone(instance))
    }

    #[inline]
    pub fn positional(&self) -> &[Instance] {
        &self.positional
    }

    #[inline]
    pub fn named_instance(&self, name: &str) -> Option<&Instance> {
        self.named.get(name)
    }

    #[inline]
    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Number of positional arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.named.keys().collect();
        names.sort();
        f.debug_struct("Args")
            .field("positional", &self.positional.len())
            .field("named", &names)
            .finish()
    }
}

/// Fails with [`DiError::Unresolvable`] if a declared dependency of
/// `consumer` has no usable provider.
fn ensure_declared(container: &Container, consumer: &Key) -> Result<()> {
    let missing = container.missing_deps(consumer);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DiError::Unresolvable {
            key: consumer.clone(),
            missing,
        })
    }
}

fn downcast_arg<T: Any + Send + Sync>(label: String, instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        key: Key::name(label),
        expected: type_name::<T>(),
    })
}

// ============================================================================
// Signature
// ============================================================================

/// One declared parameter of an injected callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    annotation: Option<Key>,
    keyword_only: bool,
}

impl Param {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key to fall back on when the name itself is not registered.
    #[inline]
    pub fn annotation(&self) -> Option<&Key> {
        self.annotation.as_ref()
    }

    #[inline]
    pub fn is_keyword_only(&self) -> bool {
        self.keyword_only
    }
}

/// Parameter list of a callable, since Rust closures carry no names.
///
/// # Example
///
/// ```rust
/// use kinject::{Key, Signature};
///
/// struct Clock;
///
/// let sig = Signature::new()
///     .param("db")
///     .annotated("clock", Key::of::<Clock>())
///     .keyword_only("verbose");
/// assert_eq!(sig.positional().count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a positional parameter.
    pub fn param(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, false)
    }

    /// Adds a positional parameter with a type annotation.
    pub fn annotated(self, name: impl Into<String>, annotation: impl Into<Key>) -> Self {
        self.push(name.into(), Some(annotation.into()), false)
    }

    /// Adds a keyword-only parameter.
    pub fn keyword_only(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None, true)
    }

    pub fn keyword_only_annotated(self, name: impl Into<String>, annotation: impl Into<Key>) -> Self {
        self.push(name.into(), Some(annotation.into()), true)
    }

    fn push(mut self, name: String, annotation: Option<Key>, keyword_only: bool) -> Self {
        self.params.push(Param {
            name,
            annotation,
            keyword_only,
        });
        self
    }

    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn positional(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| !p.keyword_only)
    }

    pub fn keyword(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.keyword_only)
    }
}

// ============================================================================
// Explicit injection
// ============================================================================

/// Builder for an [`Injected`] wrapper.
///
/// Positional keys are resolved in the order given and prepended to the
/// caller's arguments. Named keys fill named arguments the caller left out.
pub struct Inject {
    container: Arc<Container>,
    positional: Vec<Key>,
    named: Vec<(String, Key)>,
    signature: Option<Signature>,
}

impl Inject {
    pub fn new(container: &Arc<Container>) -> Self {
        Self {
            container: Arc::clone(container),
            positional: Vec::new(),
            named: Vec::new(),
            signature: None,
        }
    }

    /// Injects `key` as the next leading positional argument.
    pub fn arg(mut self, key: impl Into<Key>) -> Self {
        self.positional.push(key.into());
        self
    }

    pub fn args<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.positional.extend(keys.into_iter().map(Into::<Key>::into));
        self
    }

    /// Injects `key` as the named argument `name` unless the caller passes it.
    pub fn named(mut self, name: impl Into<String>, key: impl Into<Key>) -> Self {
        self.named.push((name.into(), key.into()));
        self
    }

    /// Attaches the target's full parameter list, for
    /// [`Injected::visible_params`].
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Wraps `target` and declares every injected key as a dependency of the
    /// wrapper's own token key.
    pub fn wrap<F, R>(self, target: F) -> Injected<F>
    where
        F: Fn(Args) -> Result<R>,
    {
        let id = Key::token();
        let keys = self
            .positional
            .iter()
            .chain(self.named.iter().map(|(_, key)| key));
        self.container.depends_on(&id, keys);
        Injected {
            id,
            container: self.container,
            positional: self.positional,
            named: self.named,
            signature: self.signature,
            target,
        }
    }
}

/// A callable with leading arguments supplied by the container.
pub struct Injected<F> {
    id: Key,
    container: Arc<Container>,
    positional: Vec<Key>,
    named: Vec<(String, Key)>,
    signature: Option<Signature>,
    target: F,
}

impl<F> Injected<F> {
    /// Token key under which the injected dependencies are declared.
    #[inline]
    pub fn id(&self) -> &Key {
        &self.id
    }

    pub fn dependencies(&self) -> HashSet<Key> {
        self.container.deps(&self.id)
    }

    /// Parameters a caller still has to supply: the attached signature minus
    /// the leading injected ones.
    pub fn visible_params(&self) -> Vec<&Param> {
        match &self.signature {
            Some(signature) => signature
                .params()
                .iter()
                .skip(self.positional.len())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolves the injected keys and invokes the target.
    ///
    /// Named arguments given by the caller take precedence over injected
    /// ones. Any resolution error is returned before the target runs.
    pub fn call<R>(&self, args: Args) -> Result<R>
    where
        F: Fn(Args) -> Result<R>,
    {
        ensure_declared(&self.container, &self.id)?;

        let Args {
            positional: caller_positional,
            mut named,
        } = args;

        let mut positional = self.container.resolve_many(&self.positional)?;
        positional.extend(caller_positional);

        for (name, key) in &self.named {
            if !named.contains_key(name) {
                let instance = self.container.resolve(key)?;
                named.insert(name.clone(), instance);
            }
        }

        trace!(id = %self.id, injected = self.positional.len(), "Calling injected target");
        (self.target)(Args { positional, named })
    }
}

impl<F> fmt::Debug for Injected<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injected")
            .field("id", &self.id)
            .field("positional", &self.positional)
            .field("named", &self.named)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Constructor injection
// ============================================================================

/// A type whose constructor takes resolved dependencies.
///
/// [`construct`](Injectable::construct) receives the resolved
/// [`dependencies`](Injectable::dependencies) first, in order, followed by
/// any caller arguments.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use kinject::{Args, Container, Injectable, Injector, Key, Result};
///
/// struct Repo {
///     dsn: Arc<String>,
///     table: Arc<&'static str>,
/// }
///
/// impl Injectable for Repo {
///     fn dependencies() -> Vec<Key> {
///         vec![Key::name("dsn")]
///     }
///
///     fn construct(args: Args) -> Result<Self> {
///         Ok(Repo { dsn: args.get(0)?, table: args.get(1)? })
///     }
/// }
///
/// let container = Container::new();
/// container.set_instance("dsn", "sqlite::memory:".to_string()).unwrap();
///
/// let repo: Repo = Injector::new(container).create(Args::new().with("users")).unwrap();
/// assert_eq!(*repo.dsn, "sqlite::memory:");
/// assert_eq!(*repo.table, "users");
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Key>;

    fn construct(args: Args) -> Result<Self>;
}

/// Resolves `T`'s dependencies and runs its constructor.
pub(crate) fn construct<T: Injectable>(container: &Container, args: Args) -> Result<T> {
    ensure_declared(container, &Key::of::<T>())?;

    let Args {
        positional: caller_positional,
        named,
    } = args;
    let mut positional = container.resolve_many(T::dependencies())?;
    positional.extend(caller_positional);
    T::construct(Args { positional, named })
}

// ============================================================================
// Lazy property
// ============================================================================

/// A lazily resolved dependency belonging to an owner type.
///
/// Created through [`Injector::inject_property`](crate::Injector::inject_property),
/// which declares the key as a dependency of `Key::of::<Owner>()`.
pub struct InjectedProperty<T> {
    container: Arc<Container>,
    key: Key,
    name: String,
    replace_on_access: bool,
    value: OnceLock<Arc<T>>,
}

impl<T: Any + Send + Sync> InjectedProperty<T> {
    pub(crate) fn new<Owner: ?Sized + 'static>(
        container: &Arc<Container>,
        key: Key,
        name: Option<&str>,
        replace_on_access: bool,
    ) -> Self {
        container.depends_on(Key::of::<Owner>(), [key.clone()]);
        let name = match name {
            Some(name) => name.to_string(),
            None => key.to_string(),
        };
        Self {
            container: Arc::clone(container),
            key,
            name,
            replace_on_access,
            value: OnceLock::new(),
        }
    }

    /// Resolves the value.
    ///
    /// With `replace_on_access` the first successful result is kept and every
    /// later access returns it; otherwise each access resolves again, which
    /// honours the provider's scope.
    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(value) = self.value.get() {
            return Ok(Arc::clone(value));
        }
        let value = self.container.resolve_as::<T>(&self.key)?;
        if self.replace_on_access {
            Ok(Arc::clone(self.value.get_or_init(|| value)))
        } else {
            Ok(value)
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// `true` once a memoized value replaced the lazy lookup.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T> fmt::Debug for InjectedProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedProperty")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("replace_on_access", &self.replace_on_access)
            .field("initialized", &self.value.get().is_some())
            .finish()
    }
}

// ============================================================================
// Automatic injection
// ============================================================================

/// Builder for an [`AutoInjected`] wrapper.
///
/// Parameters are matched by name against registered keys, so the result
/// depends on what is registered at call time.
pub struct AutoInject {
    container: Arc<Container>,
    signature: Signature,
    declared: Vec<Key>,
    named: Vec<(String, Key)>,
}

impl AutoInject {
    pub fn new(container: &Arc<Container>) -> Self {
        Self {
            container: Arc::clone(container),
            signature: Signature::new(),
            declared: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Declares `key` as a dependency of the wrapper.
    ///
    /// Declared keys are checked for a usable provider before every call.
    /// They take part in argument matching like any other registered key.
    pub fn arg(mut self, key: impl Into<Key>) -> Self {
        self.declared.push(key.into());
        self
    }

    pub fn args<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        self.declared.extend(keys.into_iter().map(Into::<Key>::into));
        self
    }

    /// Maps `name` to `key`. A parameter called `name` looks up `key` instead
    /// of its own name; otherwise `key` is injected as the named argument
    /// `name`.
    pub fn named(mut self, name: impl Into<String>, key: impl Into<Key>) -> Self {
        self.named.push((name.into(), key.into()));
        self
    }

    /// Wraps `target` and declares the given keys as dependencies of the
    /// wrapper's own token key.
    pub fn wrap<F, R>(self, target: F) -> AutoInjected<F>
    where
        F: Fn(Args) -> Result<R>,
    {
        let id = Key::token();
        let keys = self
            .declared
            .iter()
            .chain(self.named.iter().map(|(_, key)| key));
        self.container.depends_on(&id, keys);
        AutoInjected {
            id,
            container: self.container,
            signature: self.signature,
            named: self.named,
            target,
        }
    }
}

/// A callable whose arguments are matched to providers by parameter name.
pub struct AutoInjected<F> {
    id: Key,
    container: Arc<Container>,
    signature: Signature,
    named: Vec<(String, Key)>,
    target: F,
}

impl<F> AutoInjected<F> {
    /// Token key under which the declared dependencies are recorded.
    #[inline]
    pub fn id(&self) -> &Key {
        &self.id
    }

    pub fn dependencies(&self) -> HashSet<Key> {
        self.container.deps(&self.id)
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Builds the argument list and invokes the target.
    ///
    /// Each positional parameter, in order, takes the first of: the caller's
    /// named argument of the same name, the instance for its mapped key or
    /// its name, the instance for its annotation, the caller's next
    /// positional argument. Filling stops at the first parameter none of
    /// these cover, and leftover caller positionals are appended.
    ///
    /// Keyword-only parameters the caller did not pass are injected when a
    /// matching key is registered. Mapped names not used by any parameter are
    /// injected as named arguments. Caller named arguments always win.
    ///
    /// Declared dependencies without a usable provider fail the call before
    /// anything is resolved.
    pub fn call<R>(&self, args: Args) -> Result<R>
    where
        F: Fn(Args) -> Result<R>,
    {
        ensure_declared(&self.container, &self.id)?;
        let Args {
            positional: caller_positional,
            named: mut caller_named,
        } = args;
        let mut caller_positional = caller_positional.into_iter();
        let mut consumed: HashSet<&str> = HashSet::new();
        let mut positional = Vec::new();
        let mut named = HashMap::new();

        for param in self.signature.positional() {
            consumed.insert(param.name());
            if let Some(instance) = caller_named.remove(param.name()) {
                positional.push(instance);
            } else if let Some(key) = self.lookup(param) {
                positional.push(self.container.resolve(&key)?);
            } else if let Some(instance) = caller_positional.next() {
                positional.push(instance);
            } else {
                break;
            }
        }
        positional.extend(caller_positional);

        for param in self.signature.keyword() {
            consumed.insert(param.name());
            if caller_named.contains_key(param.name()) {
                continue;
            }
            if let Some(key) = self.lookup(param) {
                named.insert(param.name().to_string(), self.container.resolve(&key)?);
            }
        }

        for (name, key) in &self.named {
            if consumed.contains(name.as_str()) || caller_named.contains_key(name) {
                continue;
            }
            named.insert(name.clone(), self.container.resolve(key)?);
        }

        named.extend(caller_named);
        trace!(positional = positional.len(), named = named.len(), "Calling auto-injected target");
        (self.target)(Args { positional, named })
    }

    fn lookup(&self, param: &Param) -> Option<Key> {
        let primary = self
            .named
            .iter()
            .find(|(name, _)| name == param.name())
            .map(|(_, key)| key.clone())
            .unwrap_or_else(|| Key::name(param.name()));
        if self.container.has(&primary) {
            return Some(primary);
        }
        param
            .annotation()
            .filter(|key| self.container.has(*key))
            .cloned()
    }
}

impl<F> fmt::Debug for AutoInjected<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoInjected")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("named", &self.named)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Injector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn injector() -> Injector {
        let container = Container::new();
        container.register_factory("apple", |_| "apple".to_string()).unwrap();
        container.register_factory("pear", |_| "pear".to_string()).unwrap();
        Injector::new(container)
    }

    #[test]
    fn test_args_typed_access() {
        let args = Args::new().with(1u32).with("two").with_named("three", 3i64);
        assert_eq!(*args.get::<u32>(0).unwrap(), 1);
        assert_eq!(*args.get::<&str>(1).unwrap(), "two");
        assert_eq!(*args.named::<i64>("three").unwrap(), 3);
        assert_eq!(args.len(), 2);

        assert!(matches!(args.get::<u32>(5), Err(DiError::MissingArgument { .. })));
        assert!(matches!(args.named::<u32>("four"), Err(DiError::MissingArgument { .. })));
        assert!(matches!(args.get::<String>(0), Err(DiError::TypeMismatch { .. })));
    }

    #[test]
    fn test_inject_prepends_and_keeps_extra_args() {
        let injector = injector();
        let f = injector.inject().arg("apple").wrap(|args: Args| {
            Ok((args.get::<String>(0)?, args.get::<i32>(1)?))
        });

        let (apple, n) = f.call(Args::new().with(5i32)).unwrap();
        assert_eq!(*apple, "apple");
        assert_eq!(*n, 5);
    }

    #[test]
    fn test_inject_positional_order() {
        let injector = injector();
        let f = injector.inject().args(["pear", "apple"]).wrap(|args: Args| {
            Ok(format!("{}+{}", args.get::<String>(0)?, args.get::<String>(1)?))
        });
        assert_eq!(f.call(Args::new()).unwrap(), "pear+apple");
    }

    #[test]
    fn test_inject_caller_named_wins() {
        let injector = injector();
        let f = injector
            .inject()
            .named("fruit", "apple")
            .wrap(|args: Args| Ok(args.named::<String>("fruit")?.to_string()));

        assert_eq!(f.call(Args::new()).unwrap(), "apple");
        let overridden = f.call(Args::new().with_named("fruit", "kiwi".to_string()));
        assert_eq!(overridden.unwrap(), "kiwi");
    }

    #[test]
    fn test_inject_declares_dependencies() {
        let injector = injector();
        let f = injector
            .inject()
            .arg("apple")
            .named("p", "pear")
            .wrap(|_: Args| Ok(()));
        let deps = f.dependencies();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(&Key::name("pear")));
        assert_eq!(injector.container().deps(f.id()), deps);
    }

    #[test]
    fn test_inject_missing_dependency_skips_target() {
        let injector = injector();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = {
            let calls = Arc::clone(&calls);
            injector.inject().arg("banana").wrap(move |_: Args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        match f.call(Args::new()) {
            Err(DiError::Unresolvable { missing, .. }) => assert_eq!(missing, vec![Key::name("banana")]),
            other => panic!("expected Unresolvable, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn broken_injector() -> Injector {
        let container = Container::new();
        container
            .register_try_factory("broken", "transient", |_| -> Result<String> {
                Err(DiError::factory("broken", "connection refused"))
            })
            .unwrap();
        container.register_factory("apple", |_| "apple".to_string()).unwrap();
        Injector::new(container)
    }

    #[test]
    fn test_inject_factory_error_skips_target() {
        let injector = broken_injector();
        let calls = Arc::new(AtomicUsize::new(0));

        let positional = {
            let calls = Arc::clone(&calls);
            injector.inject().arg("apple").arg("broken").wrap(move |_: Args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        assert!(matches!(
            positional.call(Args::new()),
            Err(DiError::Factory { .. })
        ));

        let named = {
            let calls = Arc::clone(&calls);
            injector.inject().named("conn", "broken").wrap(move |_: Args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        assert!(matches!(named.call(Args::new()), Err(DiError::Factory { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // A caller-supplied value means the broken key is never resolved.
        let args = Args::new().with_named("conn", "fake".to_string());
        named.call(args).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_visible_params_drop_injected() {
        let injector = injector();
        let f = injector
            .inject()
            .arg("apple")
            .signature(Signature::new().param("apple").param("count").keyword_only("loud"))
            .wrap(|_: Args| Ok(()));
        let visible = f.visible_params();
        let visible: Vec<&str> = visible.iter().map(|p| p.name()).collect();
        assert_eq!(visible, vec!["count", "loud"]);
    }

    struct Basket {
        apple: Arc<String>,
        size: Arc<usize>,
    }

    impl Injectable for Basket {
        fn dependencies() -> Vec<Key> {
            vec![Key::name("apple")]
        }

        fn construct(args: Args) -> Result<Self> {
            Ok(Basket {
                apple: args.get(0)?,
                size: args.get(1)?,
            })
        }
    }

    #[test]
    fn test_create_injectable() {
        let injector = injector();
        let basket: Basket = injector.create(Args::new().with(3usize)).unwrap();
        assert_eq!(*basket.apple, "apple");
        assert_eq!(*basket.size, 3);
        assert!(injector
            .container()
            .deps(Key::of::<Basket>())
            .contains(&Key::name("apple")));
    }

    #[test]
    fn test_register_injectable_missing_dependency() {
        struct Juice(Arc<String>);

        impl Injectable for Juice {
            fn dependencies() -> Vec<Key> {
                vec![Key::name("orange")]
            }

            fn construct(args: Args) -> Result<Self> {
                Ok(Juice(args.get(0)?))
            }
        }

        let container = Container::new();
        container.register_injectable::<Juice>("transient").unwrap();
        assert!(matches!(container.get::<Juice>(), Err(DiError::Unresolvable { .. })));

        container.set_instance("orange", "orange".to_string()).unwrap();
        assert_eq!(*container.get::<Juice>().unwrap().0, "orange");
    }

    #[test]
    fn test_property_memoizes_when_replacing() {
        struct Owner;

        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            container
                .register_factory_in("n", "transient", move |_| calls.fetch_add(1, Ordering::SeqCst))
                .unwrap();
        }
        let injector = Injector::new(container);

        let lazy = injector.inject_property::<Owner, usize>("n", None, true);
        assert_eq!(lazy.name(), "n");
        assert!(!lazy.is_initialized());
        assert_eq!(*lazy.get().unwrap(), 0);
        assert_eq!(*lazy.get().unwrap(), 0);
        assert!(lazy.is_initialized());

        let live = injector.inject_property::<Owner, usize>("n", Some("counter"), false);
        assert_eq!(live.name(), "counter");
        assert_eq!(*live.get().unwrap(), 1);
        assert_eq!(*live.get().unwrap(), 2);
        assert!(!live.is_initialized());

        assert!(injector.container().deps(Key::of::<Owner>()).contains(&Key::name("n")));
    }

    #[test]
    fn test_property_resolution_error_is_not_cached() {
        struct Owner;

        let injector = Injector::new(Container::new());
        let lazy = injector.inject_property::<Owner, String>("late", None, true);
        assert!(lazy.get().is_err());

        injector.container().set_instance("late", "here".to_string()).unwrap();
        assert_eq!(*lazy.get().unwrap(), "here");
    }

    #[test]
    fn test_auto_inject_matches_names() {
        let injector = injector();
        let f = injector
            .auto_inject()
            .signature(Signature::new().param("apple").param("count"))
            .wrap(|args: Args| Ok((args.get::<String>(0)?, args.get::<i32>(1)?)));

        let (apple, count) = f.call(Args::new().with(5i32)).unwrap();
        assert_eq!(*apple, "apple");
        assert_eq!(*count, 5);
    }

    #[test]
    fn test_auto_inject_named_mapping_and_annotation() {
        struct Pear;

        let container = Container::new();
        container.register_factory("apple", |_| "apple".to_string()).unwrap();
        container.register_factory(Key::of::<Pear>(), |_| "typed pear".to_string()).unwrap();
        let injector = Injector::new(container);

        let f = injector
            .auto_inject()
            .signature(
                Signature::new()
                    .param("fruit")
                    .annotated("other", Key::of::<Pear>()),
            )
            .named("fruit", "apple")
            .wrap(|args: Args| Ok(format!("{}/{}", args.get::<String>(0)?, args.get::<String>(1)?)));

        assert_eq!(f.call(Args::new()).unwrap(), "apple/typed pear");
    }

    #[test]
    fn test_auto_inject_caller_named_overrides() {
        let injector = injector();
        let f = injector
            .auto_inject()
            .signature(Signature::new().param("apple").keyword_only("pear"))
            .wrap(|args: Args| Ok(format!("{}/{}", args.get::<String>(0)?, args.named::<String>("pear")?)));

        assert_eq!(f.call(Args::new()).unwrap(), "apple/pear");

        let args = Args::new()
            .with_named("apple", "green".to_string())
            .with_named("pear", "nashi".to_string());
        assert_eq!(f.call(args).unwrap(), "green/nashi");
    }

    #[test]
    fn test_auto_inject_stops_at_unfillable_param() {
        let injector = injector();
        let f = injector
            .auto_inject()
            .signature(Signature::new().param("apple").param("missing").param("pear"))
            .wrap(|args: Args| Ok(args.len()));

        // "missing" is neither registered nor supplied, so "pear" is not
        // injected either.
        assert_eq!(f.call(Args::new()).unwrap(), 1);
    }

    #[test]
    fn test_auto_inject_factory_error_skips_target() {
        let injector = broken_injector();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = {
            let calls = Arc::clone(&calls);
            injector
                .auto_inject()
                .signature(Signature::new().param("apple").param("broken"))
                .wrap(move |_: Args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
        };

        assert!(matches!(f.call(Args::new()), Err(DiError::Factory { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_auto_inject_declares_dependencies() {
        let injector = injector();
        let graph_before = injector.container().graph().len();
        let calls = Arc::new(AtomicUsize::new(0));
        let f = {
            let calls = Arc::clone(&calls);
            injector
                .auto_inject()
                .arg("apple")
                .named("x", "missing")
                .wrap(move |_: Args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
        };

        assert_eq!(injector.container().graph().len(), graph_before + 1);
        let deps = f.dependencies();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(&Key::name("apple")));
        assert_eq!(injector.container().deps(f.id()), deps);

        match f.call(Args::new()) {
            Err(DiError::Unresolvable { key, missing }) => {
                assert_eq!(&key, f.id());
                assert_eq!(missing, vec![Key::name("missing")]);
            }
            other => panic!("expected Unresolvable, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        injector.container().set_instance("missing", 1u8).unwrap();
        f.call(Args::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_inject_unconsumed_named_keys() {
        let injector = injector();
        let f = injector
            .auto_inject()
            .named("extra", "pear")
            .wrap(|args: Args| Ok(args.named::<String>("extra")?.to_string()));
        assert_eq!(f.call(Args::new()).unwrap(), "pear");
    }
}
