//! # kinject
//!
//! A keyed, scope-aware dependency injection container.
//!
//! Providers (a factory plus a lifetime scope) are registered under opaque
//! [`Key`]s. Consumers declare the keys they need and receive resolved,
//! possibly cached instances without calling factories themselves.
//!
//! ## Features
//!
//! - **Scopes**: `singleton`/`global`, `process`, `thread`, `none`/`transient`,
//!   proxy and namespaced proxy stores, plus user-defined [`ScopeStore`]s
//! - **Missing-dependency checks**: declared dependencies are verified before a
//!   factory runs
//! - **Cycle detection**: a factory chain that loops back fails with
//!   [`DiError::CircularDependency`] instead of overflowing the stack
//! - **Injection adapters**: explicit ([`Inject`]), lazy properties
//!   ([`InjectedProperty`]), name-matched ([`AutoInject`]) and constructor
//!   injection ([`Injectable`])
//! - **Catalogs**: unbound provider declarations that can be imported into any
//!   container
//! - **Thread-safe**: built on `parking_lot` locks; memoizing scopes run each
//!   factory at most once per partition
//!
//! ## Quick Start
//!
//! ```rust
//! use kinject::{Args, ContainerBuilder, Key};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let injector = ContainerBuilder::new()
//!     .factory(Key::of::<Database>(), |_| Database { url: "postgres://localhost".into() })
//!     .factory_in("request_id", "transient", |_| 7u64)
//!     .build_injector()
//!     .unwrap();
//!
//! let db = injector.container().get::<Database>().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//!
//! let handler = injector
//!     .inject()
//!     .arg(Key::of::<Database>())
//!     .arg("request_id")
//!     .wrap(|args| {
//!         let db = args.get::<Database>(0)?;
//!         let id = args.get::<u64>(1)?;
//!         Ok(format!("{} #{}", db.url, id))
//!     });
//! assert_eq!(handler.call(Args::new()).unwrap(), "postgres://localhost #7");
//! ```

mod catalog;
mod container;
mod error;
mod guard;
mod inject;
mod key;
mod provider;
mod registry;
mod scope;

pub use catalog::{Catalog, CatalogEntry};
pub use container::{Container, ContainerBuilder, ContainerConfig, Injector};
pub use error::{DiError, Result};
pub use inject::{
    Args, AutoInject, AutoInjected, Inject, Injectable, Injected, InjectedProperty, Param, Signature,
};
pub use key::Key;
pub use provider::{Factory, Provider};
pub use registry::{DependencyGraph, ProviderRegistry};
pub use scope::{
    Instance, InstanceMap, NamespacedProxyScope, NoneScope, Partition, ProcessScope, ProxyScope,
    ScopeFactory, ScopeKind, ScopeRef, ScopeRegistry, ScopeStore, SingletonScope, SlotKey,
    ThreadScope,
};
