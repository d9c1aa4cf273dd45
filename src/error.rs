use std::fmt;

use thiserror::Error;

use crate::key::Key;

/// Result alias used throughout the crate.
pub type Result<T, E = DiError> = std::result::Result<T, E>;

/// Errors raised while registering or resolving providers.
#[derive(Error, Debug)]
pub enum DiError {
    /// A provider is already registered under this key.
    #[error("provider key already registered: {key}")]
    DuplicateKey { key: Key },

    /// No scope matches the given reference.
    #[error("scope is not known: {name}")]
    UnknownScope { name: String },

    /// No provider is registered under this key.
    #[error("provider not registered: {key}")]
    NotRegistered { key: Key },

    /// The key declares dependencies that have no usable provider.
    #[error("missing dependencies for {key}: {}", KeyList(.missing))]
    Unresolvable { key: Key, missing: Vec<Key> },

    /// The provider has neither a cached instance nor a factory.
    #[error("provider for {key} has no instance and no factory")]
    Unprovidable { key: Key },

    /// The resolved instance is not of the requested type.
    #[error("instance for {key} is not a {expected}")]
    TypeMismatch { key: Key, expected: &'static str },

    /// A call argument expected by an injected target was not supplied.
    #[error("missing argument: {name}")]
    MissingArgument { name: String },

    /// A factory chain resolved a key that was already being resolved.
    #[error("circular dependency: {}", KeyPath(.path))]
    CircularDependency { path: Vec<Key> },

    /// Nested resolution went deeper than the configured limit.
    #[error("resolution depth {depth} exceeded while resolving {key}")]
    DepthExceeded { key: Key, depth: usize },

    /// A fallible factory returned an error.
    #[error("factory for {key} failed: {source}")]
    Factory {
        key: Key,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DiError {
    /// Wraps an arbitrary factory error.
    pub fn factory<E>(key: impl Into<Key>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Factory {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Returns the keys reported missing, if this is an `Unresolvable` error.
    pub fn missing(&self) -> &[Key] {
        match self {
            Self::Unresolvable { missing, .. } => missing,
            _ => &[],
        }
    }
}

struct KeyList<'a>(&'a [Key]);

impl fmt::Display for KeyList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

struct KeyPath<'a>(&'a [Key]);

impl fmt::Display for KeyPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolvable_lists_missing_keys() {
        let err = DiError::Unresolvable {
            key: Key::name("a"),
            missing: vec![Key::name("b"), Key::name("c")],
        };
        assert_eq!(err.to_string(), "missing dependencies for a: b, c");
        assert_eq!(err.missing().len(), 2);
    }

    #[test]
    fn test_cycle_path_display() {
        let err = DiError::CircularDependency {
            path: vec![Key::name("a"), Key::name("b"), Key::name("a")],
        };
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");
        assert!(err.missing().is_empty());
    }

    #[test]
    fn test_factory_error_keeps_source() {
        let err = DiError::factory("db", "connection refused");
        assert_eq!(err.to_string(), "factory for db failed: connection refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
