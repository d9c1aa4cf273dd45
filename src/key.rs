use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Key
// ============================================================================

/// Opaque identifier for a provider or a dependency consumer.
///
/// A key is either a string name, the identity of a Rust type, or a unique
/// token minted for anonymous consumers such as wrapped closures.
///
/// # Example
///
/// ```rust
/// use kinject::Key;
///
/// struct Database;
///
/// assert_eq!(Key::name("db"), Key::from("db"));
/// assert_eq!(Key::of::<Database>(), Key::of::<Database>());
/// assert_ne!(Key::token(), Key::token());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A string name such as `"db"`.
    Name(Arc<str>),
    /// The identity of a Rust type.
    Type {
        id: TypeId,
        type_name: &'static str,
    },
    /// A unique identity handed out by [`Key::token`].
    Token(u64),
}

impl Key {
    /// Creates a name key.
    #[inline]
    pub fn name(name: impl Into<Arc<str>>) -> Self {
        Self::Name(name.into())
    }

    /// Creates a key from the identity of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Mints a key that is distinct from every other key.
    pub fn token() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self::Token(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the name if this is a name key.
    #[inline]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name.into())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Type { type_name, .. } => f.write_str(type_name),
            Self::Token(n) => write!(f, "#{}", n),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "Key({:?})", name),
            Self::Type { type_name, .. } => write!(f, "Key(<{}>)", type_name),
            Self::Token(n) => write!(f, "Key(#{})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn test_name_keys_compare_by_value() {
        assert_eq!(Key::name("db"), Key::from("db".to_string()));
        assert_ne!(Key::name("db"), Key::name("cache"));
        assert_eq!(Key::name("db").as_name(), Some("db"));
    }

    #[test]
    fn test_type_key_display() {
        let key = Key::of::<Marker>();
        assert!(key.to_string().ends_with("Marker"));
        assert_eq!(key.as_name(), None);
        assert_ne!(key, Key::of::<String>());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Key::token();
        let b = Key::token();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with('#'));
    }
}
