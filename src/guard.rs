//! Runtime cycle detection for nested resolution.
//!
//! Each thread keeps the stack of `(container, key)` pairs it is currently
//! resolving. Entering a pair that is already on the stack means a factory
//! chain loops back on itself, unless the provider does not memoize, in which
//! case re-entry is legitimate recursion bounded only by the depth limit.

use std::cell::RefCell;

use crate::error::{DiError, Result};
use crate::key::Key;

thread_local! {
    static RESOLVING: RefCell<Vec<(u64, Key)>> = const { RefCell::new(Vec::new()) };
}

/// Pops its entry off the thread's resolution stack when dropped.
#[must_use]
pub(crate) struct ResolutionGuard {
    _private: (),
}

impl ResolutionGuard {
    /// Pushes `(owner, key)`.
    ///
    /// `owner` identifies the resolving container, so the same key resolved
    /// through two containers is never mistaken for a cycle. With
    /// `reentrant` the key may already be on the stack.
    pub(crate) fn enter(owner: u64, key: &Key, max_depth: usize, reentrant: bool) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if !reentrant {
                if let Some(pos) = stack.iter().position(|(o, k)| *o == owner && k == key) {
                    let mut path: Vec<Key> = stack[pos..].iter().map(|(_, k)| k.clone()).collect();
                    path.push(key.clone());
                    return Err(DiError::CircularDependency { path });
                }
            }
            if stack.len() >= max_depth {
                return Err(DiError::DepthExceeded {
                    key: key.clone(),
                    depth: stack.len() + 1,
                });
            }
            stack.push((owner, key.clone()));
            Ok(Self { _private: () })
        })
    }

    #[cfg(test)]
    pub(crate) fn depth() -> usize {
        RESOLVING.with(|stack| stack.borrow().len())
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
