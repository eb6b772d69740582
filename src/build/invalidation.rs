//! Invalidation cache boundary.
//!
//! The engine instructs an external cache to drop derivations keyed by a
//! changed dependency before any render that depends on it starts.

use std::sync::Arc;

use super::keys::DependencyKey;

/// A keyed cache whose entries the engine can discard.
///
/// `invalidate` must be a no-op for keys without an entry and must not fail.
pub trait InvalidationCache: Send + Sync {
    fn invalidate(&self, key: &DependencyKey);
}

impl<T: InvalidationCache + ?Sized> InvalidationCache for Arc<T> {
    fn invalidate(&self, key: &DependencyKey) {
        (**self).invalidate(key)
    }
}
