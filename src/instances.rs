//! Instance registry for managed singletons
//!
//! Built incrementally during initialization, then treated as read-only
//! while requests are served. Uses `DashMap` with `ahash` so steady-state
//! concurrent reads are lock-free.

use crate::registry::TypeKey;
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Downcast an `Arc<dyn Any + Send + Sync>` to `Arc<T>` without runtime type checking.
///
/// # Safety
///
/// This is safe when the `Arc` was originally created from a value of type
/// `T`. In this crate that is guaranteed because instances are keyed by
/// their target's `TypeId` at insertion and looked up by the same
/// `TypeId::of::<T>()`.
#[inline]
pub(crate) unsafe fn downcast_arc_unchecked<T: Send + Sync + 'static>(
    arc: Arc<dyn Any + Send + Sync>,
) -> Arc<T> {
    let ptr = Arc::into_raw(arc);
    // SAFETY: ptr came from Arc::into_raw and the caller guarantees T is correct
    unsafe { Arc::from_raw(ptr as *const T) }
}

/// Thread-safe map from target type to its managed singleton.
///
/// Once a type has an entry, no container may overwrite it: insertion is
/// first-wins, which is what makes construction idempotent across the
/// initializer's passes.
pub struct InstanceRegistry {
    instances: DashMap<TypeId, Arc<dyn Any + Send + Sync>, RandomState>,
}

impl InstanceRegistry {
    /// Create empty storage with a small shard count.
    ///
    /// 8 shards balances creation overhead against read concurrency for
    /// the typical container of well under a hundred singletons.
    #[inline]
    pub fn new() -> Self {
        Self {
            instances: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
        }
    }

    /// Insert an instance for a target. Returns `false` (and leaves the
    /// existing entry untouched) when the target already has one.
    pub fn insert(&self, key: TypeKey, instance: Arc<dyn Any + Send + Sync>) -> bool {
        if self.instances.contains_key(&key.id()) {
            return false;
        }
        self.instances.insert(key.id(), instance);
        true
    }

    #[inline]
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.instances.contains_key(&key.id())
    }

    /// Type-erased lookup by target key.
    #[inline]
    pub fn get_raw(&self, key: &TypeKey) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instances.get(&key.id()).map(|e| Arc::clone(e.value()))
    }

    /// Typed lookup.
    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instances.get(&TypeId::of::<T>()).map(|e| {
            // SAFETY: We looked up by TypeId::of::<T>(), so the entry was
            // inserted under the same TypeId and stores type T.
            unsafe { downcast_arc_unchecked(Arc::clone(e.value())) }
        })
    }

    /// All registered type ids.
    pub fn type_ids(&self) -> Vec<TypeId> {
        self.instances.iter().map(|e| *e.key()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService {
        value: i32,
    }

    #[test]
    fn insert_and_typed_get() {
        let registry = InstanceRegistry::new();
        assert!(registry.insert(
            TypeKey::of::<TestService>(),
            Arc::new(TestService { value: 42 })
        ));

        let service = registry.get::<TestService>().unwrap();
        assert_eq!(service.value, 42);
    }

    #[test]
    fn insertion_is_first_wins() {
        let registry = InstanceRegistry::new();
        let key = TypeKey::of::<TestService>();
        assert!(registry.insert(key, Arc::new(TestService { value: 1 })));
        assert!(!registry.insert(key, Arc::new(TestService { value: 2 })));

        let service = registry.get::<TestService>().unwrap();
        assert_eq!(service.value, 1);
    }

    #[test]
    fn typed_get_returns_same_arc() {
        let registry = InstanceRegistry::new();
        registry.insert(
            TypeKey::of::<TestService>(),
            Arc::new(TestService { value: 7 }),
        );

        let a = registry.get::<TestService>().unwrap();
        let b = registry.get::<TestService>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
