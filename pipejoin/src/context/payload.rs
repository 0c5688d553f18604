//! Thread-safe, type-keyed payload storage.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type PayloadValue = Arc<dyn Any + Send + Sync>;

/// A thread-safe cache holding at most one payload per type.
///
/// Factories run outside the lock. When two callers race to create the same
/// payload, the first insert wins and both observe the stored instance.
#[derive(Default)]
pub struct PayloadCache {
    payloads: RwLock<HashMap<TypeId, PayloadValue>>,
}

impl PayloadCache {
    /// Creates an empty payload cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a payload of type `P` is present.
    #[must_use]
    pub fn contains<P: Any + Send + Sync>(&self) -> bool {
        self.payloads.read().contains_key(&TypeId::of::<P>())
    }

    /// Gets the payload of type `P`, if present.
    #[must_use]
    pub fn get<P: Any + Send + Sync>(&self) -> Option<Arc<P>> {
        let value = self.payloads.read().get(&TypeId::of::<P>()).cloned()?;
        value.downcast::<P>().ok()
    }

    /// Returns the payload of type `P`, creating it with `factory` if missing.
    pub fn get_or_add<P, F>(&self, factory: F) -> Arc<P>
    where
        P: Any + Send + Sync,
        F: FnOnce() -> P,
    {
        self.get_or_add_shared(|| Arc::new(factory()))
    }

    /// Returns the payload of type `P`, storing the `Arc` produced by
    /// `factory` if missing.
    pub fn get_or_add_shared<P, F>(&self, factory: F) -> Arc<P>
    where
        P: Any + Send + Sync,
        F: FnOnce() -> Arc<P>,
    {
        if let Some(existing) = self.get::<P>() {
            return existing;
        }

        let created = factory();
        let stored = {
            let mut payloads = self.payloads.write();
            payloads
                .entry(TypeId::of::<P>())
                .or_insert_with(|| created.clone() as PayloadValue)
                .clone()
        };

        stored.downcast::<P>().unwrap_or(created)
    }

    /// Adds a payload of type `P`, or replaces the existing one with the
    /// value returned by `update`.
    ///
    /// Both closures run outside the lock; if another writer changes the
    /// slot in between, the operation is retried against the new value.
    pub fn add_or_update<P, A, U>(&self, add: A, update: U) -> Arc<P>
    where
        P: Any + Send + Sync,
        A: Fn() -> P,
        U: Fn(&P) -> P,
    {
        let key = TypeId::of::<P>();
        loop {
            let current = self.get::<P>();
            let next: Arc<P> = Arc::new(current.as_deref().map_or_else(&add, &update));

            let mut payloads = self.payloads.write();
            let unchanged = match (payloads.get(&key), &current) {
                (None, None) => true,
                (Some(stored), Some(seen)) => {
                    let seen: PayloadValue = seen.clone();
                    Arc::ptr_eq(stored, &seen)
                }
                _ => false,
            };

            if unchanged {
                payloads.insert(key, next.clone() as PayloadValue);
                return next;
            }
        }
    }

    /// Returns the number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.read().len()
    }

    /// Returns true if no payloads are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.read().is_empty()
    }
}

impl std::fmt::Debug for PayloadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCache")
            .field("len", &self.len())
            .finish()
    }
}
