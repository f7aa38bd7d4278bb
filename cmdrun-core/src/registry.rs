//! Explicit service registry used to wire collaborators together.
//!
//! Callers construct and pass it around; there is no process-wide instance.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Values and factories keyed by type.
///
/// Register trait objects behind a cloneable handle, e.g.
/// `registry.register::<Arc<dyn Console>>(Arc::new(ConsoleManager::new("app", false)))`.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    factories: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing any earlier value of the same type.
    pub fn register<T>(&mut self, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.services.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Store a factory called on every lookup that finds no registered value.
    pub fn register_factory<T, F>(&mut self, factory: F)
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory<T> = Box::new(factory);
        self.factories.insert(TypeId::of::<T>(), Box::new(factory));
    }

    /// Registered value if any, else a fresh one from the factory.
    pub fn get<T>(&self) -> Option<T>
    where
        T: Clone + 'static,
    {
        let key = TypeId::of::<T>();
        if let Some(value) = self.services.get(&key).and_then(|v| v.downcast_ref::<T>()) {
            return Some(value.clone());
        }
        self.factories
            .get(&key)
            .and_then(|f| f.downcast_ref::<Factory<T>>())
            .map(|factory| factory())
    }

    pub fn has<T: 'static>(&self) -> bool {
        let key = TypeId::of::<T>();
        self.services.contains_key(&key) || self.factories.contains_key(&key)
    }

    /// Drop both the value and the factory for `T`.
    pub fn remove<T: 'static>(&mut self) {
        let key = TypeId::of::<T>();
        self.services.remove(&key);
        self.factories.remove(&key);
    }

    pub fn clear(&mut self) {
        self.services.clear();
        self.factories.clear();
    }

    /// Number of distinct registered types.
    pub fn len(&self) -> usize {
        self.services.len()
            + self
                .factories
                .keys()
                .filter(|k| !self.services.contains_key(*k))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.factories.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}
