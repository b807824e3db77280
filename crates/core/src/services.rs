//! Type-keyed shared objects.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared objects handed to action bodies, middleware and tasks, keyed by
/// type.
///
/// The engine inserts its `Api` here so actions and tasks can reach the
/// registries without a global.
#[derive(Clone, Default)]
pub struct Services {
    entries: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Services {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value`, replacing any earlier value of the same type.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(self, value: Arc<T>) -> Self {
        let mut entries: HashMap<_, _> = (*self.entries).clone();
        entries.insert(TypeId::of::<T>(), value as Arc<dyn Any + Send + Sync>);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// The value of type `T`, if present.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock(u64);

    #[test]
    fn services_are_typed() {
        let services = Services::new().with(Arc::new(Clock(7)));
        assert_eq!(services.get::<Clock>().as_deref(), Some(&Clock(7)));
        assert!(services.get::<String>().is_none());
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn with_replaces_same_type() {
        let services = Services::new()
            .with(Arc::new(Clock(1)))
            .with(Arc::new(Clock(2)));
        assert_eq!(services.len(), 1);
        assert_eq!(services.get::<Clock>().map(|c| c.0), Some(2));
    }
}
