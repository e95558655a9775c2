//! Execution context threaded through handlers and consumers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque ambient environment for an operation.
///
/// A type-keyed bag of shared services (UI root, configuration, session
/// state, ...). The engine never looks inside; it only clones the handle and
/// passes it along. Cloning is cheap.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    services: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a context that also carries `service`, replacing any previous
    /// service of the same type.
    pub fn with<T: Any + Send + Sync>(self, service: T) -> Self {
        let mut services = (*self.services).clone();
        services.insert(TypeId::of::<T>(), Arc::new(service));
        Self {
            services: Arc::new(services),
        }
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| Arc::clone(service).downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("services", &self.services.len())
            .finish()
    }
}
