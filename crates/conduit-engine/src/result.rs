//! Type-erased handler results.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// The value a handler produces on success.
///
/// Holds any `Send + Sync` value behind an `Arc` and remembers its concrete
/// type, which is what the dispatcher routes on. Cloning shares the value.
#[derive(Clone)]
pub struct IntentResult {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl IntentResult {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Shared handle to the typed value.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl fmt::Debug for IntentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentResult")
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Catalog {
        entries: usize,
    }

    #[test]
    fn test_typed_access() {
        let result = IntentResult::new(Catalog { entries: 3 });
        assert!(result.is::<Catalog>());
        assert!(!result.is::<String>());
        assert_eq!(result.downcast_ref::<Catalog>(), Some(&Catalog { entries: 3 }));
        assert!(result.downcast_ref::<String>().is_none());
        assert!(result.type_name().ends_with("Catalog"));
    }

    #[test]
    fn test_clone_shares_value() {
        let result = IntentResult::new(String::from("seed"));
        let copy = result.clone();
        let a = result.downcast::<String>().unwrap();
        let b = copy.downcast::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(copy.type_id(), TypeId::of::<String>());
    }

    #[test]
    fn test_debug_shows_type_name() {
        let result = IntentResult::new(5u32);
        assert_eq!(format!("{result:?}"), "IntentResult { type: \"u32\" }");
    }
}
