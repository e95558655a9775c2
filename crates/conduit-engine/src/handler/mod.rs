//! Handler trait and catalog.
//!
//! A handler is created fresh for every operation by its factory, then
//! invoked once with the intent, the execution context and a
//! [`CompletionSink`] through which it reports its outcome.

pub mod sink;

pub use sink::{CompletionSink, Signal};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use conduit_core::intent::Intent;
use conduit_core::types::HandlerId;

use crate::context::ExecutionContext;
use crate::error::{HandlerError, IntentError};

/// Something that can act on an intent.
///
/// Implementations report exactly one outcome through `sink`. Returning
/// without signalling counts as an abandoned operation. Handlers may hand the
/// sink to another task and return early; the operation stays open until the
/// sink is consumed or dropped.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, intent: &Intent, context: &ExecutionContext, sink: CompletionSink);
}

/// Produces a handler instance for one operation.
pub type HandlerFactory =
    Arc<dyn Fn() -> Result<Arc<dyn IntentHandler>, HandlerError> + Send + Sync>;

/// Factory that hands out clones of one shared instance.
pub fn shared<H: IntentHandler + 'static>(handler: H) -> HandlerFactory {
    let handler: Arc<dyn IntentHandler> = Arc::new(handler);
    Arc::new(move || Ok(Arc::clone(&handler)))
}

/// Factory that builds a new instance per operation.
pub fn per_operation<H, F>(build: F) -> HandlerFactory
where
    H: IntentHandler + 'static,
    F: Fn() -> Result<H, HandlerError> + Send + Sync + 'static,
{
    Arc::new(move || build().map(|h| Arc::new(h) as Arc<dyn IntentHandler>))
}

/// Identifies one factory installed under a handler id, so removing a
/// stale registration cannot take out the factory that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryGeneration(u64);

struct CatalogEntry {
    generation: FactoryGeneration,
    factory: HandlerFactory,
}

/// Maps handler identities to their factories.
#[derive(Default)]
pub struct HandlerCatalog {
    entries: RwLock<HashMap<HandlerId, CatalogEntry>>,
    next_generation: AtomicU64,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a factory under `id`, replacing any existing one.
    pub fn register(&self, id: HandlerId, factory: HandlerFactory) -> FactoryGeneration {
        let generation = FactoryGeneration(self.next_generation.fetch_add(1, Ordering::Relaxed));
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), CatalogEntry { generation, factory });
        if previous.is_some() {
            tracing::warn!(handler = %id, "Replaced existing handler factory");
        } else {
            tracing::debug!(handler = %id, "Registered handler factory");
        }
        generation
    }

    /// Remove whatever factory is installed under `id`.
    pub fn unregister(&self, id: &HandlerId) -> Option<HandlerFactory> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|entry| entry.factory)
    }

    /// Remove the factory under `id` only if it is still `generation`.
    pub fn unregister_generation(&self, id: &HandlerId, generation: FactoryGeneration) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(id);
                true
            }
            Some(_) => {
                tracing::debug!(handler = %id, "Factory was replaced, keeping the newer one");
                false
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &HandlerId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a handler instance for `id`.
    ///
    /// The factory runs outside the catalog lock.
    pub fn instantiate(&self, id: &HandlerId) -> Result<Arc<dyn IntentHandler>, IntentError> {
        let factory = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| Arc::clone(&entry.factory))
            .ok_or_else(|| IntentError::HandlerInstantiationFailed {
                handler: id.clone(),
                reason: "no factory registered".to_string(),
            })?;

        factory().map_err(|e| IntentError::HandlerInstantiationFailed {
            handler: id.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<&str> = entries.keys().map(HandlerId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("HandlerCatalog").field("handlers", &ids).finish()
    }
}
