//! Engine façade.
//!
//! Owns one filter registry, handler catalog, worker pool, consumer table
//! and event bus, and wires them into an [`IntentManager`] and a
//! [`Dispatcher`].

use std::sync::Arc;

use conduit_core::config::ConduitConfig;
use conduit_core::events::{EventBus, IntentEvent};
use conduit_core::intent::Intent;
use conduit_core::types::HandlerId;
use tokio::sync::broadcast;

use crate::callback::IntentCallback;
use crate::context::ExecutionContext;
use crate::dispatcher::{ConsumerRegistry, DispatchReport, Dispatcher};
use crate::error::IntentError;
use crate::filter::IntentFilter;
use crate::handler::{FactoryGeneration, HandlerCatalog, HandlerFactory};
use crate::manager::IntentManager;
use crate::operation::OperationHandle;
use crate::pool::WorkerPool;
use crate::registry::{FilterRegistry, RegistrationHandle};
use crate::result::IntentResult;

/// Everything added by one [`Engine::register_handler`] call.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    handler: HandlerId,
    generation: FactoryGeneration,
    filters: Vec<RegistrationHandle>,
}

impl HandlerRegistration {
    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }

    pub fn filters(&self) -> &[RegistrationHandle] {
        &self.filters
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    manager: IntentManager,
    dispatcher: Dispatcher,
    events: EventBus,
}

impl Engine {
    pub fn from_config(config: &ConduitConfig) -> Self {
        let events = EventBus::new(config.events.channel_capacity);
        let registry = Arc::new(FilterRegistry::new().with_events(events.clone()));
        let handlers = Arc::new(HandlerCatalog::new());
        let pool = WorkerPool::from_config(&config.pool);
        let manager = IntentManager::new(registry, handlers, pool).with_events(events.clone());
        let dispatcher = Dispatcher::new(Arc::new(ConsumerRegistry::new()), config.dispatch.policy)
            .with_events(events.clone());

        tracing::info!(
            workers = config.pool.workers,
            max_queue_depth = ?config.pool.max_queue_depth,
            policy = ?config.dispatch.policy,
            "Intent engine ready"
        );

        Self {
            manager,
            dispatcher,
            events,
        }
    }

    pub fn manager(&self) -> &IntentManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        self.manager.registry()
    }

    pub fn consumers(&self) -> &Arc<ConsumerRegistry> {
        self.dispatcher.consumers()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntentEvent> {
        self.events.subscribe()
    }

    /// Make a handler available under `id` and declare its filters.
    ///
    /// Every filter must name `id` as its handler. A handler with no
    /// filters can only be reached by explicit intents. If any filter is
    /// rejected nothing is registered. Registering an id again replaces its
    /// factory; the earlier registration's filters stay until it is
    /// unregistered.
    pub fn register_handler(
        &self,
        id: impl Into<HandlerId>,
        factory: HandlerFactory,
        filters: Vec<IntentFilter>,
    ) -> Result<HandlerRegistration, IntentError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IntentError::MalformedFilter(
                "handler identity is blank".to_string(),
            ));
        }
        if let Some(stray) = filters.iter().find(|f| f.handler != id) {
            return Err(IntentError::MalformedFilter(format!(
                "filter names handler '{}' but is registered for '{}'",
                stray.handler, id
            )));
        }
        for filter in &filters {
            filter.validate()?;
        }

        // Factory first, so a visible filter never points at a missing factory.
        let generation = self.manager.handlers().register(id.clone(), factory);
        match self.registry().register_all(filters) {
            Ok(filters) => Ok(HandlerRegistration {
                handler: id,
                generation,
                filters,
            }),
            Err(error) => {
                self.manager.handlers().unregister_generation(&id, generation);
                Err(error)
            }
        }
    }

    /// Remove a registration's filters, then its factory unless a later
    /// registration under the same id replaced it. Operations already
    /// running are unaffected. Returns `false` if nothing was left to remove.
    pub fn unregister_handler(&self, registration: &HandlerRegistration) -> bool {
        let filters = self.registry().unregister_all(&registration.filters);
        let factory = self
            .manager
            .handlers()
            .unregister_generation(&registration.handler, registration.generation);
        if factory {
            tracing::info!(handler = %registration.handler, "Handler unregistered");
        } else if filters > 0 {
            tracing::info!(
                handler = %registration.handler,
                filters,
                "Stale registration removed, newer factory kept"
            );
        }
        factory || filters > 0
    }

    pub fn query(&self, intent: &Intent) -> Vec<HandlerId> {
        self.manager.query(intent)
    }

    pub fn start<C: IntentCallback>(
        &self,
        intent: Intent,
        callback: C,
        context: ExecutionContext,
    ) -> OperationHandle {
        self.manager.start(intent, callback, context)
    }

    pub fn dispatch(
        &self,
        result: &IntentResult,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<DispatchReport, IntentError> {
        self.dispatcher.dispatch(result, intent, context)
    }

    /// Refuse new operations and fail those still waiting for a worker.
    pub fn shutdown(&self) {
        tracing::info!("Intent engine shutting down");
        self.manager.pool().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{shared, CompletionSink, IntentHandler};
    use async_trait::async_trait;
    use conduit_core::config::DispatchPolicy;

    struct Noop;

    #[async_trait]
    impl IntentHandler for Noop {
        async fn handle(&self, _intent: &Intent, _context: &ExecutionContext, sink: CompletionSink) {
            sink.succeed(());
        }
    }

    fn engine() -> Engine {
        Engine::from_config(&ConduitConfig::default())
    }

    #[test]
    fn test_from_config_applies_sections() {
        let mut config = ConduitConfig::default();
        config.pool.workers = 3;
        config.pool.max_queue_depth = Some(2);
        config.dispatch.policy = DispatchPolicy::Broadcast;

        let engine = Engine::from_config(&config);
        assert_eq!(engine.manager().pool().workers(), 3);
        assert_eq!(engine.manager().pool().capacity(), Some(5));
        assert_eq!(engine.dispatcher().policy(), DispatchPolicy::Broadcast);
    }

    #[test]
    fn test_register_and_unregister_handler() {
        let engine = engine();
        let registration = engine
            .register_handler(
                "viewer",
                shared(Noop),
                vec![
                    IntentFilter::new("viewer").action("view"),
                    IntentFilter::new("viewer").scheme("file"),
                ],
            )
            .unwrap();
        assert_eq!(registration.filters().len(), 2);
        assert_eq!(engine.query(&Intent::for_action("view")), vec![HandlerId::new("viewer")]);

        assert!(engine.unregister_handler(&registration));
        assert!(!engine.unregister_handler(&registration));
        assert!(engine.registry().is_empty());
        assert!(engine.manager().handlers().is_empty());
    }

    #[test]
    fn test_register_handler_without_filters_is_explicit_only() {
        let engine = engine();
        engine
            .register_handler("seed-xml", shared(Noop), Vec::new())
            .unwrap();
        assert!(engine.registry().is_empty());
        assert!(engine.manager().handlers().contains(&HandlerId::new("seed-xml")));
    }

    #[test]
    fn test_register_handler_rejects_foreign_filter() {
        let engine = engine();
        let err = engine
            .register_handler(
                "viewer",
                shared(Noop),
                vec![IntentFilter::new("editor").action("edit")],
            )
            .unwrap_err();
        assert!(matches!(err, IntentError::MalformedFilter(_)));
        assert!(engine.manager().handlers().is_empty());
    }

    #[tokio::test]
    async fn test_unregistering_replaced_registration_keeps_live_factory() {
        let engine = engine();
        let stale = engine
            .register_handler("h", shared(Noop), vec![IntentFilter::new("h").action("a")])
            .unwrap();
        let live = engine
            .register_handler("h", shared(Noop), vec![IntentFilter::new("h").action("b")])
            .unwrap();

        assert!(engine.unregister_handler(&stale));
        assert!(engine.query(&Intent::for_action("a")).is_empty());
        assert!(engine.manager().handlers().contains(&HandlerId::new("h")));

        let (cb, rx) = crate::callback::oneshot();
        engine.start(Intent::for_action("b"), cb, ExecutionContext::new());
        assert!(rx.await.unwrap().outcome.is_completed());

        assert!(engine.unregister_handler(&live));
        assert!(engine.manager().handlers().is_empty());
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_rejected_filter_registers_nothing() {
        let engine = engine();
        let err = engine
            .register_handler(
                "viewer",
                shared(Noop),
                vec![
                    IntentFilter::new("viewer").action("view"),
                    IntentFilter::new("viewer"),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, IntentError::MalformedFilter(_)));
        assert!(engine.registry().is_empty());
        assert!(!engine.manager().handlers().contains(&HandlerId::new("viewer")));
    }

    #[test]
    fn test_register_handler_rejects_blank_identity() {
        let engine = engine();
        assert!(engine
            .register_handler("  ", shared(Noop), Vec::new())
            .is_err());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_operations() {
        let engine = engine();
        engine
            .register_handler("noop", shared(Noop), vec![IntentFilter::new("noop").action("run")])
            .unwrap();
        engine.shutdown();

        let (cb, rx) = crate::callback::oneshot();
        engine.start(Intent::for_action("run"), cb, ExecutionContext::new());
        let err = rx.await.unwrap().outcome.into_result().unwrap_err();
        assert!(matches!(err, IntentError::Overloaded { .. }));
    }
}
