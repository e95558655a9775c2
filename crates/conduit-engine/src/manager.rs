//! Intent manager.
//!
//! Turns a `start` call into a delivered outcome: resolve a handler against
//! the current registry snapshot, admit the operation to the worker pool,
//! instantiate and run the handler, then settle the operation exactly once
//! with whichever comes first of the handler's signal and cancellation.

use std::sync::Arc;

use conduit_core::events::{EventBus, IntentEvent};
use conduit_core::intent::Intent;
use conduit_core::types::{HandlerId, OperationId, Timestamp};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::callback::{IntentCallback, Outcome};
use crate::context::ExecutionContext;
use crate::error::{HandlerError, IntentError};
use crate::handler::{CompletionSink, HandlerCatalog};
use crate::operation::{Operation, OperationHandle};
use crate::pool::{Admission, WorkerPool};
use crate::registry::FilterRegistry;
use crate::resolver;

/// What `start` decided before handing the operation to its task.
enum Plan {
    Run {
        handler: HandlerId,
        admission: Admission,
    },
    Reject {
        handler: Option<HandlerId>,
        error: IntentError,
    },
}

/// Accepts intents from producers and drives them to completion.
#[derive(Debug, Clone)]
pub struct IntentManager {
    registry: Arc<FilterRegistry>,
    handlers: Arc<HandlerCatalog>,
    pool: WorkerPool,
    events: EventBus,
    runtime: Option<Handle>,
}

impl IntentManager {
    pub fn new(registry: Arc<FilterRegistry>, handlers: Arc<HandlerCatalog>, pool: WorkerPool) -> Self {
        Self {
            registry,
            handlers,
            pool,
            events: EventBus::default(),
            runtime: None,
        }
    }

    /// Publish operation events on `events` instead of a private bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Run operations on `runtime` rather than the caller's runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn handlers(&self) -> &Arc<HandlerCatalog> {
        &self.handlers
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handlers that would be considered for `intent`, best first, without
    /// starting anything.
    pub fn query(&self, intent: &Intent) -> Vec<HandlerId> {
        resolver::resolve(intent, &self.registry.snapshot())
    }

    /// Start an operation for `intent`.
    ///
    /// Returns immediately. `callback` is invoked exactly once, always from
    /// another task, including for `NoHandlerFound` and `Overloaded`. Its
    /// delivery is held until the returned handle is first used or dropped,
    /// so it never runs before this call has returned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime and no runtime was supplied
    /// with [`IntentManager::with_runtime`].
    pub fn start<C: IntentCallback>(
        &self,
        intent: Intent,
        callback: C,
        context: ExecutionContext,
    ) -> OperationHandle {
        self.start_boxed(intent, Box::new(callback), context)
    }

    pub fn start_boxed(
        &self,
        intent: Intent,
        callback: Box<dyn IntentCallback>,
        context: ExecutionContext,
    ) -> OperationHandle {
        let candidates = self.query(&intent);
        let explicit = intent.handler().is_some();
        let (operation, released) = Operation::new(intent, callback);
        let operation = Arc::new(operation);
        let handle = OperationHandle::new(Arc::clone(&operation));

        let plan = match candidates.into_iter().next() {
            None => {
                tracing::debug!(operation = %operation.id(), "No handler matches intent");
                Plan::Reject {
                    handler: None,
                    error: IntentError::NoHandlerFound,
                }
            }
            Some(handler) => match self.pool.admit() {
                Ok(admission) => {
                    tracing::info!(
                        operation = %operation.id(),
                        handler = %handler,
                        explicit,
                        "Operation started"
                    );
                    self.events.publish(IntentEvent::OperationStarted {
                        operation_id: operation.id(),
                        handler: handler.clone(),
                        explicit,
                        timestamp: Timestamp::now(),
                    });
                    Plan::Run { handler, admission }
                }
                Err(error) => Plan::Reject {
                    handler: Some(handler),
                    error,
                },
            },
        };

        let task = execute(
            operation,
            released,
            plan,
            Arc::clone(&self.handlers),
            context,
            self.events.clone(),
        );
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(task);
            }
            None => {
                tokio::spawn(task);
            }
        }
        handle
    }
}

async fn execute(
    operation: Arc<Operation>,
    released: oneshot::Receiver<()>,
    plan: Plan,
    handlers: Arc<HandlerCatalog>,
    context: ExecutionContext,
    events: EventBus,
) {
    // Nothing is settled until the caller holds the handle.
    let _ = released.await;

    let (handler_id, admission) = match plan {
        Plan::Run { handler, admission } => (handler, admission),
        Plan::Reject { handler, error } => {
            settle(&operation, Outcome::Failed(error), handler.as_ref(), &events);
            return;
        }
    };

    let token = operation.token().clone();
    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => {
            settle(&operation, Outcome::Failed(IntentError::Cancelled), Some(&handler_id), &events);
            return;
        }
        permit = admission.acquire() => match permit {
            Ok(permit) => permit,
            Err(error) => {
                settle(&operation, Outcome::Failed(error), Some(&handler_id), &events);
                return;
            }
        },
    };

    if token.is_cancelled() {
        drop(permit);
        settle(&operation, Outcome::Failed(IntentError::Cancelled), Some(&handler_id), &events);
        return;
    }

    let handler = match handlers.instantiate(&handler_id) {
        Ok(handler) => handler,
        Err(error) => {
            drop(permit);
            settle(&operation, Outcome::Failed(error), Some(&handler_id), &events);
            return;
        }
    };

    if !operation.mark_running() {
        return;
    }

    let (sink, signal) = CompletionSink::new(token.clone());
    let intent = operation.intent();
    tokio::spawn(async move {
        // The worker stays occupied until the handler returns, even if the
        // operation was cancelled in the meantime.
        let _permit = permit;
        handler.handle(&intent, &context, sink).await;
    });

    // A signal that has already arrived wins over a concurrent cancel.
    let outcome = tokio::select! {
        biased;
        signal = signal => match signal {
            Ok(Ok(result)) => Outcome::Completed(result),
            Ok(Err(source)) => Outcome::Failed(IntentError::HandlerExecutionFailed {
                handler: handler_id.clone(),
                source,
            }),
            Err(_) => Outcome::Failed(IntentError::HandlerExecutionFailed {
                handler: handler_id.clone(),
                source: HandlerError::Abandoned,
            }),
        },
        _ = token.cancelled() => Outcome::Failed(IntentError::Cancelled),
    };
    settle(&operation, outcome, Some(&handler_id), &events);
}

fn settle(operation: &Operation, outcome: Outcome, handler: Option<&HandlerId>, events: &EventBus) {
    let operation_id = operation.id();
    let event = describe(operation_id, &outcome, handler);

    if !operation.settle(outcome) {
        return;
    }

    match &event {
        Some(IntentEvent::OperationCompleted { result_type, .. }) => {
            tracing::info!(operation = %operation_id, result_type = %result_type, "Operation completed");
        }
        Some(IntentEvent::OperationCancelled { .. }) => {
            tracing::info!(operation = %operation_id, "Operation cancelled");
        }
        Some(IntentEvent::OperationFailed { reason, .. }) => {
            tracing::warn!(operation = %operation_id, reason = %reason, "Operation failed");
        }
        _ => {}
    }
    if let Some(event) = event {
        events.publish(event);
    }
}

fn describe(
    operation_id: OperationId,
    outcome: &Outcome,
    handler: Option<&HandlerId>,
) -> Option<IntentEvent> {
    let timestamp = Timestamp::now();
    match outcome {
        Outcome::Completed(result) => handler.map(|handler| IntentEvent::OperationCompleted {
            operation_id,
            handler: handler.clone(),
            result_type: result.type_name().to_string(),
            timestamp,
        }),
        Outcome::Failed(IntentError::Cancelled) => Some(IntentEvent::OperationCancelled {
            operation_id,
            timestamp,
        }),
        Outcome::Failed(error) => Some(IntentEvent::OperationFailed {
            operation_id,
            handler: handler.cloned(),
            reason: error.to_string(),
            timestamp,
        }),
    }
}
