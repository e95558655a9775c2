use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{HandlerId, OperationId, RegistrationId, Timestamp};

/// Lifecycle events emitted by the engine.
///
/// Events are published on the [`EventBus`] and consumed by:
/// - Observers that want results without owning the callback
/// - Logging/diagnostics frontends
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum IntentEvent {
    // =========================================================================
    // Operation Events
    // =========================================================================
    /// A `start` call resolved a handler and was scheduled.
    OperationStarted {
        operation_id: OperationId,
        handler: HandlerId,
        explicit: bool,
        timestamp: Timestamp,
    },

    /// The handler succeeded and the callback received the result.
    OperationCompleted {
        operation_id: OperationId,
        handler: HandlerId,
        result_type: String,
        timestamp: Timestamp,
    },

    /// The callback received an error.
    OperationFailed {
        operation_id: OperationId,
        handler: Option<HandlerId>,
        reason: String,
        timestamp: Timestamp,
    },

    /// The operation was cancelled before the handler signalled.
    OperationCancelled {
        operation_id: OperationId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Registry Events
    // =========================================================================
    /// A filter was added to the registry.
    FilterRegistered {
        registration_id: RegistrationId,
        handler: HandlerId,
        priority: i32,
        timestamp: Timestamp,
    },

    /// A filter was removed from the registry.
    FilterUnregistered {
        registration_id: RegistrationId,
        handler: HandlerId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Dispatch Events
    // =========================================================================
    /// A result was handed to one or more consumers.
    ResultDispatched {
        result_type: String,
        consumers: usize,
        timestamp: Timestamp,
    },
}

impl IntentEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            IntentEvent::OperationStarted { timestamp, .. }
            | IntentEvent::OperationCompleted { timestamp, .. }
            | IntentEvent::OperationFailed { timestamp, .. }
            | IntentEvent::OperationCancelled { timestamp, .. }
            | IntentEvent::FilterRegistered { timestamp, .. }
            | IntentEvent::FilterUnregistered { timestamp, .. }
            | IntentEvent::ResultDispatched { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a short event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            IntentEvent::OperationStarted { .. } => "operation_started",
            IntentEvent::OperationCompleted { .. } => "operation_completed",
            IntentEvent::OperationFailed { .. } => "operation_failed",
            IntentEvent::OperationCancelled { .. } => "operation_cancelled",
            IntentEvent::FilterRegistered { .. } => "filter_registered",
            IntentEvent::FilterUnregistered { .. } => "filter_unregistered",
            IntentEvent::ResultDispatched { .. } => "result_dispatched",
        }
    }
}

/// Broadcast channel for [`IntentEvent`]s.
///
/// Cloning the bus shares the underlying channel. Publishing with no
/// subscribers is fine; the event is simply dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<IntentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers will see it.
    pub fn publish(&self, event: IntentEvent) -> usize {
        let name = event.event_name();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(event = name, "No event subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
