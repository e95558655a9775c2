//! Error types for the intent engine.

use conduit_core::types::HandlerId;

/// Failures reported by the engine.
///
/// Everything except `MalformedFilter` and `UnroutableResult` reaches the
/// producer through its callback; those two are returned synchronously from
/// registration and dispatch respectively.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("No handler found for intent")]
    NoHandlerFound,
    #[error("Handler '{handler}' could not be instantiated: {reason}")]
    HandlerInstantiationFailed { handler: HandlerId, reason: String },
    #[error("Handler '{handler}' failed: {source}")]
    HandlerExecutionFailed {
        handler: HandlerId,
        #[source]
        source: HandlerError,
    },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Worker pool overloaded: {outstanding} operations outstanding, capacity {capacity}")]
    Overloaded { outstanding: usize, capacity: usize },
    #[error("No consumer registered for result type {result_type}")]
    UnroutableResult { result_type: String },
    #[error("Malformed filter: {0}")]
    MalformedFilter(String),
}

impl IntentError {
    /// Handler the failure is attributed to, if any.
    pub fn handler(&self) -> Option<&HandlerId> {
        match self {
            IntentError::HandlerInstantiationFailed { handler, .. }
            | IntentError::HandlerExecutionFailed { handler, .. } => Some(handler),
            _ => None,
        }
    }
}

/// Errors reported by handlers, handler factories and result consumers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Handler dropped its completion sink without signalling")]
    Abandoned,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}
