//! The handler's side of the completion signal.

use std::any::Any;
use std::fmt;

use tokio::sync::oneshot;

use crate::error::HandlerError;
use crate::operation::CancellationToken;
use crate::result::IntentResult;

pub type Signal = Result<IntentResult, HandlerError>;

/// Single-use channel through which a handler reports its outcome.
///
/// Every reporting method consumes the sink, so a handler cannot signal
/// twice. Dropping the sink without signalling fails the operation with
/// [`HandlerError::Abandoned`].
pub struct CompletionSink {
    sender: oneshot::Sender<Signal>,
    token: CancellationToken,
}

impl CompletionSink {
    pub(crate) fn new(token: CancellationToken) -> (Self, oneshot::Receiver<Signal>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender, token }, receiver)
    }

    /// Report success with `value` as the result.
    ///
    /// Returns `false` if the operation had already settled (for example
    /// because it was cancelled) and the value was discarded.
    pub fn succeed<T: Any + Send + Sync>(self, value: T) -> bool {
        self.complete(Ok(IntentResult::new(value)))
    }

    /// Report success with an already-wrapped result.
    pub fn succeed_with(self, result: IntentResult) -> bool {
        self.complete(Ok(result))
    }

    pub fn fail(self, error: impl Into<HandlerError>) -> bool {
        self.complete(Err(error.into()))
    }

    pub fn complete(self, signal: Signal) -> bool {
        match self.sender.send(signal) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Late completion signal dropped");
                false
            }
        }
    }

    /// Whether the producer has asked to cancel. Long-running handlers
    /// should check this and stop early.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the producer asks to cancel.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink")
            .field("cancelled", &self.is_cancelled())
            .field("open", &!self.sender.is_closed())
            .finish()
    }
}
