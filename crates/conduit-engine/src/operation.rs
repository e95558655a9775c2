//! Operation lifecycle: cancellation token, validated state machine and
//! the one-shot completion gate.
//!
//! Lifecycle:
//! - Pending -> Running (handler instantiated and launched)
//! - Pending -> Failed (no handler, overloaded, instantiation failed)
//! - Pending -> Cancelled
//! - Running -> Completed / Failed / Cancelled

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use conduit_core::intent::Intent;
use conduit_core::types::OperationId;
use tokio::sync::oneshot;

use crate::callback::{IntentCallback, Outcome};
use crate::error::IntentError;

/// Cooperative cancellation shared by the engine and the handler.
pub use tokio_util::sync::CancellationToken;

// =============================================================================
// State machine
// =============================================================================

/// Lifecycle state of one `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Running => write!(f, "running"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }

    pub fn can_transition_to(&self, target: OperationState) -> bool {
        matches!(
            (self, target),
            (OperationState::Pending, OperationState::Running)
                | (OperationState::Pending, OperationState::Failed)
                | (OperationState::Pending, OperationState::Cancelled)
                | (OperationState::Running, OperationState::Completed)
                | (OperationState::Running, OperationState::Failed)
                | (OperationState::Running, OperationState::Cancelled)
        )
    }
}

// =============================================================================
// Completion gate
// =============================================================================

struct Gate {
    state: OperationState,
    callback: Option<Box<dyn IntentCallback>>,
    cancel_requested: bool,
    /// Fired once the caller holds the handle; delivery waits for it.
    release: Option<oneshot::Sender<()>>,
}

/// Shared record of one in-flight operation.
pub(crate) struct Operation {
    id: OperationId,
    intent: Arc<Intent>,
    token: CancellationToken,
    gate: Mutex<Gate>,
}

impl Operation {
    /// Create an operation together with the receiver that resolves once
    /// its handle has been used or dropped.
    pub(crate) fn new(
        intent: Intent,
        callback: Box<dyn IntentCallback>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (release, released) = oneshot::channel();
        let operation = Self {
            id: OperationId::new(),
            intent: Arc::new(intent),
            token: CancellationToken::new(),
            gate: Mutex::new(Gate {
                state: OperationState::Pending,
                callback: Some(callback),
                cancel_requested: false,
                release: Some(release),
            }),
        };
        (operation, released)
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn intent(&self) -> Arc<Intent> {
        Arc::clone(&self.intent)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn state(&self) -> OperationState {
        self.lock().state
    }

    /// Let the delivery task proceed. Only the first call has an effect.
    pub(crate) fn release(&self) {
        let release = self.lock().release.take();
        if let Some(release) = release {
            let _ = release.send(());
        }
    }

    /// Cancel the token unless the operation already settled. Returns `true`
    /// only for the first effective request.
    pub(crate) fn request_cancel(&self) -> bool {
        {
            let mut gate = self.lock();
            if gate.state.is_terminal() || gate.cancel_requested {
                return false;
            }
            gate.cancel_requested = true;
        }
        self.token.cancel();
        true
    }

    /// Pending -> Running. Returns `false` if the operation already settled.
    pub(crate) fn mark_running(&self) -> bool {
        let mut gate = self.lock();
        if !gate.state.can_transition_to(OperationState::Running) {
            return false;
        }
        tracing::debug!(operation = %self.id, "Operation state: {} -> running", gate.state);
        gate.state = OperationState::Running;
        true
    }

    /// Deliver the outcome to the callback unless the operation has already
    /// settled. Returns `true` if this call delivered it.
    ///
    /// The callback runs after the gate lock is released.
    pub(crate) fn settle(&self, outcome: Outcome) -> bool {
        let target = match &outcome {
            Outcome::Completed(_) => OperationState::Completed,
            Outcome::Failed(IntentError::Cancelled) => OperationState::Cancelled,
            Outcome::Failed(_) => OperationState::Failed,
        };

        let callback = {
            let mut gate = self.lock();
            if !gate.state.can_transition_to(target) {
                tracing::debug!(
                    operation = %self.id,
                    state = %gate.state,
                    attempted = %target,
                    "Dropping outcome for settled operation"
                );
                return false;
            }
            tracing::debug!(operation = %self.id, "Operation state: {} -> {}", gate.state, target);
            gate.state = target;
            gate.callback.take()
        };

        match (callback, outcome) {
            (Some(callback), Outcome::Completed(result)) => callback.completed(result, &self.intent),
            (Some(callback), Outcome::Failed(error)) => callback.error(error, &self.intent),
            (None, _) => return false,
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Public handle
// =============================================================================

/// Returned by `start`; lets the producer observe and cancel the operation.
///
/// The outcome is not delivered until this handle (or a clone of it) is
/// first used or dropped. The callback therefore never runs before the
/// `start` call that produced the handle has returned to its caller. Keep
/// the handle alive without touching it and the callback waits.
pub struct OperationHandle {
    operation: Arc<Operation>,
}

impl OperationHandle {
    pub(crate) fn new(operation: Arc<Operation>) -> Self {
        Self { operation }
    }

    fn operation(&self) -> &Operation {
        self.operation.release();
        &self.operation
    }

    pub fn id(&self) -> OperationId {
        self.operation().id()
    }

    pub fn state(&self) -> OperationState {
        self.operation().state()
    }

    /// Request cancellation.
    ///
    /// The callback then receives `Cancelled`, unless the handler already
    /// signalled. Cancelling a settled or already-cancelled operation does
    /// nothing.
    pub fn cancel(&self) {
        let operation = self.operation();
        if operation.request_cancel() {
            tracing::debug!(operation = %operation.id(), "Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.operation().token().is_cancelled()
    }

    /// Token shared with the handler's completion sink.
    pub fn token(&self) -> CancellationToken {
        self.operation().token().clone()
    }
}

impl Clone for OperationHandle {
    fn clone(&self) -> Self {
        self.operation.release();
        Self {
            operation: Arc::clone(&self.operation),
        }
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.operation.release();
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{self, FnCallback};
    use crate::result::IntentResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_operation() -> (Arc<Operation>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let completed = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let (c, e) = (Arc::clone(&completed), Arc::clone(&errors));
        let callback = FnCallback::new(
            move |_r: IntentResult, _i: &Intent| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            move |_e: IntentError, _i: &Intent| {
                e.fetch_add(1, Ordering::SeqCst);
            },
        );
        let (op, _released) = Operation::new(Intent::new(), Box::new(callback));
        (Arc::new(op), completed, errors)
    }

    // ---- state machine ----

    #[test]
    fn test_valid_transitions() {
        use OperationState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
    }

    #[test]
    fn test_invalid_transitions() {
        use OperationState::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for target in [Pending, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(OperationState::Pending.to_string(), "pending");
        assert_eq!(OperationState::Cancelled.to_string(), "cancelled");
    }

    // ---- release ----

    #[test]
    fn test_release_fires_once() {
        let (op, mut released) = Operation::new(Intent::new(), Box::new(callback::oneshot().0));
        assert!(released.try_recv().is_err());
        op.release();
        op.release();
        assert!(released.try_recv().is_ok());
    }

    #[test]
    fn test_handle_use_or_drop_releases_delivery() {
        let (op, mut released) = Operation::new(Intent::new(), Box::new(callback::oneshot().0));
        let handle = OperationHandle::new(Arc::new(op));
        assert!(released.try_recv().is_err());
        let _ = handle.id();
        assert!(released.try_recv().is_ok());

        let (op, mut released) = Operation::new(Intent::new(), Box::new(callback::oneshot().0));
        drop(OperationHandle::new(Arc::new(op)));
        assert!(released.try_recv().is_ok());
    }

    // ---- gate ----

    #[test]
    fn test_settle_fires_exactly_once() {
        let (op, completed, errors) = counting_operation();
        assert!(op.mark_running());
        assert!(op.settle(Outcome::Completed(IntentResult::new(1u8))));
        assert!(!op.settle(Outcome::Completed(IntentResult::new(2u8))));
        assert!(!op.settle(Outcome::Failed(IntentError::Cancelled)));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(op.state(), OperationState::Completed);
    }

    #[test]
    fn test_cancel_then_late_success_is_dropped() {
        let (op, completed, errors) = counting_operation();
        assert!(op.mark_running());
        assert!(op.settle(Outcome::Failed(IntentError::Cancelled)));
        assert!(!op.settle(Outcome::Completed(IntentResult::new(()))));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(op.state(), OperationState::Cancelled);
    }

    #[test]
    fn test_pending_cannot_complete_without_running() {
        let (op, completed, _) = counting_operation();
        assert!(!op.settle(Outcome::Completed(IntentResult::new(()))));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(op.state(), OperationState::Pending);
    }

    #[test]
    fn test_mark_running_after_settle_is_refused() {
        let (op, _, errors) = counting_operation();
        assert!(op.settle(Outcome::Failed(IntentError::NoHandlerFound)));
        assert!(!op.mark_running());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[test]
    fn test_handle_cancel_after_completion_is_noop() {
        let (op, _, _) = counting_operation();
        let handle = OperationHandle::new(Arc::clone(&op));
        op.mark_running();
        op.settle(Outcome::Completed(IntentResult::new(())));

        handle.cancel();
        handle.cancel();
        assert!(!handle.is_cancelled());
        assert_eq!(handle.state(), OperationState::Completed);
    }

    #[test]
    fn test_only_first_cancel_request_counts() {
        let (op, _, _) = counting_operation();
        assert!(op.request_cancel());
        assert!(!op.request_cancel());
        assert!(op.token().is_cancelled());
        assert_eq!(op.state(), OperationState::Pending);
    }

    #[tokio::test]
    async fn test_cancel_wakes_token_waiter() {
        let (op, _, _) = counting_operation();
        let handle = OperationHandle::new(Arc::clone(&op));
        let token = handle.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_handle_cancel_flips_shared_token() {
        let (op, _, _) = counting_operation();
        let handle = OperationHandle::new(Arc::clone(&op));
        let token = handle.token();
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
        assert_eq!(handle.id(), op.id());
    }
}
