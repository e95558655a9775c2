//! Completion callbacks.
//!
//! Both callback methods take `self: Box<Self>`, so the engine can invoke a
//! callback at most once by construction. The operation's completion gate
//! makes sure it is invoked at least once.

use conduit_core::intent::Intent;
use tokio::sync::oneshot;

use crate::error::IntentError;
use crate::result::IntentResult;

/// Receives the outcome of one `start` call.
pub trait IntentCallback: Send + 'static {
    /// The handler succeeded.
    fn completed(self: Box<Self>, result: IntentResult, intent: &Intent);

    /// The operation failed, was cancelled, or could not be scheduled.
    fn error(self: Box<Self>, error: IntentError, intent: &Intent);
}

/// Final outcome of an operation.
#[derive(Debug)]
pub enum Outcome {
    Completed(IntentResult),
    Failed(IntentError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn into_result(self) -> Result<IntentResult, IntentError> {
        match self {
            Outcome::Completed(result) => Ok(result),
            Outcome::Failed(error) => Err(error),
        }
    }
}

/// Adapts a pair of closures into an [`IntentCallback`].
pub struct FnCallback<C, E> {
    on_completed: C,
    on_error: E,
}

impl<C, E> FnCallback<C, E>
where
    C: FnOnce(IntentResult, &Intent) + Send + 'static,
    E: FnOnce(IntentError, &Intent) + Send + 'static,
{
    pub fn new(on_completed: C, on_error: E) -> Self {
        Self {
            on_completed,
            on_error,
        }
    }
}

impl<C, E> IntentCallback for FnCallback<C, E>
where
    C: FnOnce(IntentResult, &Intent) + Send + 'static,
    E: FnOnce(IntentError, &Intent) + Send + 'static,
{
    fn completed(self: Box<Self>, result: IntentResult, intent: &Intent) {
        (self.on_completed)(result, intent)
    }

    fn error(self: Box<Self>, error: IntentError, intent: &Intent) {
        (self.on_error)(error, intent)
    }
}

/// What a [`OneshotCallback`] delivers.
#[derive(Debug)]
pub struct Delivery {
    pub outcome: Outcome,
    pub intent: Intent,
}

/// Callback that forwards the outcome to a `oneshot` channel, for producers
/// that would rather await a future than implement a callback.
pub struct OneshotCallback {
    sender: oneshot::Sender<Delivery>,
}

impl OneshotCallback {
    fn send(self, outcome: Outcome, intent: &Intent) {
        let delivery = Delivery {
            outcome,
            intent: intent.clone(),
        };
        if self.sender.send(delivery).is_err() {
            tracing::debug!("Outcome receiver dropped before delivery");
        }
    }
}

impl IntentCallback for OneshotCallback {
    fn completed(self: Box<Self>, result: IntentResult, intent: &Intent) {
        self.send(Outcome::Completed(result), intent)
    }

    fn error(self: Box<Self>, error: IntentError, intent: &Intent) {
        self.send(Outcome::Failed(error), intent)
    }
}

/// Build a callback/receiver pair.
pub fn oneshot() -> (OneshotCallback, oneshot::Receiver<Delivery>) {
    let (sender, receiver) = oneshot::channel();
    (OneshotCallback { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fn_callback_completed() {
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        let callback: Box<dyn IntentCallback> = Box::new(FnCallback::new(
            move |result: IntentResult, intent: &Intent| {
                *seen_cb.lock().unwrap() = Some((
                    *result.downcast_ref::<u32>().unwrap(),
                    intent.action().map(str::to_string),
                ));
            },
            |_error: IntentError, _intent: &Intent| panic!("error must not fire"),
        ));

        callback.completed(IntentResult::new(7u32), &Intent::for_action("view"));
        assert_eq!(
            *seen.lock().unwrap(),
            Some((7, Some("view".to_string())))
        );
    }

    #[test]
    fn test_fn_callback_error() {
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_cb = Arc::clone(&seen);
        let callback: Box<dyn IntentCallback> = Box::new(FnCallback::new(
            |_result: IntentResult, _intent: &Intent| panic!("completed must not fire"),
            move |error: IntentError, _intent: &Intent| {
                *seen_cb.lock().unwrap() = error.to_string();
            },
        ));

        callback.error(IntentError::Cancelled, &Intent::new());
        assert_eq!(*seen.lock().unwrap(), "Operation cancelled");
    }

    #[tokio::test]
    async fn test_oneshot_delivers_outcome_and_intent() {
        let (callback, receiver) = oneshot();
        Box::new(callback).error(IntentError::NoHandlerFound, &Intent::for_action("open"));

        let delivery = receiver.await.unwrap();
        assert!(!delivery.outcome.is_completed());
        assert!(matches!(
            delivery.outcome.into_result(),
            Err(IntentError::NoHandlerFound)
        ));
        assert_eq!(delivery.intent.action(), Some("open"));
    }

    #[test]
    fn test_oneshot_with_dropped_receiver_does_not_panic() {
        let (callback, receiver) = oneshot();
        drop(receiver);
        Box::new(callback).completed(IntentResult::new(()), &Intent::new());
    }
}
