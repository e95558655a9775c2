//! Result dispatch.
//!
//! Routes a completed operation's result to the consumers registered for its
//! concrete type. A consumer may also be tied to a category, in which case
//! it only sees results of intents carrying that category and ranks ahead of
//! consumers registered for the type alone.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use conduit_core::config::DispatchPolicy;
use conduit_core::events::{EventBus, IntentEvent};
use conduit_core::intent::Intent;
use conduit_core::types::{RegistrationId, Timestamp};

use crate::context::ExecutionContext;
use crate::error::{HandlerError, IntentError};
use crate::result::IntentResult;

/// Something that acts on a produced result.
pub trait ResultConsumer: Send + Sync {
    fn consume(
        &self,
        result: &IntentResult,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<(), HandlerError>;
}

impl<F> ResultConsumer for F
where
    F: Fn(&IntentResult, &Intent, &ExecutionContext) -> Result<(), HandlerError> + Send + Sync,
{
    fn consume(
        &self,
        result: &IntentResult,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<(), HandlerError> {
        self(result, intent, context)
    }
}

#[derive(Clone)]
struct ConsumerEntry {
    id: RegistrationId,
    name: String,
    result_type: TypeId,
    type_name: &'static str,
    category: Option<String>,
    sequence: u64,
    consumer: Arc<dyn ResultConsumer>,
}

impl ConsumerEntry {
    fn accepts(&self, result: &IntentResult, intent: &Intent) -> bool {
        self.result_type == result.type_id()
            && self
                .category
                .as_deref()
                .map_or(true, |category| intent.has_category(category))
    }
}

/// Token returned by consumer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerRegistration {
    id: RegistrationId,
}

impl ConsumerRegistration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

#[derive(Default)]
struct Table {
    entries: Arc<Vec<ConsumerEntry>>,
    next_sequence: u64,
}

/// Thread-safe table of result consumers.
#[derive(Default)]
pub struct ConsumerRegistry {
    table: RwLock<Table>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` for results of type `T`.
    pub fn register<T: Any>(
        &self,
        name: impl Into<String>,
        consumer: impl ResultConsumer + 'static,
    ) -> ConsumerRegistration {
        self.insert::<T>(name.into(), None, Arc::new(consumer))
    }

    /// Register `consumer` for results of type `T` whose intent carries
    /// `category`.
    pub fn register_for_category<T: Any>(
        &self,
        name: impl Into<String>,
        category: impl Into<String>,
        consumer: impl ResultConsumer + 'static,
    ) -> ConsumerRegistration {
        self.insert::<T>(name.into(), Some(category.into()), Arc::new(consumer))
    }

    /// Returns `false` if the consumer was already removed.
    pub fn unregister(&self, registration: &ConsumerRegistration) -> bool {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match table.entries.iter().position(|e| e.id == registration.id) {
            Some(pos) => {
                let entry = Arc::make_mut(&mut table.entries).remove(pos);
                tracing::debug!(consumer = %entry.name, "Consumer unregistered");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn insert<T: Any>(
        &self,
        name: String,
        category: Option<String>,
        consumer: Arc<dyn ResultConsumer>,
    ) -> ConsumerRegistration {
        let id = RegistrationId::new();
        let type_name = std::any::type_name::<T>();
        tracing::debug!(consumer = %name, result_type = type_name, category = ?category, "Consumer registered");

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let sequence = table.next_sequence;
        table.next_sequence += 1;
        Arc::make_mut(&mut table.entries).push(ConsumerEntry {
            id,
            name,
            result_type: TypeId::of::<T>(),
            type_name,
            category,
            sequence,
            consumer,
        });
        ConsumerRegistration { id }
    }

    fn snapshot(&self) -> Arc<Vec<ConsumerEntry>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&table.entries)
    }

    /// Consumers eligible for `result`, most specific first.
    fn route(&self, result: &IntentResult, intent: &Intent) -> Vec<ConsumerEntry> {
        let mut eligible: Vec<ConsumerEntry> = self
            .snapshot()
            .iter()
            .filter(|entry| entry.accepts(result, intent))
            .cloned()
            .collect();
        eligible.sort_by_key(|entry| (entry.category.is_none(), entry.sequence));
        eligible
    }
}

impl fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let consumers: Vec<(&str, &str)> = snapshot
            .iter()
            .map(|e| (e.name.as_str(), e.type_name))
            .collect();
        f.debug_struct("ConsumerRegistry")
            .field("consumers", &consumers)
            .finish()
    }
}

/// A consumer that returned an error.
#[derive(Debug)]
pub struct ConsumerFailure {
    pub consumer: String,
    pub error: HandlerError,
}

/// What happened to a dispatched result.
#[derive(Debug)]
pub struct DispatchReport {
    pub result_type: &'static str,
    /// Consumers that accepted the result, in invocation order.
    pub delivered: Vec<String>,
    pub failures: Vec<ConsumerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn invoked(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }
}

/// Stateless router from results to consumers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    consumers: Arc<ConsumerRegistry>,
    policy: DispatchPolicy,
    events: Option<EventBus>,
}

impl Dispatcher {
    pub fn new(consumers: Arc<ConsumerRegistry>, policy: DispatchPolicy) -> Self {
        Self {
            consumers,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn consumers(&self) -> &Arc<ConsumerRegistry> {
        &self.consumers
    }

    /// Hand `result` to the consumer(s) for its type.
    ///
    /// Under [`DispatchPolicy::First`] only the most specific consumer runs;
    /// under [`DispatchPolicy::Broadcast`] every eligible consumer runs in
    /// rank order and one consumer's failure does not stop the rest. Consumer
    /// failures are collected in the report. Fails with `UnroutableResult`
    /// when no consumer accepts the result.
    pub fn dispatch(
        &self,
        result: &IntentResult,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<DispatchReport, IntentError> {
        let mut eligible = self.consumers.route(result, intent);
        if eligible.is_empty() {
            tracing::warn!(result_type = result.type_name(), "No consumer for result");
            return Err(IntentError::UnroutableResult {
                result_type: result.type_name().to_string(),
            });
        }
        if self.policy == DispatchPolicy::First {
            eligible.truncate(1);
        }

        let mut report = DispatchReport {
            result_type: result.type_name(),
            delivered: Vec::with_capacity(eligible.len()),
            failures: Vec::new(),
        };
        for entry in eligible {
            match entry.consumer.consume(result, intent, context) {
                Ok(()) => {
                    tracing::debug!(consumer = %entry.name, "Result consumed");
                    report.delivered.push(entry.name);
                }
                Err(error) => {
                    tracing::warn!(consumer = %entry.name, error = %error, "Consumer failed");
                    report.failures.push(ConsumerFailure {
                        consumer: entry.name,
                        error,
                    });
                }
            }
        }

        if let Some(events) = &self.events {
            events.publish(IntentEvent::ResultDispatched {
                result_type: result.type_name().to_string(),
                consumers: report.invoked(),
                timestamp: Timestamp::now(),
            });
        }
        Ok(report)
    }
}
