//! Intent filter registry.
//!
//! Holds every filter declared by registered handlers, in registration
//! order. Writers are serialized behind a lock and publish a new version of
//! the filter list; readers take a snapshot by cloning an `Arc`, so a
//! resolution in progress keeps seeing exactly the filters that existed when
//! it started.

use std::sync::{Arc, PoisonError, RwLock};

use conduit_core::events::{EventBus, IntentEvent};
use conduit_core::types::{HandlerId, RegistrationId, Timestamp};

use crate::error::IntentError;
use crate::filter::IntentFilter;

/// A filter as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredFilter {
    pub id: RegistrationId,
    /// Monotonic registration order, used for tie-breaks.
    pub sequence: u64,
    pub filter: IntentFilter,
}

/// Point-in-time view of the registry, ordered by registration.
pub type FilterSnapshot = Arc<Vec<RegisteredFilter>>;

/// Token returned by [`FilterRegistry::register`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    id: RegistrationId,
}

impl RegistrationHandle {
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

#[derive(Debug, Default)]
struct Inner {
    filters: FilterSnapshot,
    next_sequence: u64,
}

/// Thread-safe, copy-on-write store of [`IntentFilter`]s.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    inner: RwLock<Inner>,
    events: Option<EventBus>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish registration changes on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Add a filter.
    ///
    /// Fails with `MalformedFilter` if the filter has no criteria at all or
    /// names no handler.
    pub fn register(&self, filter: IntentFilter) -> Result<RegistrationHandle, IntentError> {
        let mut handles = self.register_all(vec![filter])?;
        Ok(handles.remove(0))
    }

    /// Add several filters as one change. Either all are added or, if any is
    /// malformed, none are.
    pub fn register_all(
        &self,
        filters: Vec<IntentFilter>,
    ) -> Result<Vec<RegistrationHandle>, IntentError> {
        for filter in &filters {
            filter.validate()?;
        }

        let mut added = Vec::with_capacity(filters.len());
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let mut sequence = inner.next_sequence;
            // Mutates in place unless a snapshot is still held by a reader.
            let list = Arc::make_mut(&mut inner.filters);
            for filter in filters {
                let entry = RegisteredFilter {
                    id: RegistrationId::new(),
                    sequence,
                    filter,
                };
                sequence += 1;
                added.push((entry.id, entry.filter.handler.clone(), entry.filter.priority));
                list.push(entry);
            }
            inner.next_sequence = sequence;
        }

        let mut handles = Vec::with_capacity(added.len());
        for (id, handler, priority) in added {
            tracing::info!(registration = %id, handler = %handler, priority, "Filter registered");
            self.publish(IntentEvent::FilterRegistered {
                registration_id: id,
                handler,
                priority,
                timestamp: Timestamp::now(),
            });
            handles.push(RegistrationHandle { id });
        }
        Ok(handles)
    }

    /// Remove a filter. Returns `false` if it was already gone.
    pub fn unregister(&self, handle: &RegistrationHandle) -> bool {
        let removed = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            match inner.filters.iter().position(|f| f.id == handle.id) {
                Some(pos) => Some(Arc::make_mut(&mut inner.filters).remove(pos)),
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                tracing::info!(
                    registration = %entry.id,
                    handler = %entry.filter.handler,
                    "Filter unregistered"
                );
                self.publish(IntentEvent::FilterUnregistered {
                    registration_id: entry.id,
                    handler: entry.filter.handler,
                    timestamp: Timestamp::now(),
                });
                true
            }
            None => {
                tracing::debug!(registration = %handle.id, "Filter already unregistered");
                false
            }
        }
    }

    /// Remove several filters; returns how many were still present.
    pub fn unregister_all(&self, handles: &[RegistrationHandle]) -> usize {
        handles.iter().filter(|h| self.unregister(h)).count()
    }

    /// Consistent view of the current filters, in registration order.
    pub fn snapshot(&self) -> FilterSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&inner.filters)
    }

    /// Filters currently registered for `handler`.
    pub fn filters_for(&self, handler: &HandlerId) -> Vec<IntentFilter> {
        self.snapshot()
            .iter()
            .filter(|f| &f.filter.handler == handler)
            .map(|f| f.filter.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn publish(&self, event: IntentEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
