//! Intent resolution and dispatch engine for Conduit.
//!
//! Producers describe what they want done as an [`Intent`]; the engine
//! resolves it against registered [`IntentFilter`]s, runs the chosen
//! handler on a bounded worker pool, reports the outcome through an
//! [`IntentCallback`] exactly once, and routes results to typed
//! [`ResultConsumer`]s.

pub mod callback;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handler;
pub mod manager;
pub mod operation;
pub mod pool;
pub mod registry;
pub mod resolver;
pub mod result;

pub use callback::{Delivery, FnCallback, IntentCallback, OneshotCallback, Outcome};
pub use context::ExecutionContext;
pub use dispatcher::{
    ConsumerFailure, ConsumerRegistration, ConsumerRegistry, DispatchReport, Dispatcher,
    ResultConsumer,
};
pub use engine::{Engine, HandlerRegistration};
pub use error::{HandlerError, IntentError};
pub use filter::IntentFilter;
pub use handler::{CompletionSink, FactoryGeneration, HandlerCatalog, HandlerFactory, IntentHandler};
pub use manager::IntentManager;
pub use operation::{CancellationToken, OperationHandle, OperationState};
pub use pool::WorkerPool;
pub use registry::{FilterRegistry, FilterSnapshot, RegisteredFilter, RegistrationHandle};
pub use resolver::resolve;
pub use result::IntentResult;

pub use conduit_core::intent::Intent;
pub use conduit_core::types::{HandlerId, OperationId};
