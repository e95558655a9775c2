pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod locator;
pub mod types;

pub use config::ConduitConfig;
pub use error::{ConduitError, Result};
pub use events::{EventBus, IntentEvent};
pub use intent::Intent;
pub use types::*;
