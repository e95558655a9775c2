//! Conduit application binary - composition root.
//!
//! 1. Parse arguments and load configuration from TOML
//! 2. Initialise logging
//! 3. Build the intent engine and install the built-in catalog plugin
//! 4. Start one intent for the target given on the command line
//! 5. Dispatch the result to the registered consumers
//!
//! Ctrl-C while the handler runs cancels the operation.

mod catalog;
mod cli;

use clap::Parser;
use conduit_core::config::ConduitConfig;
use conduit_core::locator::resolve_locator;
use conduit_engine::callback::{self, Outcome};
use conduit_engine::{Engine, ExecutionContext, Intent};

use crate::cli::CliArgs;

fn build_intent(args: &CliArgs) -> Result<Intent, Box<dyn std::error::Error>> {
    let locator = resolve_locator(&args.target)?;
    let mut intent = Intent::for_action(args.action.as_str()).with_locator(locator);
    for category in &args.categories {
        intent = intent.add_category(category.as_str());
    }
    if let Some(mime_type) = &args.mime_type {
        intent = intent.with_type(mime_type.as_str());
    }
    if let Some(handler) = &args.handler {
        intent = intent.with_handler(handler.as_str());
    }
    Ok(intent)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = ConduitConfig::load_or_default(&config_file);

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Conduit v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Engine.
    let engine = Engine::from_config(&config);
    catalog::install(&engine)?;

    let intent = build_intent(&args)?;
    let candidates = engine.query(&intent);
    tracing::debug!(candidates = ?candidates, "Resolved candidates");

    let context = ExecutionContext::new().with(config.clone());
    let (callback, mut outcome) = callback::oneshot();
    let handle = engine.start(intent, callback, context.clone());
    // Using the handle releases delivery of the outcome.
    let operation_id = handle.id();
    tracing::debug!(operation = %operation_id, "Waiting for outcome");

    let delivery = tokio::select! {
        delivery = &mut outcome => delivery?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling operation");
            handle.cancel();
            outcome.await?
        }
    };

    match delivery.outcome {
        Outcome::Completed(result) => {
            let report = engine.dispatch(&result, &delivery.intent, &context)?;
            for failure in &report.failures {
                tracing::error!(consumer = %failure.consumer, error = %failure.error, "Consumer failed");
            }
            engine.shutdown();
            if report.is_clean() {
                Ok(())
            } else {
                Err(format!("{} consumer(s) failed", report.failures.len()).into())
            }
        }
        Outcome::Failed(error) => {
            tracing::error!(error = %error, "Intent failed");
            engine.shutdown();
            Err(error.into())
        }
    }
}
