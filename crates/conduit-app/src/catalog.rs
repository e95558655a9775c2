//! Built-in catalog plugin: a handler that loads catalog files and the
//! consumers that present the loaded document.

use std::path::PathBuf;

use async_trait::async_trait;
use conduit_engine::handler::shared;
use conduit_engine::{
    CompletionSink, Engine, ExecutionContext, HandlerError, HandlerRegistration, Intent,
    IntentError, IntentFilter, IntentHandler, IntentResult,
};
use url::Url;

pub const CATALOG_HANDLER: &str = "catalog-file";
pub const CATALOG_CATEGORY: &str = "catalog";

/// A catalog file read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDocument {
    pub locator: Url,
    pub bytes: usize,
    pub lines: usize,
    pub content: String,
}

impl CatalogDocument {
    fn from_content(locator: Url, content: String) -> Self {
        Self {
            locator,
            bytes: content.len(),
            lines: content.lines().filter(|l| !l.trim().is_empty()).count(),
            content,
        }
    }
}

/// Loads `file:` locators with `tokio::fs`.
pub struct CatalogFileHandler;

impl CatalogFileHandler {
    fn path_for(intent: &Intent) -> Result<(Url, PathBuf), HandlerError> {
        let locator = intent
            .locator()
            .ok_or_else(|| HandlerError::failed("intent has no locator"))?;
        let path = locator
            .to_file_path()
            .map_err(|_| HandlerError::failed(format!("not a local file: {locator}")))?;
        Ok((locator.clone(), path))
    }
}

#[async_trait]
impl IntentHandler for CatalogFileHandler {
    async fn handle(&self, intent: &Intent, _context: &ExecutionContext, sink: CompletionSink) {
        let (locator, path) = match Self::path_for(intent) {
            Ok(found) => found,
            Err(e) => {
                sink.fail(e);
                return;
            }
        };

        tracing::debug!(path = %path.display(), "Loading catalog");
        let read = tokio::select! {
            biased;
            _ = sink.cancelled() => {
                tracing::debug!(path = %path.display(), "Catalog load abandoned after cancel");
                return;
            }
            read = tokio::fs::read_to_string(&path) => read,
        };

        match read {
            Ok(content) => {
                sink.succeed(CatalogDocument::from_content(locator, content));
            }
            Err(e) => {
                sink.fail(e);
            }
        }
    }
}

/// Register the catalog handler and its consumers on `engine`.
pub fn install(engine: &Engine) -> Result<HandlerRegistration, IntentError> {
    let registration = engine.register_handler(
        CATALOG_HANDLER,
        shared(CatalogFileHandler),
        vec![
            IntentFilter::new(CATALOG_HANDLER).action("view").scheme("file"),
            IntentFilter::new(CATALOG_HANDLER)
                .action("open-catalog")
                .scheme("file")
                .priority(10),
        ],
    )?;

    engine
        .consumers()
        .register::<CatalogDocument>("catalog-summary", print_summary);
    engine.consumers().register_for_category::<CatalogDocument>(
        "catalog-outline",
        CATALOG_CATEGORY,
        print_outline,
    );
    Ok(registration)
}

fn document(result: &IntentResult) -> Result<&CatalogDocument, HandlerError> {
    result
        .downcast_ref::<CatalogDocument>()
        .ok_or_else(|| HandlerError::failed("result is not a catalog document"))
}

fn print_summary(
    result: &IntentResult,
    _intent: &Intent,
    _context: &ExecutionContext,
) -> Result<(), HandlerError> {
    let doc = document(result)?;
    println!("{} ({} bytes, {} lines)", doc.locator, doc.bytes, doc.lines);
    Ok(())
}

fn print_outline(
    result: &IntentResult,
    intent: &Intent,
    _context: &ExecutionContext,
) -> Result<(), HandlerError> {
    const OUTLINE_LINES: usize = 10;

    let doc = document(result)?;
    println!("== {} [{}] ==", doc.locator, intent.action().unwrap_or("view"));
    for line in doc
        .content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(OUTLINE_LINES)
    {
        println!("  {}", line.trim());
    }
    if doc.lines > OUTLINE_LINES {
        println!("  ... {} more", doc.lines - OUTLINE_LINES);
    }
    Ok(())
}
