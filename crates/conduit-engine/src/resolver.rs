//! Handler resolution.
//!
//! A pure function from an intent and a registry snapshot to a ranked list
//! of handlers. Nothing here touches shared state.

use std::collections::HashSet;

use conduit_core::intent::Intent;
use conduit_core::types::HandlerId;

use crate::registry::RegisteredFilter;

/// Rank the handlers able to take `intent`, most preferred first.
///
/// An explicit handler on the intent short-circuits matching. Otherwise
/// matching filters are ordered by priority (highest first), ties keep
/// registration order, and a handler appearing through several filters is
/// listed once at its best position.
pub fn resolve(intent: &Intent, snapshot: &[RegisteredFilter]) -> Vec<HandlerId> {
    if let Some(handler) = intent.handler() {
        tracing::debug!(handler = %handler, "Explicit handler, skipping resolution");
        return vec![handler.clone()];
    }

    let mut matched: Vec<&RegisteredFilter> = snapshot
        .iter()
        .filter(|entry| entry.filter.matches(intent))
        .collect();

    // Stable: equal priorities stay in snapshot (registration) order.
    matched.sort_by_key(|entry| std::cmp::Reverse(entry.filter.priority));

    let mut seen = HashSet::new();
    let ranked: Vec<HandlerId> = matched
        .into_iter()
        .filter(|entry| seen.insert(entry.filter.handler.clone()))
        .map(|entry| entry.filter.handler.clone())
        .collect();

    tracing::debug!(
        action = ?intent.action(),
        mime_type = ?intent.mime_type(),
        scheme = ?intent.scheme(),
        candidates = ranked.len(),
        "Resolved intent"
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IntentFilter;
    use crate::registry::FilterRegistry;
    use url::Url;

    fn ids(handlers: &[HandlerId]) -> Vec<&str> {
        handlers.iter().map(HandlerId::as_str).collect()
    }

    #[test]
    fn test_no_match_yields_empty() {
        let registry = FilterRegistry::new();
        registry
            .register(IntentFilter::new("a").action("open"))
            .unwrap();
        let result = resolve(&Intent::for_action("close"), &registry.snapshot());
        assert!(result.is_empty());
    }

    #[test]
    fn test_explicit_handler_bypasses_filters() {
        let registry = FilterRegistry::new();
        registry
            .register(IntentFilter::new("a").action("open").priority(100))
            .unwrap();

        let intent = Intent::for_action("open").with_handler("explicit");
        assert_eq!(ids(&resolve(&intent, &registry.snapshot())), vec!["explicit"]);

        // Even with an empty registry.
        assert_eq!(ids(&resolve(&intent, &[])), vec!["explicit"]);
    }

    #[test]
    fn test_priority_descending() {
        let registry = FilterRegistry::new();
        registry
            .register_all(vec![
                IntentFilter::new("low").action("open").priority(5),
                IntentFilter::new("high").action("open").priority(10),
                IntentFilter::new("neg").action("open").priority(-1),
            ])
            .unwrap();
        let result = resolve(&Intent::for_action("open"), &registry.snapshot());
        assert_eq!(ids(&result), vec!["high", "low", "neg"]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let registry = FilterRegistry::new();
        for name in ["first", "second", "third"] {
            registry
                .register(IntentFilter::new(name).action("open").priority(3))
                .unwrap();
        }
        let snapshot = registry.snapshot();
        for _ in 0..10 {
            let result = resolve(&Intent::for_action("open"), &snapshot);
            assert_eq!(ids(&result), vec!["first", "second", "third"]);
        }
    }

    #[test]
    fn test_duplicate_handler_collapsed_to_best_priority() {
        let registry = FilterRegistry::new();
        registry
            .register_all(vec![
                IntentFilter::new("a").action("open").priority(1),
                IntentFilter::new("b").action("open").priority(5),
                IntentFilter::new("a").scheme("file").priority(9),
            ])
            .unwrap();
        let intent = Intent::for_action("open")
            .with_locator(Url::parse("file:///tmp/x.xml").unwrap());
        let result = resolve(&intent, &registry.snapshot());
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_all_criteria_combined() {
        let registry = FilterRegistry::new();
        registry
            .register(
                IntentFilter::new("xml-viewer")
                    .action("view")
                    .category("catalog")
                    .mime_type("text/*")
                    .scheme("https"),
            )
            .unwrap();
        let snapshot = registry.snapshot();

        let full = Intent::for_action("view")
            .add_category("catalog")
            .with_type("text/xml")
            .with_locator(Url::parse("https://example.com/c.xml").unwrap());
        assert_eq!(ids(&resolve(&full, &snapshot)), vec!["xml-viewer"]);

        let missing_category = full.clone().remove_category("catalog");
        assert!(resolve(&missing_category, &snapshot).is_empty());

        let wrong_type = full.clone().with_type("image/png");
        assert!(resolve(&wrong_type, &snapshot).is_empty());
    }
}
