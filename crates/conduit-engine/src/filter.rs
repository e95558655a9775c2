//! Intent filters: declarative matching rules for a handler.

use std::collections::BTreeSet;

use conduit_core::intent::Intent;
use conduit_core::types::HandlerId;
use serde::{Deserialize, Serialize};

use crate::error::IntentError;

/// Declares which intents a handler accepts.
///
/// Each criterion set is unconstrained when empty. Types and schemes are
/// lowercased on insertion so matching is case-insensitive for them;
/// actions and categories are compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFilter {
    pub actions: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub types: BTreeSet<String>,
    pub schemes: BTreeSet<String>,
    pub priority: i32,
    pub handler: HandlerId,
}

impl IntentFilter {
    pub fn new(handler: impl Into<HandlerId>) -> Self {
        Self {
            actions: BTreeSet::new(),
            categories: BTreeSet::new(),
            types: BTreeSet::new(),
            schemes: BTreeSet::new(),
            priority: 0,
            handler: handler.into(),
        }
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    /// Accept a MIME type. `major/*` accepts any subtype and `*/*` accepts
    /// any type.
    pub fn mime_type(mut self, pattern: impl Into<String>) -> Self {
        self.types.insert(pattern.into().to_ascii_lowercase());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.schemes.insert(scheme.into().to_ascii_lowercase());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// True when no criterion constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        self.actions.is_empty()
            && self.categories.is_empty()
            && self.types.is_empty()
            && self.schemes.is_empty()
    }

    /// Reject filters that would match every intent or name no handler.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.handler.is_empty() {
            return Err(IntentError::MalformedFilter(
                "filter does not name a handler".to_string(),
            ));
        }
        if self.is_unconstrained() {
            return Err(IntentError::MalformedFilter(format!(
                "filter for '{}' has no action, category, type or scheme criteria",
                self.handler
            )));
        }
        Ok(())
    }

    /// Test whether `intent` satisfies every criterion of this filter.
    pub fn matches(&self, intent: &Intent) -> bool {
        !self.is_unconstrained()
            && self.matches_action(intent)
            && self.matches_categories(intent)
            && self.matches_type(intent)
            && self.matches_scheme(intent)
    }

    fn matches_action(&self, intent: &Intent) -> bool {
        if self.actions.is_empty() {
            return true;
        }
        intent
            .action()
            .is_some_and(|action| self.actions.contains(action))
    }

    fn matches_categories(&self, intent: &Intent) -> bool {
        self.categories.is_subset(intent.categories())
    }

    fn matches_type(&self, intent: &Intent) -> bool {
        if self.types.is_empty() {
            return true;
        }
        match intent.mime_type() {
            Some(mime) => {
                let mime = mime.to_ascii_lowercase();
                self.types.iter().any(|pattern| type_matches(pattern, &mime))
            }
            None => false,
        }
    }

    fn matches_scheme(&self, intent: &Intent) -> bool {
        if self.schemes.is_empty() {
            return true;
        }
        intent
            .scheme()
            .is_some_and(|scheme| self.schemes.contains(&scheme.to_ascii_lowercase()))
    }
}

/// Match a MIME type against a filter pattern. Both are expected lowercase.
///
/// A `*` subtype on either side matches any subtype with the same primary
/// type, so an intent typed `text/*` is accepted by a `text/xml` filter.
pub fn type_matches(pattern: &str, mime: &str) -> bool {
    if pattern == mime || pattern == "*/*" || pattern == "*" {
        return true;
    }
    let (Some((pattern_major, pattern_minor)), Some((major, minor))) =
        (pattern.split_once('/'), mime.split_once('/'))
    else {
        return false;
    };
    pattern_major == major && (pattern_minor == "*" || minor == "*")
}
