//! The intent value object.
//!
//! An [`Intent`] describes work to be done without naming the code that does
//! it. Producers build one with the chained setters below, then hand it to
//! the engine, which treats it as read-only from that point on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::HandlerId;

/// Description of an intent to be performed.
///
/// Every field is optional. An intent that only names a `handler` is valid
/// and skips filter resolution entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    action: Option<String>,
    #[serde(default)]
    categories: BTreeSet<String>,
    #[serde(rename = "type")]
    mime_type: Option<String>,
    locator: Option<Url>,
    handler: Option<HandlerId>,
    #[serde(default)]
    extras: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    flags: u32,
}

impl Intent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an intent with just an action set.
    pub fn for_action(action: impl Into<String>) -> Self {
        Self::new().with_action(action)
    }

    /// Shorthand for an explicit-dispatch intent.
    pub fn for_handler(handler: impl Into<HandlerId>) -> Self {
        Self::new().with_handler(handler)
    }

    // ---- action ----

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    // ---- categories ----

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    pub fn add_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn remove_category(mut self, category: &str) -> Self {
        self.categories.remove(category);
        self
    }

    // ---- type ----

    /// Explicit MIME type of the data, e.g. `text/xml` or `image/*`.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn with_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    // ---- locator ----

    pub fn locator(&self) -> Option<&Url> {
        self.locator.as_ref()
    }

    /// Scheme of the locator (`file`, `https`, ...), lowercase.
    pub fn scheme(&self) -> Option<&str> {
        self.locator.as_ref().map(Url::scheme)
    }

    pub fn with_locator(mut self, locator: Url) -> Self {
        self.locator = Some(locator);
        self
    }

    // ---- handler ----

    pub fn handler(&self) -> Option<&HandlerId> {
        self.handler.as_ref()
    }

    /// Name the handler explicitly. Filters are not consulted for an
    /// intent with a handler set.
    pub fn with_handler(mut self, handler: impl Into<HandlerId>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    // ---- extras ----

    pub fn extras(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }

    /// Set an extra. A later value for the same key replaces the earlier one.
    pub fn put_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    // ---- flags ----

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Add a flag with a bitwise OR.
    pub fn add_flag(mut self, flag: u32) -> Self {
        self.flags |= flag;
        self
    }

    /// True when every bit of `flag` is set.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }
}
