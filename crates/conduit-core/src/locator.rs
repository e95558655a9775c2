//! Producer-side locator resolution.
//!
//! Turning user input into a [`Url`] is the producer's job, not the
//! engine's. A string naming an existing local path becomes a `file://`
//! URL; anything else must parse as an absolute URL.

use std::path::Path;

use url::Url;

use crate::error::{ConduitError, Result};

/// Resolve `input` to a locator URL.
pub fn resolve_locator(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "locator must not be empty"));
    }

    let path = Path::new(trimmed);
    if path.exists() {
        let absolute = path.canonicalize()?;
        return Url::from_file_path(&absolute)
            .map_err(|_| invalid(input, "path cannot be expressed as a file URL"));
    }

    Url::parse(trimmed).map_err(|e| invalid(input, &e.to_string()))
}

fn invalid(input: &str, reason: &str) -> ConduitError {
    ConduitError::InvalidLocator {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
