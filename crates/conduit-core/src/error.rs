use thiserror::Error;

/// Top-level error type for the non-dispatch parts of Conduit.
///
/// Engine failures that travel through a callback live in
/// `conduit_engine::IntentError`; this type covers configuration, I/O and
/// producer-side helpers such as locator resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConduitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid locator '{input}': {reason}")]
    InvalidLocator { input: String, reason: String },
}

impl From<toml::de::Error> for ConduitError {
    fn from(err: toml::de::Error) -> Self {
        ConduitError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ConduitError {
    fn from(err: toml::ser::Error) -> Self {
        ConduitError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        ConduitError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Conduit operations.
pub type Result<T> = std::result::Result<T, ConduitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConduitError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = ConduitError::InvalidLocator {
            input: "::nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid locator '::nope': relative URL without a base"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ConduitError = io_err.into();
        assert!(matches!(err, ConduitError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: ConduitError = parsed.unwrap_err().into();
        assert!(matches!(err, ConduitError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: ConduitError = parsed.unwrap_err().into();
        assert!(matches!(err, ConduitError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
