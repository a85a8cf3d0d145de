use thiserror::Error;

/// Top-level error type for the notiwatch system.
///
/// Subsystem crates define their own error types and implement
/// `From<NotiwatchError>` so that the `?` operator works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotiwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl From<toml::de::Error> for NotiwatchError {
    fn from(err: toml::de::Error) -> Self {
        NotiwatchError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NotiwatchError {
    fn from(err: toml::ser::Error) -> Self {
        NotiwatchError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NotiwatchError {
    fn from(err: serde_json::Error) -> Self {
        NotiwatchError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for notiwatch operations.
pub type Result<T> = std::result::Result<T, NotiwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NotiwatchError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(NotiwatchError, &str)> = vec![
            (
                NotiwatchError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                NotiwatchError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                NotiwatchError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                NotiwatchError::InvalidEvent("missing source_key".to_string()),
                "Invalid event: missing source_key",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: NotiwatchError = io_err.into();
        assert!(matches!(err, NotiwatchError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: NotiwatchError = err.unwrap_err().into();
        assert!(matches!(err, NotiwatchError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: NotiwatchError = err.unwrap_err().into();
        assert!(matches!(err, NotiwatchError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(format!("got {}", value))
        }

        assert_eq!(inner().unwrap(), "got 42");
    }
}
