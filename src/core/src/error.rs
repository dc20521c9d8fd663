use thiserror::Error;

/// Archive writing error types
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Destination or source could not be opened
    #[error("Open error: {target} - {message}")]
    OpenError { target: String, message: String },

    /// Malformed digest, unknown descriptor variant or unsupported media type
    #[error("Format error: {0}")]
    FormatError(String),

    /// Manifest (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Layer content is not present in the source
    #[error("Lookup error: layer {digest} not found in source")]
    LookupError { digest: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// I/O error with entry or phase context
    #[error("{context}: {source}")]
    WriteError {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A transient failure persisted past the retry budget
    #[error("Retried {attempts} times ({operation}): {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        source: Box<ArchiveError>,
    },

    /// A parallel fill task failed
    #[error("Filling in layer {name}: {source}")]
    FillError {
        name: String,
        source: Box<ArchiveError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ArchiveError {
    /// Attach context to an I/O error.
    pub fn write(context: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::WriteError {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Only I/O failures are transient. Lookup, format and configuration
    /// failures will fail the same way on every attempt, and so does
    /// content that does not match its declared size (`InvalidData`).
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::IoError(source) | ArchiveError::WriteError { source, .. } => {
                source.kind() != std::io::ErrorKind::InvalidData
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        ArchiveError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ArchiveError {
    fn from(err: serde_yaml::Error) -> Self {
        ArchiveError::SerializationError(err.to_string())
    }
}

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let error = ArchiveError::OpenError {
            target: "/tmp/out.tar".to_string(),
            message: "permission denied".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Open error: /tmp/out.tar - permission denied"
        );
    }

    #[test]
    fn test_format_error_display() {
        let error = ArchiveError::FormatError("invalid digest 'sha256'".to_string());
        assert_eq!(error.to_string(), "Format error: invalid digest 'sha256'");
    }

    #[test]
    fn test_lookup_error_display() {
        let error = ArchiveError::LookupError {
            digest: "sha256:abc".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Lookup error: layer sha256:abc not found in source"
        );
    }

    #[test]
    fn test_write_error_display() {
        let error = ArchiveError::write(
            "Writing tar entry 'manifest.json'",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
        );
        assert_eq!(
            error.to_string(),
            "Writing tar entry 'manifest.json': pipe closed"
        );
    }

    #[test]
    fn test_retry_exhausted_display() {
        let error = ArchiveError::RetryExhausted {
            operation: "sha256-aa.tar.gz".to_string(),
            attempts: 5,
            source: Box::new(ArchiveError::Other("disk full".to_string())),
        };
        assert_eq!(
            error.to_string(),
            "Retried 5 times (sha256-aa.tar.gz): disk full"
        );
    }

    #[test]
    fn test_fill_error_display() {
        let error = ArchiveError::FillError {
            name: "sha256-bb.tar.gz".to_string(),
            source: Box::new(ArchiveError::LookupError {
                digest: "sha256:bb".to_string(),
            }),
        };
        assert_eq!(
            error.to_string(),
            "Filling in layer sha256-bb.tar.gz: Lookup error: layer sha256:bb not found in source"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ArchiveError = io_error.into();
        assert!(matches!(error, ArchiveError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_transient_classification() {
        let io: ArchiveError = std::io::Error::new(std::io::ErrorKind::Other, "x").into();
        assert!(io.is_transient());
        assert!(ArchiveError::write("ctx", std::io::Error::new(std::io::ErrorKind::Other, "x"))
            .is_transient());

        assert!(!ArchiveError::FormatError("x".to_string()).is_transient());
        assert!(!ArchiveError::LookupError {
            digest: "sha256:aa".to_string()
        }
        .is_transient());
        assert!(!ArchiveError::ConfigError("x".to_string()).is_transient());

        let short = std::io::Error::new(std::io::ErrorKind::InvalidData, "short content");
        assert!(!ArchiveError::write("layer", short).is_transient());
        let bad: ArchiveError =
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad").into();
        assert!(!bad.is_transient());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: ArchiveError = result.unwrap_err().into();
        assert!(matches!(error, ArchiveError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: ArchiveError = result.unwrap_err().into();
        assert!(matches!(error, ArchiveError::SerializationError(_)));
    }
}
