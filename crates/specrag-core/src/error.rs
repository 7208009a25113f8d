//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RagError {
    /// Index not found.
    #[error("Index not found: {name}")]
    IndexNotFound { name: String },

    /// Index already exists.
    #[error("Index already exists: {name}")]
    IndexExists { name: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A stored document or input specification has the wrong shape.
    #[error("Malformed document: {reason}")]
    MalformedDocument { reason: String },

    /// A `$ref` that does not resolve to any stored component.
    #[error("Unresolvable reference: {reference}")]
    MalformedReference { reference: String },

    /// The store or similarity source failed to answer a query.
    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Index provisioning failed.
    #[error("Failed to provision index {index}: {message}")]
    Provisioning { index: String, message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RagError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a malformed document error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
        }
    }

    /// Create a source unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a provisioning error for `index`.
    pub fn provisioning(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            index: index.into(),
            message: message.into(),
        }
    }

    /// Get the error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::IndexExists { .. } => "INDEX_EXISTS",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::MalformedDocument { .. } => "MALFORMED_DOCUMENT",
            Self::MalformedReference { .. } => "MALFORMED_REFERENCE",
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::Provisioning { .. } => "PROVISIONING_FAILED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::provisioning("vectors_paths", "disk full");
        let text = err.to_string();
        assert!(text.contains("vectors_paths"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RagError::IndexNotFound {
                name: "x".to_string()
            }
            .error_code(),
            "INDEX_NOT_FOUND"
        );
        assert_eq!(RagError::database("test").error_code(), "DATABASE_ERROR");
        assert_eq!(
            RagError::provisioning("paths", "boom").error_code(),
            "PROVISIONING_FAILED"
        );
    }

    #[test]
    fn test_unavailable_code() {
        assert_eq!(
            RagError::unavailable("connection reset").error_code(),
            "SOURCE_UNAVAILABLE"
        );
    }
}
