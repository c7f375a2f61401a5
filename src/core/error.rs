use thiserror::Error;

/// Crate-wide error type.
///
/// Every variant carries owned text so the error can be cloned and handed to
/// all callers that share one deduplicated fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    #[error("Configuration error: {0}")] Config(String),

    #[error("Invalid parameter: {0}")] InvalidParameter(String),

    #[error("Source unavailable: {service}: {reason}")] SourceUnavailable {
        service: String,
        reason: String,
    },

    #[error("Not found: {0}")] NotFound(String),

    #[error("Projection failed: {0}")] Projection(String),

    #[error("Cache error: {0}")] Cache(String),

    #[error("Database error: {0}")] Database(String),

    #[error("Serialization error: {0}")] Serialization(String),

    #[error("IO error: {0}")] Io(String),

    #[error("HTTP error: {0}")] Http(String),
}

impl PreviewError {
    pub fn source_unavailable(service: &str, reason: impl Into<String>) -> Self {
        PreviewError::SourceUnavailable {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    /// Transient failures worth retrying or covering with cached data
    pub fn is_recoverable(&self) -> bool {
        match self {
            PreviewError::SourceUnavailable { .. } => true,
            PreviewError::Http(_) => true,
            PreviewError::Cache(_) => true,
            PreviewError::Database(_) => true,
            PreviewError::Io(_) => true,
            _ => false,
        }
    }

    /// Failures that must stop the process at startup
    pub fn is_critical(&self) -> bool {
        matches!(self, PreviewError::Config(_))
    }

    pub fn is_source_failure(&self) -> bool {
        matches!(self, PreviewError::SourceUnavailable { .. } | PreviewError::Http(_))
    }

    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, PreviewError::InvalidParameter(_) | PreviewError::NotFound(_))
    }
}

impl From<rusqlite::Error> for PreviewError {
    fn from(e: rusqlite::Error) -> Self {
        PreviewError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for PreviewError {
    fn from(e: serde_json::Error) -> Self {
        PreviewError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for PreviewError {
    fn from(e: std::io::Error) -> Self {
        PreviewError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for PreviewError {
    fn from(e: toml::de::Error) -> Self {
        PreviewError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PreviewError::Serialization(e.to_string())
        } else if e.is_timeout() || e.is_connect() {
            PreviewError::source_unavailable("http", e.to_string())
        } else {
            PreviewError::Http(e.to_string())
        }
    }
}

pub type PreviewResult<T> = Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let source = PreviewError::source_unavailable("rpc", "connection reset");
        assert!(source.is_recoverable());
        assert!(source.is_source_failure());
        assert!(!source.is_invalid_parameter());

        let config = PreviewError::Config("unknown category".to_string());
        assert!(config.is_critical());
        assert!(!config.is_recoverable());

        let invalid = PreviewError::InvalidParameter("negative amount".to_string());
        assert!(invalid.is_invalid_parameter());
        assert!(!invalid.is_source_failure());
    }

    #[test]
    fn test_display() {
        let err = PreviewError::source_unavailable("chain", "timeout");
        assert_eq!(err.to_string(), "Source unavailable: chain: timeout");
    }
}
