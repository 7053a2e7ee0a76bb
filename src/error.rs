//! Error types for datalyst.
//!
//! Every fault raised by a third-party parser or HTTP client is classified
//! into one of these enums before it crosses a component boundary. The
//! variant is the machine-checkable kind; the `Display` impl is the
//! human-readable message.

use thiserror::Error;

/// Ingestion failures, one kind per failure class.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Neither the extension nor the content matched a supported format.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Text-like content could not be decoded with any known encoding.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The file matched a supported format but its content is unparseable.
    #[error("corrupt file: {0}")]
    Corrupt(String),

    /// A required external engine is not installed (e.g. no OCR binary).
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The container is recognized but the inner format is not handled
    /// (e.g. legacy binary `.xls` workbooks).
    #[error("unsupported subformat: {0}")]
    UnsupportedSubformat(String),

    /// The source contains no content at all.
    #[error("file is empty")]
    Empty,

    /// The file exceeds the configured size limit.
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
}

/// Failures talking to a model backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The endpoint could not be reached within the timeout.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The local server is up but has no model loaded.
    #[error("no model loaded on the backend")]
    NoModelLoaded,

    /// The credential was rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The provider rejected the request due to rate limiting.
    #[error("rate limited by the backend")]
    RateLimited,

    /// The endpoint answered with a body we could not interpret.
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// Top-level error surfaced by the orchestrator.
#[derive(Error, Debug)]
pub enum AgentError {
    /// `ask` was called with no data loaded.
    #[error("no data loaded; load a file first")]
    NoData,

    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl IngestionError {
    /// Stable short code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            IngestionError::UnsupportedFormat(_) => "unsupported_format",
            IngestionError::Encoding(_) => "encoding_error",
            IngestionError::Corrupt(_) => "corrupt_file",
            IngestionError::MissingDependency(_) => "missing_dependency",
            IngestionError::UnsupportedSubformat(_) => "unsupported_subformat",
            IngestionError::Empty => "empty",
            IngestionError::TooLarge { .. } => "too_large",
        }
    }
}

impl BackendError {
    /// Stable short code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Unreachable(_) => "unreachable",
            BackendError::NoModelLoaded => "no_model_loaded",
            BackendError::AuthenticationFailed => "authentication_failed",
            BackendError::RateLimited => "rate_limited",
            BackendError::Malformed(_) => "malformed_response",
        }
    }

    /// Whether a single bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_error_display() {
        let err = IngestionError::UnsupportedFormat("data.parquet".to_string());
        assert_eq!(err.to_string(), "unsupported file format: data.parquet");

        let err = IngestionError::TooLarge { size: 100, max: 10 };
        assert_eq!(err.to_string(), "file too large: 100 bytes (max 10)");
    }

    #[test]
    fn ingestion_error_codes_are_stable() {
        assert_eq!(IngestionError::Empty.code(), "empty");
        assert_eq!(
            IngestionError::Corrupt("x".into()).code(),
            "corrupt_file"
        );
        assert_eq!(
            IngestionError::MissingDependency("tesseract".into()).code(),
            "missing_dependency"
        );
    }

    #[test]
    fn backend_error_transient_split() {
        assert!(BackendError::Unreachable("connect refused".into()).is_transient());
        assert!(!BackendError::AuthenticationFailed.is_transient());
        assert!(!BackendError::RateLimited.is_transient());
        assert!(!BackendError::Malformed("bad json".into()).is_transient());
    }

    #[test]
    fn agent_error_wraps_component_errors() {
        let err: AgentError = IngestionError::Empty.into();
        assert!(matches!(err, AgentError::Ingestion(IngestionError::Empty)));
        assert!(err.to_string().contains("empty"));

        let err: AgentError = BackendError::NoModelLoaded.into();
        assert!(matches!(err, AgentError::Backend(BackendError::NoModelLoaded)));
    }
}
