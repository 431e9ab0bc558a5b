use std::time::Duration;
use thiserror::Error;

/// Request-level failures of the execution facade.
///
/// Everything else (transport failures, compile errors, simulation errors)
/// is folded into a normal `ExecutionResult` with `success: false`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("Code is required")]
    MissingCode,

    #[error("Language is required")]
    MissingLanguage,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("No execution endpoints configured")]
    NoEndpoints,
}

impl ExecuteError {
    /// Input errors are the caller's fault (400); the rest is a deployment defect (500)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ExecuteError::NoEndpoints)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ExecuteError::MissingCode => "missing_code",
            ExecuteError::MissingLanguage => "missing_language",
            ExecuteError::UnsupportedLanguage(_) => "unsupported_language",
            ExecuteError::NoEndpoints => "no_endpoints",
        }
    }
}

/// A single failed endpoint attempt. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    InvalidBody(String),

    #[error("attempt exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
