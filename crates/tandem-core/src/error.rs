//! Error types for tandem-core

use thiserror::Error;

/// Main error type for tandem-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent pool at capacity ({size}/{max_size}), no free entry to evict")]
    Capacity { size: usize, max_size: usize },

    #[error("Pool key already in use: {0}")]
    Conflict(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Permission denied for tool '{tool}': {reason}")]
    PermissionDenied { tool: String, reason: String },

    #[error("Delegation interrupted")]
    Interrupted,

    #[error("Delegation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error indicates a missing or invalid collaborator,
    /// which callers must not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type alias for tandem-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_fatal() {
        assert!(Error::Config("missing model client".into()).is_fatal());
        assert!(!Error::Conflict("explore:1".into()).is_fatal());
        assert!(!Error::Capacity { size: 4, max_size: 4 }.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Capacity { size: 8, max_size: 8 };
        assert!(err.to_string().contains("8/8"));

        let err = Error::PermissionDenied {
            tool: "bash".into(),
            reason: "not trusted".into(),
        };
        assert!(err.to_string().contains("bash"));
    }
}
