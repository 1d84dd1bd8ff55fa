//! Error taxonomy for revision runs.

use std::path::PathBuf;

/// Failures of the external completion capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("transient service error: {0}")]
    Transient(String),

    #[error("completion timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("service returned status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion call cancelled")]
    Cancelled,
}

impl CompletionError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transient(_) | CompletionError::Timeout { .. } => true,
            CompletionError::Service { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Malformed(_) | CompletionError::Cancelled => false,
        }
    }
}

/// Coarse classification used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    CompletionError,
    FormatViolation,
    LengthViolation,
    LoggingError,
    ConfigError,
    OutputError,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InputError => "InputError",
            ErrorKind::CompletionError => "CompletionError",
            ErrorKind::FormatViolation => "FormatViolation",
            ErrorKind::LengthViolation => "LengthViolation",
            ErrorKind::LoggingError => "LoggingError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::OutputError => "OutputError",
            ErrorKind::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// Errors produced by the revision pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RedlineError {
    #[error("input error: cannot read {path}: {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("input error: {0}")]
    InvalidInput(String),

    #[error("completion error from {participant}: {source}")]
    Completion {
        participant: String,
        #[source]
        source: CompletionError,
    },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("format violation in {stage}: {detail}")]
    FormatViolation { stage: String, detail: String },

    #[error("invalid final format: {detail}")]
    InvalidFinalFormat { detail: String },

    #[error("transcript write failed: {0}")]
    Logging(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cannot write output {path}: {reason}")]
    Output { path: PathBuf, reason: String },
}

impl RedlineError {
    /// Map the error onto the run-report taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedlineError::Input { .. } | RedlineError::InvalidInput(_) => ErrorKind::InputError,
            RedlineError::Completion { .. } => ErrorKind::CompletionError,
            RedlineError::Cancelled { .. } => ErrorKind::Cancelled,
            RedlineError::FormatViolation { .. } | RedlineError::InvalidFinalFormat { .. } => {
                ErrorKind::FormatViolation
            }
            RedlineError::Logging(_) => ErrorKind::LoggingError,
            RedlineError::Config(_) => ErrorKind::ConfigError,
            RedlineError::Output { .. } => ErrorKind::OutputError,
        }
    }
}

/// Result type for redline operations.
pub type Result<T> = std::result::Result<T, RedlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display_names_participant() {
        let err = RedlineError::Completion {
            participant: "Editor_Creative".to_string(),
            source: CompletionError::Transient("503 upstream".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("completion error"));
        assert!(msg.contains("Editor_Creative"));
        assert!(msg.contains("503 upstream"));
        assert_eq!(err.kind(), ErrorKind::CompletionError);
    }

    #[test]
    fn test_invalid_final_format_is_format_violation() {
        let err = RedlineError::InvalidFinalFormat {
            detail: "marker absent".to_string(),
        };
        assert!(err.to_string().starts_with("invalid final format"));
        assert_eq!(err.kind(), ErrorKind::FormatViolation);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CompletionError::Transient("x".into()).is_retryable());
        assert!(CompletionError::Timeout { after_ms: 10 }.is_retryable());
        assert!(CompletionError::Service {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!CompletionError::Service {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!CompletionError::Cancelled.is_retryable());
    }
}
