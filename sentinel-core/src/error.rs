// sentinel-core/src/error.rs
// Error handling for the classification engine and its collaborators

use std::result;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the SentinelGrade engine
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Rule source could not be read
    #[error("Rule source unreadable: {source_name} - {source}")]
    RuleSource {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Rule source was read but is not a valid rule document
    #[error("Rule parse error in {context}: {message}")]
    RuleParse { context: String, message: String },

    /// A regular expression in the rule set or heuristics failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A collector returned an error instead of findings
    #[error("Collector '{module}' failed: {message}")]
    Collector { module: String, message: String },

    /// A collector exceeded its time budget
    #[error("Collector '{module}' timed out after {timeout_ms}ms")]
    CollectorTimeout { module: String, timeout_ms: u64 },

    /// Permission or system access errors
    #[error("Permission denied: {operation} (details: {details})")]
    Permission { operation: String, details: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context} - {source}")]
    Serialization {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The optional remote explanation service failed
    #[error("Remote explanation failed: {0}")]
    RemoteExplanation(String),
}

/// Result type alias for convenience
pub type Result<T> = result::Result<T, SentinelError>;

impl SentinelError {
    pub fn collector(module: &str, message: impl Into<String>) -> Self {
        SentinelError::Collector {
            module: module.to_string(),
            message: message.into(),
        }
    }

    pub fn collector_timeout(module: &str, timeout: Duration) -> Self {
        SentinelError::CollectorTimeout {
            module: module.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn rule_parse(context: &str, message: impl ToString) -> Self {
        SentinelError::RuleParse {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    /// Short label used to bucket errors in scan metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SentinelError::RuleSource { .. } => "rule_source",
            SentinelError::RuleParse { .. } => "rule_parse",
            SentinelError::InvalidPattern { .. } => "invalid_pattern",
            SentinelError::Collector { .. } => "collector",
            SentinelError::CollectorTimeout { .. } => "collector_timeout",
            SentinelError::Permission { .. } => "permission",
            SentinelError::Serialization { .. } => "serialization",
            SentinelError::RemoteExplanation(_) => "remote_explanation",
        }
    }
}

/// Trait for error recovery
pub trait ErrorRecovery {
    fn is_recoverable(&self) -> bool;
    fn error_category(&self) -> ErrorCategory;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Transient, // Temporary errors that might resolve
    Permanent, // Errors that won't resolve without intervention
    Critical,  // Errors that require immediate attention
    Warning,   // Non-critical errors for monitoring
}

impl ErrorRecovery for SentinelError {
    fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SentinelError::RuleParse { .. } | SentinelError::InvalidPattern { .. }
        )
    }

    fn error_category(&self) -> ErrorCategory {
        match self {
            SentinelError::CollectorTimeout { .. } => ErrorCategory::Transient,
            SentinelError::RemoteExplanation(_) => ErrorCategory::Transient,
            SentinelError::Collector { .. } => ErrorCategory::Warning,
            SentinelError::Permission { .. } => ErrorCategory::Warning,
            SentinelError::RuleParse { .. } | SentinelError::InvalidPattern { .. } => {
                ErrorCategory::Critical
            }
            _ => ErrorCategory::Permanent,
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::Serialization {
            context: "JSON processing".to_string(),
            source: Box::new(err),
        }
    }
}
