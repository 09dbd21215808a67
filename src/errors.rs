use thiserror::Error;

/// Unified error type for tag queries, clouds and the SQLite store
#[derive(Error, Debug)]
pub enum TagError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // Storage faults from a page repository pass through untouched
    #[error(transparent)]
    Repository(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TagError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TagError::Validation { .. })
    }

    /// The message part of a validation error, if this is one
    pub fn validation_message(&self) -> Option<&str> {
        match self {
            TagError::Validation { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type used across the crate
pub type TagResult<T> = Result<T, TagError>;

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed caller input, reported back to the template layer
    UserError,
    /// Storage or IO fault
    SystemError,
    /// Bad extension settings
    ConfigError,
}

impl TagError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TagError::Validation { .. } => ErrorCategory::UserError,
            TagError::Configuration(_) => ErrorCategory::ConfigError,
            TagError::Serialization(_) => ErrorCategory::ConfigError,
            TagError::Database(_) => ErrorCategory::SystemError,
            TagError::Repository(_) => ErrorCategory::SystemError,
            TagError::Io(_) => ErrorCategory::SystemError,
        }
    }

    /// Message suitable for inline display in a rendered page
    pub fn user_message(&self) -> String {
        match self {
            TagError::Validation { field, message } => format!("{field}: {message}"),
            TagError::Configuration(msg) => format!("tag settings are invalid: {msg}"),
            TagError::Serialization(_) => "tag settings could not be read".to_string(),
            TagError::Database(_) | TagError::Repository(_) | TagError::Io(_) => {
                "tags are temporarily unavailable".to_string()
            }
        }
    }
}
